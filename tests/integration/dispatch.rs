//! Inbound-path scenarios: framing, validation, and mode selection.

use crate::*;
use dray_core::wire::codes;
use serde_json::json;

#[test]
fn framing_rejection_short_frame() {
    let rig = rig();
    rig.dispatcher.on_message(1, &[0x00, 0x01]);

    let replies = rig.sink.replies(1);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].code, codes::BAD_FRAME);
    assert_eq!(rig.pool.submission_count(), 0);
    assert!(!rig.sessions.contains_key(&1));
}

#[test]
fn framing_rejection_length_mismatch() {
    let rig = rig();
    // Declares 10 bytes, carries 4.
    let mut raw = 10u32.to_be_bytes().to_vec();
    raw.extend_from_slice(b"{}{}");
    rig.dispatcher.on_message(1, &raw);

    let replies = rig.sink.replies(1);
    assert_eq!(replies[0].code, codes::BAD_FRAME);
    assert!(!rig.sessions.contains_key(&1));
}

#[test]
fn framing_rejection_undecodable_payload() {
    let rig = rig();
    let body = b"definitely not json";
    let mut raw = (body.len() as u32).to_be_bytes().to_vec();
    raw.extend_from_slice(body);
    rig.dispatcher.on_message(1, &raw);

    let replies = rig.sink.replies(1);
    assert_eq!(replies[0].code, codes::BAD_PAYLOAD);
    assert!(!rig.sessions.contains_key(&1));
}

#[test]
fn empty_api_is_rejected_without_a_session() {
    let rig = rig();
    rig.dispatcher.on_message(1, &frame("SSM", "g1", many(&[])));

    let replies = rig.sink.replies(1);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].code, codes::API_MISSING);
    assert_eq!(rig.pool.submission_count(), 0);
    assert!(!rig.sessions.contains_key(&1));
}

#[test]
fn absent_api_field_is_rejected_as_api_missing() {
    let rig = rig();
    let body = serde_json::to_vec(&json!({ "type": "SSS", "guid": "g1" })).unwrap();
    let mut raw = (body.len() as u32).to_be_bytes().to_vec();
    raw.extend_from_slice(&body);
    rig.dispatcher.on_message(1, &raw);

    let replies = rig.sink.replies(1);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].code, codes::API_MISSING);
    assert!(!rig.sessions.contains_key(&1));
}

#[test]
fn unknown_type_gets_exactly_one_error_reply_and_no_submission() {
    let rig = rig();
    rig.dispatcher
        .on_message(1, &frame("WAT", "g1", one("echo", json!(1))));

    let replies = rig.sink.replies(1);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].code, codes::UNKNOWN_TYPE);
    assert_eq!(rig.pool.submission_count(), 0);
    assert!(!rig.sessions.contains_key(&1));
}

#[test]
fn unknown_type_discards_a_prior_open_session() {
    let rig = rig();
    rig.dispatcher
        .on_message(1, &frame("SSS", "g1", one("echo", json!(1))));
    assert!(rig.sessions.contains_key(&1));

    rig.dispatcher
        .on_message(1, &frame("WAT", "g2", one("echo", json!(2))));
    assert!(!rig.sessions.contains_key(&1));
}

#[test]
fn multi_async_submits_everything_and_acks_once() {
    let rig = rig();
    rig.dispatcher.on_message(
        1,
        &frame("SRM", "g1", many(&[("a", json!(1)), ("b", json!(2))])),
    );

    assert_eq!(rig.pool.submission_count(), 2);
    let replies = rig.sink.replies(1);
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].code, codes::ACCEPTED);
    assert_eq!(replies[0].guid.as_deref(), Some("g1"));
    assert!(!rig.sessions.contains_key(&1));
}

#[test]
fn connections_do_not_share_sessions() {
    let rig = rig();
    rig.dispatcher
        .on_message(1, &frame("SSS", "g1", one("echo", json!(1))));
    rig.dispatcher
        .on_message(2, &frame("SSS", "g2", one("echo", json!(2))));

    assert!(rig.sessions.contains_key(&1));
    assert!(rig.sessions.contains_key(&2));
    assert_eq!(rig.sessions.get(&1).unwrap().request.guid, "g1");
    assert_eq!(rig.sessions.get(&2).unwrap().request.guid, "g2");
}
