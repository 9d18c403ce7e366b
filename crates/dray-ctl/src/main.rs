//! dray-ctl — command-line interface for the dray daemon.

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use dray_core::message::{Api, RequestMessage, ResponseMessage, TaskDescriptor};
use dray_core::wire;

const DEFAULT_API_PORT: u16 = 9568;
const DEFAULT_RPC_ADDR: &str = "127.0.0.1:9567";

// ── Response types ────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusResponse {
    connections: usize,
    open_sessions: usize,
    workloads: Vec<String>,
    uptime_secs: u64,
}

#[derive(Deserialize)]
struct SessionsResponse {
    sessions: Vec<SessionInfo>,
}

#[derive(Deserialize)]
struct SessionInfo {
    conn: u64,
    guid: String,
    mode: String,
    pending: usize,
    completed: usize,
    open_secs: u64,
}

// ── HTTP helpers ──────────────────────────────────────────────────────────────

fn base_url(port: u16) -> String {
    format!("http://127.0.0.1:{}", port)
}

async fn get_json<T: for<'de> Deserialize<'de>>(url: &str) -> Result<T> {
    reqwest::get(url)
        .await
        .with_context(|| format!("failed to connect to drayd at {} — is it running?", url))?
        .json::<T>()
        .await
        .context("failed to parse response")
}

// ── Subcommand handlers ───────────────────────────────────────────────────────

async fn cmd_status(port: u16) -> Result<()> {
    let resp: StatusResponse = get_json(&format!("{}/status", base_url(port))).await?;

    println!("═══════════════════════════════════════");
    println!("  Dray Daemon Status");
    println!("═══════════════════════════════════════");
    println!("  Connections   : {}", resp.connections);
    println!("  Open sessions : {}", resp.open_sessions);
    println!("  Workloads     : {}", resp.workloads.join(", "));
    println!("  Uptime        : {}s", resp.uptime_secs);

    Ok(())
}

async fn cmd_sessions(port: u16) -> Result<()> {
    let resp: SessionsResponse = get_json(&format!("{}/sessions", base_url(port))).await?;

    if resp.sessions.is_empty() {
        println!("No open sessions.");
        return Ok(());
    }

    println!("═══════════════════════════════════════");
    println!("  Open Sessions ({})", resp.sessions.len());
    println!("═══════════════════════════════════════");

    for s in &resp.sessions {
        println!("  ┌─ conn {}", s.conn);
        println!("  │  guid      : {}", s.guid);
        println!("  │  mode      : {}", s.mode);
        println!("  │  pending   : {}", s.pending);
        println!("  │  completed : {}", s.completed);
        println!("  └─ age       : {}s", s.open_secs);
    }

    Ok(())
}

async fn cmd_call(addr: &str, mode: &str, name: &str, params: Option<&str>) -> Result<()> {
    let params = match params {
        Some(text) => serde_json::from_str(text).context("params must be valid JSON")?,
        None => serde_json::Value::Null,
    };

    let guid = format!(
        "ctl-{}",
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis())
            .unwrap_or(0)
    );

    let req = RequestMessage {
        mode: mode.to_string(),
        guid,
        api: Api::One(TaskDescriptor {
            name: name.to_string(),
            params,
        }),
    };

    let mut stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to drayd at {} — is it running?", addr))?;

    let frame = wire::encode_request(&req).context("failed to encode request")?;
    stream.write_all(&frame).await.context("send failed")?;

    let reply = read_reply(&mut stream).await.context("read reply failed")?;
    print_reply(&reply);

    Ok(())
}

async fn read_reply(stream: &mut TcpStream) -> Result<ResponseMessage> {
    let mut len_buf = [0u8; wire::LEN_PREFIX];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;

    let mut frame = vec![0u8; wire::LEN_PREFIX + len];
    frame[..wire::LEN_PREFIX].copy_from_slice(&len_buf);
    stream.read_exact(&mut frame[wire::LEN_PREFIX..]).await?;

    Ok(wire::decode_response(&frame)?)
}

fn print_reply(reply: &ResponseMessage) {
    println!("  code : {}", reply.code);
    println!("  msg  : {}", reply.msg);
    if let Some(guid) = &reply.guid {
        println!("  guid : {}", guid);
    }
    if !reply.data.is_null() {
        match serde_json::to_string_pretty(&reply.data) {
            Ok(pretty) => println!("  data : {}", pretty),
            Err(_) => println!("  data : {}", reply.data),
        }
    }
}

fn print_usage() {
    println!("Usage: dray-ctl [--port <port>] [--addr <host:port>] <command>");
    println!();
    println!("Commands:");
    println!("  status                        Show daemon status");
    println!("  sessions                      List open sessions");
    println!("  call <name> [params-json]     Send a request and print the reply");
    println!();
    println!("Options:");
    println!("  --port <port>     Status endpoint port (default: {})", DEFAULT_API_PORT);
    println!("  --addr <addr>     RPC address for call (default: {})", DEFAULT_RPC_ADDR);
    println!("  --mode <tag>      Completion mode for call: SSS, SRS, SSM, SRM (default: SSS)");
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut port = DEFAULT_API_PORT;
    let mut addr = DEFAULT_RPC_ADDR.to_string();
    let mut mode = "SSS".to_string();
    let mut remaining: Vec<&str> = Vec::new();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--port" => {
                i += 1;
                port = args
                    .get(i)
                    .context("--port requires a value")?
                    .parse()
                    .context("--port must be a number")?;
            }
            "--addr" => {
                i += 1;
                addr = args.get(i).context("--addr requires a value")?.clone();
            }
            "--mode" => {
                i += 1;
                mode = args.get(i).context("--mode requires a value")?.clone();
            }
            _ => remaining.push(&args[i]),
        }
        i += 1;
    }

    match remaining.as_slice() {
        ["status"] | [] => cmd_status(port).await,
        ["sessions"] => cmd_sessions(port).await,
        ["call", name] => cmd_call(&addr, &mode, name, None).await,
        ["call", name, params] => cmd_call(&addr, &mode, name, Some(params)).await,
        ["help"] | ["--help"] | ["-h"] => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other.join(" "));
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    }
}
