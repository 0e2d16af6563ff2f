use anyhow::{anyhow, Result};
use clap::Parser;
use indicatif::ProgressBar;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::{Duration, Instant};

const STARTPOS: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

#[derive(Parser, Debug)]
#[command(author, version, about = "Fire concurrent bursts at a running server and report latency", long_about = None)]
struct Args {
    /// host:port of a running server
    #[arg(long, default_value = "127.0.0.1:23456")]
    addr: String,

    /// Mode to request
    #[arg(long, default_value = "easy")]
    mode: String,

    /// Largest burst; bursts of 1..=N run in turn
    #[arg(long, default_value_t = 20)]
    max_requests: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Position to evaluate
    #[arg(long, default_value = STARTPOS)]
    fen: String,
}

/// Minimal HTTP POST over a raw stream; returns (status, body).
fn http_post(addr: &str, path: &str, body: &str, timeout: Duration) -> Result<(u16, String)> {
    let mut stream = TcpStream::connect(addr)?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;
    let request = format!(
        "POST {path} HTTP/1.1\r\nHost: {addr}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes())?;
    let mut raw = String::new();
    stream.read_to_string(&mut raw)?;
    let status = raw
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow!("malformed response: {raw:?}"))?;
    let body = raw
        .split_once("\r\n\r\n")
        .map(|(_, b)| b.to_string())
        .unwrap_or_default();
    Ok((status, body))
}

/// One burst of `n` concurrent identical requests; per-request seconds,
/// None for failures.
fn burst(args: &Args, n: usize) -> Vec<Option<f64>> {
    let payload = format!("{{\"fen\":\"{}\"}}", args.fen);
    let path = format!("/{}", args.mode);
    let timeout = Duration::from_secs(args.timeout_secs);

    let handles: Vec<_> = (0..n)
        .map(|_| {
            let addr = args.addr.clone();
            let path = path.clone();
            let payload = payload.clone();
            thread::spawn(move || {
                let start = Instant::now();
                match http_post(&addr, &path, &payload, timeout) {
                    Ok((200, _)) => Some(start.elapsed().as_secs_f64()),
                    _ => None,
                }
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|h| h.join().unwrap_or(None))
        .collect()
}

fn mean_std(samples: &[f64]) -> (f64, f64) {
    if samples.is_empty() {
        return (0.0, 0.0);
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let var = samples
        .iter()
        .map(|s| (s - mean) * (s - mean))
        .sum::<f64>()
        / samples.len() as f64;
    (mean, var.sqrt())
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let bar = ProgressBar::new(args.max_requests as u64);
    for n in 1..=args.max_requests {
        let results = burst(&args, n);
        let ok: Vec<f64> = results.iter().flatten().copied().collect();
        let failures = results.len() - ok.len();
        let (mean, std) = mean_std(&ok);
        bar.println(format!(
            "burst {:>3}: mean {:.3}s  std {:.3}s  failures {}",
            n, mean, std, failures
        ));
        bar.inc(1);
    }
    bar.finish();
    Ok(())
}
