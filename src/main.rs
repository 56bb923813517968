use clap::Parser;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::thread;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use routegate::config::{LogFormat, LoggingConfig, RoutegateConfig};
use routegate::ratelimit::AdmissionController;

/// Replay request lines through a route admission controller.
///
/// Each stdin line is `METHOD ROUTE [USER-AGENT...]`; one JSON verdict is
/// written to stdout per request.
#[derive(Parser, Debug)]
#[command(name = "routegate", version, about)]
struct Args {
    /// Path to a YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured log format
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => RoutegateConfig::from_file(path)?,
        None => RoutegateConfig::default(),
    };
    if let Some(format) = args.log_format {
        config.logging.format = format;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging)?;

    info!("Starting Routegate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &args.config {
        Some(path) => info!(path = %path.display(), "Configuration loaded"),
        None => info!("No configuration file given, using defaults"),
    }

    let controller = AdmissionController::new(config.limiter);
    info!(enabled = controller.config().enabled, "Admission controller initialized");

    let lines = spawn_stdin_reader();
    let mut stdout = tokio::io::stdout();

    tokio::select! {
        result = replay(&controller, lines, &mut stdout) => result?,
        _ = shutdown_signal() => {}
    }

    info!("Routegate stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&logging.level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(true);

    match logging.format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }

    Ok(())
}

/// A request parsed from one replay line.
#[derive(Debug, PartialEq, Eq)]
struct ReplayRequest<'a> {
    method: &'a str,
    route: &'a str,
    identifier: String,
}

/// Parse `METHOD ROUTE [USER-AGENT...]`.
///
/// Returns `None` for blank lines and `#` comments.
fn parse_request_line(line: &str) -> Option<Result<ReplayRequest<'_>, &'static str>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let mut parts = line.split_whitespace();
    let method = parts.next()?;
    let Some(route) = parts.next() else {
        return Some(Err("missing route"));
    };
    let identifier = parts.collect::<Vec<_>>().join(" ");

    Some(Ok(ReplayRequest {
        method,
        route,
        identifier,
    }))
}

/// Read stdin on a plain OS thread and forward each line.
///
/// A blocking stdin read cannot be cancelled, so it must not live on the
/// runtime: the thread is left behind when `main` returns. It stops at EOF,
/// after the first read error, or once the receiver is dropped.
fn spawn_stdin_reader() -> mpsc::Receiver<io::Result<String>> {
    let (tx, rx) = mpsc::channel(64);

    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let failed = line.is_err();
            if tx.blocking_send(line).is_err() || failed {
                break;
            }
        }
    });

    rx
}

/// Evaluate request lines until the sender side closes.
async fn replay<W>(
    controller: &AdmissionController,
    mut lines: mpsc::Receiver<io::Result<String>>,
    out: &mut W,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (mut admitted, mut rejected) = (0u64, 0u64);
    let mut line_number = 0usize;

    while let Some(line) = lines.recv().await {
        let line = line?;
        line_number += 1;

        let request = match parse_request_line(&line) {
            None => continue,
            Some(Ok(request)) => request,
            Some(Err(reason)) => {
                warn!(line = line_number, reason, "Skipping malformed request line");
                continue;
            }
        };

        let verdict = controller.evaluate(request.method, request.route, &request.identifier);
        if verdict.is_admit() {
            admitted += 1;
        } else {
            rejected += 1;
        }

        let mut output = serde_json::to_vec(&verdict)?;
        output.push(b'\n');
        out.write_all(&output).await?;
        out.flush().await?;
    }

    info!(admitted, rejected, "Replay finished");
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use routegate::config::LimiterConfig;

    #[test]
    fn test_parse_request_line() {
        let parsed = parse_request_line("GET /report Mozilla/5.0 (X11; Linux)")
            .unwrap()
            .unwrap();
        assert_eq!(parsed.method, "GET");
        assert_eq!(parsed.route, "/report");
        assert_eq!(parsed.identifier, "Mozilla/5.0 (X11; Linux)");
    }

    #[test]
    fn test_parse_request_line_without_identifier() {
        let parsed = parse_request_line("  POST   /api/items  ").unwrap().unwrap();
        assert_eq!(parsed.route, "/api/items");
        assert_eq!(parsed.identifier, "");
    }

    #[test]
    fn test_parse_request_line_skips_blank_and_comments() {
        assert!(parse_request_line("").is_none());
        assert!(parse_request_line("   ").is_none());
        assert!(parse_request_line("# warmup").is_none());
    }

    #[test]
    fn test_parse_request_line_missing_route() {
        assert_eq!(parse_request_line("GET"), Some(Err("missing route")));
    }

    #[tokio::test]
    async fn test_replay_writes_one_verdict_per_request() {
        let controller = AdmissionController::new(
            LimiterConfig::default()
                .with_global_qps(1.0)
                .with_ignored_url("/health"),
        );
        let (tx, rx) = mpsc::channel(8);
        for line in ["GET /a", "# comment", "GET", "GET /a", "GET /health"] {
            tx.send(Ok(line.to_string())).await.unwrap();
        }
        drop(tx);

        let mut out = Vec::new();
        replay(&controller, rx, &mut out).await.unwrap();

        let verdicts: Vec<serde_json::Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(verdicts.len(), 3);
        assert_eq!(verdicts[0]["verdict"], "admit");
        assert_eq!(verdicts[1]["verdict"], "reject");
        assert_eq!(verdicts[2]["verdict"], "admit");
    }

    #[tokio::test]
    async fn test_replay_stops_on_read_error() {
        let controller = AdmissionController::new(LimiterConfig::default());
        let (tx, rx) = mpsc::channel(2);
        tx.send(Err(io::Error::new(io::ErrorKind::InvalidData, "bad utf-8")))
            .await
            .unwrap();

        let mut out = Vec::new();
        assert!(replay(&controller, rx, &mut out).await.is_err());
        assert!(out.is_empty());
    }
}
