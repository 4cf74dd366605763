use anyhow::{Context, Result};
use solana_position_engine::config::Config;
use solana_position_engine::router::Router;
use solana_position_engine::{monitoring, Decision, FeedEvent};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load local .env if present (no-op in prod/systemd envs)
    let _ = dotenvy::dotenv();

    let cfg = Config::from_env()?;
    monitoring::init_tracing(cfg.log_json);
    info!(?cfg, "boot");

    let (tx, rx) = mpsc::channel(cfg.channel_capacity);
    let router = Router::spawn(cfg.engine_settings(), cfg.shards, cfg.channel_capacity, tx)?;
    let writer = tokio::spawn(write_decisions(rx, cfg.decisions_path.clone()));

    let input: Box<dyn tokio::io::AsyncRead + Unpin + Send> = match cfg.feed_path.as_deref() {
        Some(path) => Box::new(
            tokio::fs::File::open(path)
                .await
                .with_context(|| format!("open feed {path}"))?,
        ),
        None => Box::new(tokio::io::stdin()),
    };

    let mut lines = BufReader::new(input).lines();
    let mut line_no = 0usize;
    let mut accepted = 0usize;
    while let Some(line) = lines.next_line().await? {
        line_no += 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match serde_json::from_str::<FeedEvent>(line) {
            Ok(event) => {
                router.dispatch(event).await?;
                accepted += 1;
            }
            Err(e) => warn!(line = line_no, error = %e, "replay.bad_line"),
        }
    }

    let managers = router.shutdown().await?;
    writer.await??;

    for manager in &managers {
        for snap in manager.snapshots() {
            info!(
                token = %snap.token_id,
                amount = snap.token_amount,
                unrealized_value = snap.unrealized_value,
                max_drawdown_pct = snap.max_drawdown_pct,
                phase = ?snap.pump_phase,
                "replay.still_open"
            );
        }
    }
    info!(lines = line_no, events = accepted, "replay.done");

    Ok(())
}

async fn write_decisions(mut rx: mpsc::Receiver<Decision>, path: Option<String>) -> Result<()> {
    let mut out: Box<dyn AsyncWrite + Unpin + Send> = match path.as_deref() {
        Some(p) => Box::new(
            tokio::fs::File::create(p)
                .await
                .with_context(|| format!("create decisions file {p}"))?,
        ),
        None => Box::new(tokio::io::stdout()),
    };

    while let Some(decision) = rx.recv().await {
        let mut raw = serde_json::to_vec(&decision)?;
        raw.push(b'\n');
        out.write_all(&raw).await?;
    }
    out.flush().await?;
    Ok(())
}
