use anyhow::{Context, Result};
use rollcall_core::{AttendanceSession, Config, CsvLedger, IdentityDirectory};
use tokio::io::{AsyncBufRead, BufReader};
use tracing_subscriber::EnvFilter;

mod engine;
mod source;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load().context("loading configuration")?;
    tracing::info!(
        ledger = %config.ledger_path.display(),
        directory = %config.directory_path.display(),
        "configuration loaded"
    );

    let directory = IdentityDirectory::load(&config.directory_path)
        .with_context(|| format!("loading {}", config.directory_path.display()))?;
    tracing::info!(identities = directory.len(), "identity directory loaded");

    let mut ledger = CsvLedger::new(&config.ledger_path, &config.summary_path);
    ledger.lock_writer()?;

    let engine = engine::spawn_engine(AttendanceSession::new(ledger, directory))?;

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = match &config.input {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("opening detection feed {}", path.display()))?;
            tracing::info!(path = %path.display(), "reading detections from file");
            Box::new(BufReader::new(file))
        }
        None => {
            tracing::info!("reading detections from stdin");
            Box::new(BufReader::new(tokio::io::stdin()))
        }
    };

    tracing::info!("rollcalld ready");

    let pumped = tokio::select! {
        result = source::pump(reader, &engine) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received");
            Ok(0)
        }
    };
    if let Err(error) = &pumped {
        tracing::error!(%error, "stopping after feed failure");
    }

    tracing::info!("rollcalld shutting down");
    let forced = engine.shutdown().await?;
    tracing::info!(forced_exits = forced.len(), "presence set drained");

    pumped?;
    Ok(())
}
