//! Identity resolver feed.
//!
//! The recognizer writes one JSON array per tick, one tick per line:
//!
//! ```text
//! [{"id": "1", "name": "Jit", "confidence": 38.2}, {"id": null, "confidence": 112.0}]
//! []
//! ```
//!
//! `id: null` marks a face the recognizer could not resolve. An empty array
//! is a tick with nobody in view.

use crate::engine::{EngineError, EngineHandle};
use rollcall_core::{Detection, Identity};
use serde::Deserialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// One element of a feed line.
#[derive(Debug, Deserialize)]
struct DetectionRecord {
    id: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    confidence: f32,
}

impl From<DetectionRecord> for Detection {
    fn from(r: DetectionRecord) -> Self {
        Detection {
            identity: r.id.map(|id| Identity {
                id,
                display_name: r.name.unwrap_or_default(),
            }),
            confidence: r.confidence,
        }
    }
}

/// Parse one feed line. Blank lines yield `Ok(None)`.
pub fn parse_tick(line: &str) -> Result<Option<Vec<Detection>>, serde_json::Error> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let records: Vec<DetectionRecord> = serde_json::from_str(line)?;
    Ok(Some(records.into_iter().map(Detection::from).collect()))
}

/// Feed every tick from `reader` to the engine until end of input.
///
/// Unparsable lines are logged and skipped. Returns the number of ticks
/// processed; a ledger failure ends the pump with an error.
pub async fn pump<R>(reader: R, engine: &EngineHandle) -> Result<u64, EngineError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut line_no = 0u64;
    let mut ticks = 0u64;

    while let Some(line) = lines.next_line().await.map_err(EngineError::Feed)? {
        line_no += 1;
        let detections = match parse_tick(&line) {
            Ok(Some(d)) => d,
            Ok(None) => continue,
            Err(error) => {
                tracing::warn!(line = line_no, %error, "skipping unparsable detection batch");
                continue;
            }
        };

        let result = engine.tick(detections).await?;
        ticks += 1;
        tracing::trace!(tick = ticks, present = result.present, "tick processed");
    }

    tracing::info!(ticks, "detection feed ended");
    Ok(ticks)
}
