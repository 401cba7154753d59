use chrono::{Local, NaiveDateTime};
use rollcall_core::{AttendanceEvent, AttendanceSession, Detection, Ledger, LedgerError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
    #[error("detection feed error: {0}")]
    Feed(std::io::Error),
    #[error("engine thread failed to start: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Result of one processed tick.
#[derive(Debug)]
pub struct TickResult {
    pub events: Vec<AttendanceEvent>,
    /// Presence set size after the tick.
    pub present: usize,
}

/// Messages sent from the feed reader to the engine thread.
enum EngineRequest {
    Tick {
        detections: Vec<Detection>,
        reply: oneshot::Sender<Result<TickResult, EngineError>>,
    },
    Shutdown {
        reply: oneshot::Sender<Result<Vec<AttendanceEvent>, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Submit one tick of detections and wait until its events are on disk.
    pub async fn tick(&self, detections: Vec<Detection>) -> Result<TickResult, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Tick {
                detections,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Drain the presence set, recording forced exits, and stop the engine.
    pub async fn shutdown(&self) -> Result<Vec<AttendanceEvent>, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Shutdown { reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The session, and with it the presence set, is owned by that thread alone.
/// Ticks are processed strictly in arrival order. If every handle is dropped
/// without a shutdown request, the engine drains on its own before exiting.
pub fn spawn_engine<L>(session: AttendanceSession<L>) -> Result<EngineHandle, EngineError>
where
    L: Ledger + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            let mut session = Some(session);
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Tick { detections, reply } => {
                        let result = match session.as_mut() {
                            Some(s) => s
                                .process_tick(&detections, now())
                                .map(|events| TickResult {
                                    events,
                                    present: s.present_count(),
                                })
                                .map_err(EngineError::from),
                            None => Err(EngineError::ChannelClosed),
                        };
                        let _ = reply.send(result);
                    }
                    EngineRequest::Shutdown { reply } => {
                        let result = match session.take() {
                            Some(s) => s.finish(now()).map_err(EngineError::from),
                            None => Ok(Vec::new()),
                        };
                        let _ = reply.send(result);
                        break;
                    }
                }
            }
            if let Some(s) = session.take() {
                tracing::warn!("engine channel closed without shutdown; draining");
                if let Err(error) = s.finish(now()) {
                    tracing::error!(%error, "failed to record forced exits");
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

/// One local wall-clock timestamp per tick.
fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{Action, CsvLedger, IdentityDirectory};
    use std::path::Path;
    use uuid::Uuid;

    fn session(dir: &Path) -> AttendanceSession<CsvLedger> {
        let mut directory = IdentityDirectory::load(dir.join("id_to_name_map.json")).unwrap();
        directory.register("1", "Jit").unwrap();
        let ledger = CsvLedger::new(dir.join("attendance_log.csv"), dir.join("summary.csv"));
        AttendanceSession::new(ledger, directory)
    }

    #[tokio::test]
    async fn test_tick_and_shutdown() {
        let dir = std::env::temp_dir().join(format!("rollcalld-engine-{}", Uuid::new_v4()));
        let engine = spawn_engine(session(&dir)).unwrap();

        let first = engine
            .tick(vec![Detection::known("1", "Jit", 40.0)])
            .await
            .unwrap();
        assert_eq!(first.events.len(), 1);
        assert_eq!(first.events[0].action, Action::Entry);
        assert_eq!(first.present, 1);

        let steady = engine
            .tick(vec![Detection::known("1", "Jit", 41.0), Detection::unknown(150.0)])
            .await
            .unwrap();
        assert!(steady.events.is_empty());

        let forced = engine.shutdown().await.unwrap();
        assert_eq!(forced.len(), 1);
        assert_eq!(forced[0].action, Action::ExitForced);
        assert_eq!(forced[0].display_name, "Jit");

        assert!(matches!(
            engine.tick(Vec::new()).await,
            Err(EngineError::ChannelClosed)
        ));

        let contents = std::fs::read_to_string(dir.join("attendance_log.csv")).unwrap();
        assert_eq!(contents.lines().count(), 3);

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn test_dropped_handle_still_drains() {
        let dir = std::env::temp_dir().join(format!("rollcalld-engine-{}", Uuid::new_v4()));
        let engine = spawn_engine(session(&dir)).unwrap();
        engine
            .tick(vec![Detection::known("1", "Jit", 40.0)])
            .await
            .unwrap();
        drop(engine);

        let log = dir.join("attendance_log.csv");
        let mut drained = false;
        for _ in 0..100 {
            let contents = std::fs::read_to_string(&log).unwrap();
            if contents.contains("EXIT (FORCED)") {
                drained = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(drained);

        std::fs::remove_dir_all(dir).ok();
    }
}
