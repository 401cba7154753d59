//! One attendance run: presence tracking wired to the ledger.

use crate::directory::IdentityDirectory;
use crate::ledger::{Ledger, LedgerError};
use crate::presence::{PresenceTracker, Transition};
use crate::types::{AttendanceEvent, Detection, UNKNOWN_NAME};
use chrono::NaiveDateTime;
use std::collections::HashMap;

/// Owns the presence set for the lifetime of a run.
///
/// Every transition is appended to the ledger as soon as it is produced.
/// Call [`finish`](Self::finish) at controlled shutdown to record forced exits.
pub struct AttendanceSession<L: Ledger> {
    tracker: PresenceTracker,
    ledger: L,
    directory: IdentityDirectory,
    /// Names reported by the resolver for currently present ids.
    seen_names: HashMap<String, String>,
}

impl<L: Ledger> AttendanceSession<L> {
    pub fn new(ledger: L, directory: IdentityDirectory) -> Self {
        Self {
            tracker: PresenceTracker::new(),
            ledger,
            directory,
            seen_names: HashMap::new(),
        }
    }

    /// Process one tick of detections stamped with `at`.
    ///
    /// Unknown faces and the background class are ignored. Returns the events
    /// appended for this tick. On a ledger failure the tick stops at the
    /// failing event; earlier events of the tick remain recorded and the
    /// presence set reflects only those.
    pub fn process_tick(
        &mut self,
        detections: &[Detection],
        at: NaiveDateTime,
    ) -> Result<Vec<AttendanceEvent>, LedgerError> {
        for d in detections {
            if let (Some(id), Some(identity)) = (d.known_id(), d.identity.as_ref()) {
                if !self.tracker.is_present(id) && !self.seen_names.contains_key(id) {
                    self.seen_names
                        .insert(id.to_string(), identity.display_name.clone());
                }
            }
        }

        let transitions = self
            .tracker
            .diff(detections.iter().filter_map(Detection::known_id));
        let events = self.record(transitions, at)?;

        if !events.is_empty() {
            tracing::debug!(
                events = events.len(),
                present = self.tracker.len(),
                "tick produced transitions"
            );
        }
        Ok(events)
    }

    /// Record a forced exit for everyone still present and end the run.
    pub fn finish(mut self, at: NaiveDateTime) -> Result<Vec<AttendanceEvent>, LedgerError> {
        let transitions = self.tracker.forced_exits();
        tracing::info!(remaining = transitions.len(), "draining presence set");
        self.record(transitions, at)
    }

    pub fn present_count(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_present(&self, id: &str) -> bool {
        self.tracker.is_present(id)
    }

    pub fn directory(&self) -> &IdentityDirectory {
        &self.directory
    }

    /// Append each transition, then apply it to the tracker. A transition
    /// whose append fails is not applied.
    fn record(
        &mut self,
        transitions: Vec<Transition>,
        at: NaiveDateTime,
    ) -> Result<Vec<AttendanceEvent>, LedgerError> {
        let mut events = Vec::with_capacity(transitions.len());
        for t in transitions {
            let name = self.display_name(&t.identity_id);
            let event = AttendanceEvent::new(at, &t.identity_id, &name, t.action);
            self.ledger.append(&event)?;
            self.tracker.commit(&t);
            if t.action.is_exit() {
                self.seen_names.remove(&t.identity_id);
            }
            events.push(event);
        }
        Ok(events)
    }

    /// Directory name first, then the name the resolver reported when the id
    /// entered (kept until its exit is recorded), then [`UNKNOWN_NAME`].
    fn display_name(&self, id: &str) -> String {
        match self.directory.resolve(id) {
            Ok(name) => name.to_string(),
            Err(_) => {
                let fallback = self
                    .seen_names
                    .get(id)
                    .filter(|n| !n.trim().is_empty())
                    .map(String::as_str)
                    .unwrap_or(UNKNOWN_NAME);
                tracing::debug!(id, name = fallback, "identity not in directory");
                fallback.to_string()
            }
        }
    }
}
