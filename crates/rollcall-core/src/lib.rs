//! rollcall-core — Presence tracking and attendance logging.
//!
//! Turns per-tick sets of recognized identities into ENTRY/EXIT events,
//! records them in an append-only CSV ledger, and keeps the durable
//! id-to-name directory used to label them.

pub mod config;
pub mod directory;
pub mod ledger;
pub mod presence;
pub mod session;
pub mod types;

pub use config::Config;
pub use directory::{DirectoryError, IdentityDirectory, Registration};
pub use ledger::{CsvLedger, Ledger, LedgerError, Summary};
pub use presence::{PresenceTracker, Transition};
pub use session::AttendanceSession;
pub use types::{Action, AttendanceEvent, Detection, Identity};
