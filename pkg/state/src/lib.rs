//! Persistence and change notification: the SlateDB-backed state store,
//! the watch event log, and lease-based leader election.

pub mod client;
pub mod leader;
pub mod watch;
