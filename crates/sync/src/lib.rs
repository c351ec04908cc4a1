// crates/sync/src/lib.rs
//! Realtime job-status synchronization.
//!
//! Provides:
//! - `RealtimeLink`: one push connection per signed-in session, with
//!   automatic reconnect and a single registered event handler
//! - `JobBoard`: the job set and current-job pointer, mutated only
//!   through the idempotent merge rule
//! - `Coordinator`: issues commands to the migration control surface
//!   and merges realtime events and poll results into the board

pub mod board;
pub mod coordinator;
pub mod link;

pub use board::JobBoard;
pub use coordinator::{CommandError, Coordinator, CoordinatorConfig};
pub use link::{LinkConfig, LinkState, RealtimeLink, GLOBAL_PROGRESS_TOPIC, USER_PROGRESS_QUEUE};
