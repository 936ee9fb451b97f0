//! Resume capability for harvest runs
//!
//! Provides the durable checkpoint with atomic writes and file locking.

pub mod lock;
pub mod state;

pub use lock::RunLock;
pub use state::{CheckpointState, ResumeError, StateStore};
