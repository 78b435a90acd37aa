//! Answer lockout for riddles
//!
//! A wrong answer locks the riddle until a persisted unlock time. The lock is
//! re-derived from storage on every check, so it survives restarts and the
//! countdown needs no state of its own.

pub mod clock;
pub mod controller;
pub mod format;
pub mod store;
pub mod ticker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use controller::{
    Feedback, LockStatus, LockoutController, LockoutSettings, MAX_LOCK, TickOutcome,
};
pub use format::{format_time, parse_time};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use ticker::{ManualScheduler, Scheduler, TickHandle, TickTask, TokioScheduler};
