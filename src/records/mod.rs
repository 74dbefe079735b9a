//! Record log implementation.
//!
//! Records are stored in a single append-only log file that is read back in
//! full when the store opens.

mod log;

pub use log::{LoadedLog, RecordLog};
