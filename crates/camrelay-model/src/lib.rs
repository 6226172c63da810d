//! Wire and domain types shared by the camrelay crates.
//!
//! Everything here is plain data: the run-state record that survives restarts,
//! the fetch target resolved each cycle, the worker phase, the health report
//! and the control commands accepted from operators.

mod command;
pub use command::{Command, CommandReply};

mod error;
pub use error::TargetError;

mod health;
pub use health::HealthReport;

mod phase;
pub use phase::WorkerPhase;

mod run_state;
pub use run_state::RunState;

mod target;
pub use target::{Target, TargetSource, validate_fetch_url};

mod epoch_ms;
