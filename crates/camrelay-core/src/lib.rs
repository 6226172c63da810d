//! Resilient periodic publication: run-state persistence, the worker state
//! machine, the watchdog and the cross-context plumbing between them.

mod bounded;
pub use bounded::{Interrupt, bounded};

mod config;
pub use config::RelayConfig;

mod context;
pub use context::{Collaborators, RelayContext};

pub mod control;
pub use control::{CommandLoop, Controller};

mod error;
pub use error::{
    CoreError, CycleError, FetchError, NotifyError, ResolveError, ScheduleError, StoreError,
    WorkError,
};

mod heartbeat;
pub use heartbeat::HeartbeatEmitter;

mod liveness;
pub use liveness::LivenessMark;

mod notify_gate;
pub use notify_gate::NotifyGate;

mod ports;
pub use ports::{
    Fetched, FixedResolver, LogNotifier, Notifier, Session, SessionFactory, SourceResolver,
    notify_best_effort,
};

mod recycler;
pub use recycler::{RecycleReason, ResourceRecycler};

pub mod scheduler;
pub use scheduler::{Inbox, Scheduler, WorkHandle, WorkState};

mod signal;
pub use signal::RunSignal;

pub mod state;
pub use state::{FileBackend, OverrideBackend, RunStateStore, StateBackend};

pub mod system;
pub use system::{MemoryProbe, ProcMemory};

mod watchdog;
pub use watchdog::{RestartReason, TickOutcome, Watchdog};

pub mod worker;
pub use worker::{PeriodicWorker, WorkerStatus};

#[cfg(test)]
mod testing;
