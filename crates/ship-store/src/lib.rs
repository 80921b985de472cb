//! Durable, file-backed state for the ship orchestration engine.
//!
//! Tasks and work state live as JSON under a data directory, guarded by
//! a single async lock and an advisory `ship.lock` file that keeps a
//! second engine instance off the same directory. See [`StateStore`].

mod error;
mod io;
mod lock;
mod models;
mod store;

pub use error::StoreError;
pub use models::{CASCADE_PREFIX, ExecutionMode, Task, TaskStatus, WorkState, WorkerPin};
pub use store::StateStore;
