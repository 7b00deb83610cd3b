#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod request;

pub mod classify;
pub mod naming;
pub mod util;

pub mod crypto {
    pub mod kdf;
    pub mod stream;
}

pub mod container {
    pub mod header;
    pub mod manifest;
}

pub mod archive;
pub mod dispatch;
pub mod event;
pub mod pipeline;

// Re-exports: stable API surface
pub use classify::{Category, classify};
pub use config::{DateBasis, EngineConfig};
pub use dispatch::{BatchHandle, CancellationFlag, Dispatcher};
pub use error::{ArrangeError, Result};
pub use event::{BatchEvent, BatchSummary, Ending, EventSink, FailureKind, NullSink, TaskOutcome};
pub use request::{BatchRequest, Direction, Mode, Operation, OrganizeBy, OrganizeParams, Password};
