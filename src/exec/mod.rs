// src/exec/mod.rs

//! Node execution layer.
//!
//! - [`host`] defines the [`NodeHost`] trait: the protocol the engine uses to
//!   query and drive nodes it does not own.
//! - [`routine`] defines resumable process routines ([`ProcessRoutine`]) and
//!   the tagged [`Step`] results the driver consumes, plus small helpers for
//!   building routines.

pub mod host;
pub mod routine;

pub use host::NodeHost;
pub use routine::{PendingJob, ProcessRoutine, RoutineState, Step};
