// src/error.rs

use std::num::{ParseFloatError, ParseIntError};

use thiserror::Error;

use crate::ops::OpKind;

/// Errors that prevent an engine from being constructed.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Preallocation of fixed storage failed
    #[error("failed to allocate {what} ({requested} entries)")]
    AllocationFailure {
        what: &'static str,
        requested: usize,
    },

    /// The ring buffer cannot hold the shortest allowed loop
    #[error("ring capacity of {capacity} frames is below the minimum loop length of {minimum}")]
    CapacityTooSmall { capacity: usize, minimum: usize },
}

/// Result type for engine construction
pub type EngineResult<T> = Result<T, EngineError>;

/// Recoverable scheduling failures.
///
/// None of these stop processing. The caller drops the associated
/// operation and the engine keeps producing output.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("{queue} operation queue is full ({capacity} entries)")]
    SchedulingOverflow {
        queue: &'static str,
        capacity: usize,
    },

    #[error("{kind:?} transform is already active")]
    ConflictingActivation { kind: OpKind },

    #[error("cannot schedule an empty operation")]
    EmptyOperation,
}

/// Errors from the operation text form.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseOpError {
    #[error("empty operation")]
    Empty,

    #[error("unknown operation '{0}'")]
    UnknownOperation(String),

    #[error("missing field '{0}'")]
    MissingField(&'static str),

    #[error("invalid integer: {0}")]
    InvalidInt(#[from] ParseIntError),

    #[error("invalid float: {0}")]
    InvalidFloat(#[from] ParseFloatError),
}
