//! Error types for the codebus engine.
//!
//! Two families exist, mirroring where a failure can be observed:
//!
//! - [`BusError`] is returned synchronously to the caller of a bus operation
//!   (invalid scheduler ids, misconfigured handlers, use after shutdown).
//! - [`InvokeError`] describes a failure *inside* a scheduled invocation. It is
//!   never propagated to the poster; the bus logs it and moves on.
//!
//! Argument-shape mismatches detected by validation are neither: the message
//! is silently dropped for that handler.

use thiserror::Error;

// =============================================================================
// Bus Errors
// =============================================================================

/// Errors reported to the caller of a [`Bus`](crate::Bus) operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BusError {
    /// A custom scheduler was added below the reserved custom range.
    #[error("scheduler id {id} is reserved; custom schedulers start at {min}")]
    InvalidSchedulerId {
        /// The rejected id.
        id: i32,
        /// The first id available to custom schedulers.
        min: i32,
    },

    /// A handler selected a scheduler code that is neither built in nor
    /// registered as a custom scheduler.
    #[error("unsupported scheduler code {0}")]
    UnsupportedScheduler(i32),

    /// The bus has been shut down.
    #[error("bus has been shut down")]
    ShutDown,

    /// A shared worker pool could not be constructed.
    #[error("failed to build worker pool: {0}")]
    PoolBuild(String),
}

// =============================================================================
// Invocation Errors
// =============================================================================

/// Errors raised while invoking a single handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// The message carried a different number of arguments than the handler
    /// declares.
    #[error("handler takes {expected} argument(s), message carried {got}")]
    ArityMismatch {
        /// Declared parameter count.
        expected: usize,
        /// Posted argument count.
        got: usize,
    },

    /// An argument could not be converted to the declared parameter type.
    #[error("argument {index} cannot be read as `{expected}`")]
    ArgumentMismatch {
        /// Zero-based argument position.
        index: usize,
        /// Declared parameter type name.
        expected: &'static str,
    },

    /// An instance handler was invoked without a subscriber.
    #[error("instance handler invoked without a subscriber")]
    MissingTarget,

    /// The subscriber is not of the type the handler was declared on.
    #[error("subscriber is not a `{expected}`")]
    TargetMismatch {
        /// The declaring type.
        expected: &'static str,
    },

    /// The handler body returned an error.
    #[error("handler failed: {0}")]
    Failed(String),

    /// The handler body panicked.
    #[error("handler panicked: {0}")]
    Panicked(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Result type for handler invocation.
pub type InvokeResult<T> = Result<T, InvokeError>;
