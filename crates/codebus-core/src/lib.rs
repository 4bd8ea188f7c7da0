//! # codebus-core
//!
//! Dispatch engine for an in-process message bus keyed by integer codes.
//!
//! This layer provides:
//! - Argument and parameter shapes, plain and typed posts
//! - Handler declaration and type erasure for methods and static functions
//! - A bounded LRU cache of per-type handler declarations
//! - Schedulers: current thread, new thread, I/O pool, compute pool, custom
//! - The registry and the [`Bus`] that ties them together
//!
//! ```text
//! post(code, args) ──▶ registry snapshot ──▶ scheduler ──▶ validate ──▶ invoke
//! ```

pub mod args;
pub mod bus;
pub mod cache;
pub mod config;
pub mod error;
pub mod handler;
pub mod matcher;
mod registry;
pub mod scheduler;

pub use args::{Arg, Args, IntoArgs, ParamType, Payload, PostedMessage, TypedArg, Value};
pub use bus::{Bus, BusBuilder};
pub use cache::{DEFAULT_CACHE_CAPACITY, HandlerCache};
pub use config::BusConfig;
pub use error::{BusError, BusResult, InvokeError, InvokeResult};
pub use handler::{
    FromArg, Function, HandlerOutput, HandlerTemplate, Method, Subscriber, Subscriptions,
};
pub use scheduler::{
    COMPUTE_POOL, CURRENT_THREAD, CurrentThreadScheduler, Executor, ExecutorScheduler,
    FIRST_CUSTOM, FnExecutor, IO_POOL, Job, NEW_THREAD, NewThreadScheduler, Scheduler,
    TaskHandle, from_executor,
};
