//! # codebus
//!
//! An in-process message bus. Callers post integer-coded messages;
//! registered subscribers receive them in handler methods, each running on
//! a scheduler of its choice.
//!
//! ## Overview
//!
//! ```text
//! ┌────────┐  post(code, args)  ┌──────────┐  snapshot  ┌────────────────────────────┐
//! │ caller │───────────────────▶│   Bus    │───────────▶│ handler @ CURRENT_THREAD    │
//! └────────┘                    │ registry │───────────▶│ handler @ IO_POOL           │
//!                               └──────────┘───────────▶│ handler @ custom (≥ 1024)   │
//!                                                       └────────────────────────────┘
//! ```
//!
//! Each handler checks the posted arguments against its declared parameters
//! on its own scheduler. Messages that do not fit are dropped for that
//! handler without error.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use codebus::prelude::*;
//!
//! struct Greeter;
//!
//! #[subscriber]
//! impl Greeter {
//!     #[subscribe(code = 1, scheduler = CURRENT_THREAD)]
//!     fn greet(&self, name: String) {
//!         println!("hello, {name}");
//!     }
//! }
//!
//! fn main() -> Result<(), BusError> {
//!     let bus = codebus::global();
//!     let greeter = Arc::new(Greeter);
//!     bus.register_immediate(&greeter)?;
//!     bus.post(1, ("world",))?;
//!     Ok(())
//! }
//! ```
//!
//! The `#[subscriber]` expansion names `::codebus_core`; add `codebus-core` as
//! a dependency or pass `#[subscriber(crate = "codebus::codebus_core")]`.
//!
//! ## Features
//!
//! - `macros`: Enable the `#[subscriber]` attribute (default)
//! - `toml-config`: Load `codebus.toml` configuration files (default)
//! - `json-log`: JSON log output

use std::sync::OnceLock;

use tracing::{debug, warn};

pub mod config;
pub mod logging;

/// The engine crate, for paths in generated code.
pub use codebus_core;

pub use codebus_core::*;

#[cfg(feature = "macros")]
pub use codebus_macros::subscriber;

pub use config::{CodebusConfig, ConfigError, ConfigLoader, ConfigResult};

static GLOBAL: OnceLock<Bus> = OnceLock::new();

/// The process-wide default bus.
///
/// Built on first use from [`ConfigLoader`]'s default sources. The `logging`
/// section is applied through [`logging::init_from_config`], which leaves an
/// already installed subscriber in place. If loading fails, the defaults are
/// used and a warning is logged.
pub fn global() -> &'static Bus {
    GLOBAL.get_or_init(|| {
        let (config, load_error) = match ConfigLoader::new().load() {
            Ok(config) => (config, None),
            Err(e) => (CodebusConfig::default(), Some(e)),
        };

        logging::init_from_config(&config.logging);
        if let Some(e) = load_error {
            warn!(error = %e, "Failed to load configuration, using defaults");
        }
        debug!(
            cache_capacity = config.bus.cache_capacity,
            validate_arguments = config.bus.validate_arguments,
            "Global bus initialized"
        );
        Bus::with_config(config.bus)
    })
}

/// Common imports.
pub mod prelude {
    pub use codebus_core::{
        Arg, Args, BusError, BusResult, Bus, COMPUTE_POOL, CURRENT_THREAD, FIRST_CUSTOM, IO_POOL,
        NEW_THREAD, Scheduler, Subscriber, Subscriptions, TypedArg,
    };

    #[cfg(feature = "macros")]
    pub use codebus_macros::subscriber;
}
