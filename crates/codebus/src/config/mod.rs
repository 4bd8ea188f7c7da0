//! Configuration for the bus and its logging.

pub mod error;
pub mod loader;
pub mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX, load_config, validate};
pub use schema::{CodebusConfig, LogFormat, LogLevel, LogOutput, LoggingConfig};
