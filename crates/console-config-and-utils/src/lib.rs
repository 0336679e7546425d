//! Configuration, filesystem paths and logging setup shared by the Console crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{AuthTuning, Config, DEFAULT_IDENTITY_URL, DEFAULT_LOG_LEVEL};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
