//! Binary-edge concerns: verbosity, logging setup and fatal-error exit.

pub mod config;
pub mod error_handling;
pub mod logging;

pub use config::AppConfig;
pub use error_handling::handle_fatal_error;
pub use logging::init_logging;
