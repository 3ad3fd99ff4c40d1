//! Thin async layer over external commands (git, npm, rsync, ps).
//!
//! Everything that shells out goes through [`ProcessRunner`] so tests can swap
//! in [`MockProcessRunner`] and assert on the exact argument vectors.

pub mod builder;
pub mod error;
pub mod mock;
pub mod runner;


pub use builder::ProcessCommandBuilder;
pub use error::ProcessError;
pub use mock::{MockCommandConfig, MockProcessRunner};
pub use runner::{ExitStatus, ProcessCommand, ProcessOutput, ProcessRunner, TokioProcessRunner};
