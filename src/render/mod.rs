//! Output rendering for CLI commands.

pub mod error;
pub mod robot;

pub use robot::RobotOutput;
