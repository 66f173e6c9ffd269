//! Device session transport over the adb binary.

pub mod runner;
pub mod transport;

pub use runner::{CommandOutput, CommandRunner, SystemRunner};
pub use transport::{AdbTransport, SessionState};
