//! Android emulator automation core over adb.
//!
//! A session ([`adb::AdbTransport`]) wraps the adb binary with connect
//! candidates and loose result classification. On top of it sit screen
//! capture ([`capture::CaptureEngine`]), rate-limited input dispatch
//! ([`input::InputDispatcher`]), template location by normalized
//! cross-correlation ([`locator::Locator`]), and a [`controller::Controller`]
//! that composes them with bounded-retry task execution and an event bus.

pub mod adb;
pub mod capture;
pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod input;
pub mod locator;
pub mod monitor;

pub use adb::{AdbTransport, CommandOutput, CommandRunner, SessionState, SystemRunner};
pub use capture::{CaptureEngine, Frame};
pub use config::DriverConfig;
pub use controller::{Controller, RetryPolicy};
pub use error::{DriverError, Result};
pub use events::{EventBus, TaskEvent};
pub use input::InputDispatcher;
pub use locator::{Locator, MatchResult, Template};
pub use monitor::Monitor;
