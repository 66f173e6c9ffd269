//! One-shot adb process execution.
//!
//! The transport never holds a shell open: every call spawns the adb
//! binary, waits with a hard deadline, and collects its output. The
//! `CommandRunner` seam exists so session logic can be exercised against
//! scripted fakes instead of a real device.

use std::io::Read;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::{DriverError, Result};

/// Collected output of one adb invocation.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Exit code, if the process terminated normally.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// Executes one adb command and returns its output.
pub trait CommandRunner: Send {
    fn run(&mut self, args: &[&str], timeout: Duration) -> Result<CommandOutput>;
}

/// Runs the configured adb binary via `std::process::Command`.
pub struct SystemRunner {
    adb_path: String,
    poll_interval: Duration,
}

impl SystemRunner {
    pub fn new(adb_path: impl Into<String>) -> Self {
        Self {
            adb_path: adb_path.into(),
            poll_interval: Duration::from_millis(10),
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&mut self, args: &[&str], timeout: Duration) -> Result<CommandOutput> {
        let mut child = Command::new(&self.adb_path)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()?;

        // Drain pipes on their own threads so a large screencap cannot
        // deadlock the deadline loop on a full pipe buffer.
        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let deadline = Instant::now() + timeout;
        let status = loop {
            match child.try_wait()? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    child.kill().ok();
                    child.wait().ok();
                    return Err(DriverError::timeout(
                        format!("adb {}", args.join(" ")),
                        timeout,
                    ));
                }
                None => thread::sleep(self.poll_interval),
            }
        };

        Ok(CommandOutput {
            status: status.code(),
            stdout: stdout.join().unwrap_or_default(),
            stderr: stderr.join().unwrap_or_default(),
        })
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf).ok();
        }
        buf
    })
}
