//! Session transport: device-identity resolution and remote command
//! execution.
//!
//! The transport owns the session state and is the only component that
//! mutates it. Success/failure classification of adb output is substring
//! based and deliberately loose (exit codes from the remote shell are
//! unreliable); both heuristics live in single functions so they can be
//! swapped without touching call sites.

use std::sync::OnceLock;
use std::thread;
use std::time::Duration;

use regex::Regex;

use crate::adb::runner::{CommandOutput, CommandRunner};
use crate::error::{DriverError, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Session state. `identity` is the resolved device name, which may differ
/// from the dialed address when the platform assigns its own alias.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    pub identity: Option<String>,
    pub connected: bool,
    pub last_error: Option<String>,
}

pub struct AdbTransport {
    runner: Box<dyn CommandRunner>,
    state: SessionState,
    candidates: Vec<String>,
    command_timeout: Duration,
    reconnect_delay: Duration,
}

impl AdbTransport {
    pub fn new(
        runner: Box<dyn CommandRunner>,
        candidates: Vec<String>,
        command_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            state: SessionState::default(),
            candidates,
            command_timeout,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    /// Override the delay before the single dial retry. Mainly for tests.
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected
    }

    pub fn identity(&self) -> Option<&str> {
        self.state.identity.as_deref()
    }

    /// Establish a session.
    ///
    /// Already-enumerated identities are adopted without re-dialing. With
    /// no identity, the first live device wins; if none is live, the
    /// candidate endpoints are dialed in order, each retried once after a
    /// short fixed delay. The resolved identity is whatever the device
    /// list reports after connecting, then responsiveness is verified with
    /// an `echo` probe; a failing probe reverts the session to
    /// disconnected.
    pub fn connect(&mut self, identity: Option<&str>) -> Result<String> {
        self.state.connected = false;
        let live = self.list_devices().unwrap_or_default();

        let dialed = match identity {
            Some(id) if live.iter().any(|d| d == id) => {
                tracing::debug!(device = id, "already enumerated, skipping dial");
                id.to_string()
            }
            Some(id) => {
                self.dial(id)?;
                id.to_string()
            }
            None => match live.first().cloned() {
                Some(first) => {
                    tracing::debug!(device = %first, "adopting live device");
                    first
                }
                None => self.dial_candidates()?,
            },
        };

        // The platform may register the session under a different stable
        // alias than the one dialed; the enumerated name wins.
        let resolved = match self.list_devices() {
            Ok(after) if !after.is_empty() => {
                if after.iter().any(|d| d == &dialed) {
                    dialed
                } else {
                    after[0].clone()
                }
            }
            _ => dialed,
        };

        self.state.identity = Some(resolved.clone());
        self.state.connected = true;

        if let Err(e) = self.execute("echo ok", PROBE_TIMEOUT) {
            self.state.connected = false;
            self.state.last_error = Some(e.to_string());
            tracing::warn!(device = %resolved, error = %e, "probe failed after connect");
            return Err(e);
        }

        self.state.last_error = None;
        tracing::info!(device = %resolved, "connected");
        Ok(resolved)
    }

    /// Tear down the session. Idempotent; a failing `adb disconnect` is
    /// logged but the session still transitions to disconnected.
    pub fn disconnect(&mut self) -> Result<()> {
        if !self.state.connected {
            return Ok(());
        }
        if let Some(id) = self.state.identity.clone() {
            if let Err(e) = self.runner.run(&["disconnect", &id], self.command_timeout) {
                tracing::warn!(device = %id, error = %e, "disconnect command failed");
            }
        }
        self.state.connected = false;
        tracing::info!("disconnected");
        Ok(())
    }

    /// Run a remote shell command and return its trimmed stdout.
    pub fn execute(&mut self, command: &str, timeout: Duration) -> Result<String> {
        let id = self.require_identity()?;
        let out = self.runner.run(&["-s", &id, "shell", command], timeout)?;
        classify_shell_result(&out)?;
        Ok(out.stdout_text().trim().to_string())
    }

    /// Binary screen dump (PNG) via `exec-out screencap -p`.
    pub fn capture_raw(&mut self, timeout: Duration) -> Result<Vec<u8>> {
        let id = self.require_identity()?;
        let out = self
            .runner
            .run(&["-s", &id, "exec-out", "screencap", "-p"], timeout)?;
        classify_shell_result(&out)?;
        Ok(out.stdout)
    }

    /// Screen resolution as reported by `wm size`.
    pub fn query_display_metrics(&mut self) -> Result<(u32, u32)> {
        let output = self.execute("wm size", self.command_timeout)?;
        parse_display_metrics(&output)
    }

    /// Whether the display is powered on, per `dumpsys power`.
    pub fn is_screen_on(&mut self) -> Result<bool> {
        let output = self.execute("dumpsys power | grep 'Display Power'", self.command_timeout)?;
        Ok(output.contains("state=ON") || output.contains("ON"))
    }

    /// Devices currently in the `device` state.
    pub fn list_devices(&mut self) -> Result<Vec<String>> {
        let out = self.runner.run(&["devices"], self.command_timeout)?;
        let text = out.stdout_text();
        Ok(text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with("List of devices") && !l.starts_with('*'))
            .filter_map(|l| {
                let mut cols = l.split_whitespace();
                match (cols.next(), cols.next()) {
                    (Some(serial), Some("device")) => Some(serial.to_string()),
                    _ => None,
                }
            })
            .collect())
    }

    fn require_identity(&self) -> Result<String> {
        if !self.state.connected {
            return Err(DriverError::NotConnected);
        }
        self.state.identity.clone().ok_or(DriverError::NotConnected)
    }

    fn dial_candidates(&mut self) -> Result<String> {
        let candidates = self.candidates.clone();
        for candidate in &candidates {
            match self.dial(candidate) {
                Ok(()) => return Ok(candidate.clone()),
                Err(e) => tracing::debug!(endpoint = %candidate, error = %e, "candidate failed"),
            }
        }
        Err(DriverError::command("no reachable device among candidates"))
    }

    /// Dial one endpoint, retrying once after a short fixed delay. This is
    /// the only silent retry anywhere in the transport.
    fn dial(&mut self, target: &str) -> Result<()> {
        let out = self.runner.run(&["connect", target], self.command_timeout)?;
        if classify_connect_response(&out.stdout_text()) {
            return Ok(());
        }
        thread::sleep(self.reconnect_delay);
        let out = self.runner.run(&["connect", target], self.command_timeout)?;
        if classify_connect_response(&out.stdout_text()) {
            Ok(())
        } else {
            Err(DriverError::command(format!(
                "failed to connect {}: {}",
                target,
                out.stdout_text().trim()
            )))
        }
    }
}

/// Substring classification of `adb connect` output. Covers both
/// "connected to X" and "already connected to X".
fn classify_connect_response(stdout: &str) -> bool {
    stdout.contains("connected") && !stdout.contains("cannot connect")
}

/// Loose success/failure classification for remote shell output.
///
/// `adb shell` exit codes are unreliable, so a command counts as failed
/// only when the exit status is nonzero AND stderr carries an "error"
/// marker. Known fragility inherited from the field; swap this function
/// to change the heuristic.
fn classify_shell_result(out: &CommandOutput) -> Result<()> {
    if !out.success() {
        let stderr = out.stderr_text();
        if stderr.to_lowercase().contains("error") {
            return Err(DriverError::command(stderr.trim().to_string()));
        }
    }
    Ok(())
}

/// Parse `wm size` output: "Physical size: WxH" or a bare "WxH".
fn parse_display_metrics(output: &str) -> Result<(u32, u32)> {
    static SIZE_RE: OnceLock<Regex> = OnceLock::new();
    let re = SIZE_RE.get_or_init(|| Regex::new(r"(\d+)\s*x\s*(\d+)").expect("static regex"));

    let relevant = match output.find("Physical size:") {
        Some(idx) => &output[idx..],
        None => output,
    };
    let caps = re
        .captures(relevant)
        .ok_or_else(|| DriverError::parse(format!("invalid size format: {output:?}")))?;
    let width = caps[1]
        .parse::<u32>()
        .map_err(|e| DriverError::parse(format!("bad width: {e}")))?;
    let height = caps[2]
        .parse::<u32>()
        .map_err(|e| DriverError::parse(format!("bad height: {e}")))?;
    Ok((width, height))
}
