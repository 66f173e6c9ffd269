//! Task-level orchestration: capture, locate, dispatch, and bounded-retry
//! task execution.
//!
//! Convenience methods collapse failures to a plain `false` so task
//! functions stay ergonomic; only `run_task` surfaces the last typed
//! error after exhausting its retries.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;

use crate::adb::{AdbTransport, CommandRunner, SystemRunner};
use crate::capture::CaptureEngine;
use crate::config::DriverConfig;
use crate::error::{DriverError, Result};
use crate::events::EventBus;
use crate::input::InputDispatcher;
use crate::locator::{Locator, Template};
use crate::monitor::Monitor;

/// Bounded-retry policy for task functions: up to `attempts` tries with a
/// fixed delay in between. Composed explicitly at assembly time.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

pub struct Controller {
    adb: Arc<Mutex<AdbTransport>>,
    pub capture: CaptureEngine,
    pub input: InputDispatcher,
    locator: Locator,
    events: EventBus,
    monitor: Monitor,
    retry: RetryPolicy,
    wait_timeout: Duration,
    poll_interval: Duration,
    device_id: Option<String>,
}

impl Controller {
    /// Assemble a controller driving the real adb binary.
    pub fn new(config: DriverConfig, events: EventBus) -> Self {
        let runner = SystemRunner::new(config.adb_path.clone());
        Self::with_runner(config, Box::new(runner), events)
    }

    /// Assemble with an explicit command runner (fakes in tests).
    pub fn with_runner(
        config: DriverConfig,
        runner: Box<dyn CommandRunner>,
        events: EventBus,
    ) -> Self {
        let command_timeout = Duration::from_secs(config.command_timeout_secs);
        let transport = AdbTransport::new(runner, config.connect_candidates.clone(), command_timeout);
        let adb = Arc::new(Mutex::new(transport));
        Self {
            capture: CaptureEngine::new(Arc::clone(&adb)),
            input: InputDispatcher::new(
                Arc::clone(&adb),
                Duration::from_millis(config.min_input_interval_ms),
                command_timeout,
            ),
            locator: Locator::new(config.match_threshold),
            events,
            monitor: Monitor::new(),
            retry: RetryPolicy {
                attempts: config.task_attempts,
                delay: Duration::from_secs(config.task_retry_delay_secs),
            },
            wait_timeout: Duration::from_secs(config.wait_timeout_secs),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            device_id: config.device_id,
            adb,
        }
    }

    pub fn set_retry_policy(&mut self, policy: RetryPolicy) {
        self.retry = policy;
    }

    pub fn monitor(&self) -> &Monitor {
        &self.monitor
    }

    pub fn events_mut(&mut self) -> &mut EventBus {
        &mut self.events
    }

    pub fn is_connected(&self) -> bool {
        self.adb.lock().is_connected()
    }

    /// Connect to the configured device (or discover one) and log the
    /// screen geometry.
    pub fn connect(&mut self) -> Result<String> {
        let resolved = self.adb.lock().connect(self.device_id.as_deref())?;

        match self.capture.resolution() {
            Ok((w, h)) => tracing::info!(width = w, height = h, "screen size"),
            Err(e) => tracing::warn!(error = %e, "could not determine screen size"),
        }
        if let Ok(false) = self.adb.lock().is_screen_on() {
            tracing::warn!("device screen appears to be off");
        }
        Ok(resolved)
    }

    pub fn disconnect(&mut self) -> Result<()> {
        self.adb.lock().disconnect()
    }

    /// Locate the template in a fresh capture and tap its center. `false`
    /// when not found or on a collapsed failure.
    pub fn tap_on_image(&mut self, template: &Template) -> bool {
        let threshold = self.locator.default_threshold;
        self.tap_on_image_with(template, threshold)
    }

    pub fn tap_on_image_with(&mut self, template: &Template, threshold: f64) -> bool {
        let frame = match self.capture.capture() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "capture failed");
                return false;
            }
        };
        self.monitor.frame_tick();
        self.monitor.count("frames", 1);

        let result = self.locator.locate(&frame, template, threshold);
        if !result.found {
            tracing::warn!(template = %template.name, score = result.score, "template not found");
            return false;
        }

        match self.input.tap(result.center.0, result.center.1) {
            Ok(()) => {
                self.monitor.count("taps", 1);
                true
            }
            Err(e) => {
                tracing::warn!(template = %template.name, error = %e, "tap failed");
                false
            }
        }
    }

    /// Wait for the template with the configured timeout and poll
    /// interval; failures collapse to `false`.
    pub fn wait_for(&mut self, template: &Template) -> bool {
        let threshold = self.locator.default_threshold;
        let (timeout, poll) = (self.wait_timeout, self.poll_interval);
        self.wait_for_with(template, threshold, timeout, poll)
            .unwrap_or_else(|e| {
                tracing::warn!(template = %template.name, error = %e, "wait_for failed");
                false
            })
    }

    /// Explicit-argument wait; capture failures propagate.
    pub fn wait_for_with(
        &mut self,
        template: &Template,
        threshold: f64,
        timeout: Duration,
        poll: Duration,
    ) -> Result<bool> {
        self.locator
            .wait_for(&mut self.capture, template, threshold, timeout, poll)
    }

    pub fn tap(&mut self, x: u32, y: u32) -> bool {
        self.apply("tap", |c| c.input.tap(x, y))
    }

    pub fn swipe(&mut self, x1: u32, y1: u32, x2: u32, y2: u32, duration_ms: u64) -> bool {
        self.apply("swipe", |c| c.input.swipe(x1, y1, x2, y2, duration_ms))
    }

    pub fn text(&mut self, content: &str) -> bool {
        self.apply("text", |c| c.input.text(content))
    }

    pub fn back(&mut self) -> bool {
        self.apply("back", |c| c.input.back())
    }

    pub fn home(&mut self) -> bool {
        self.apply("home", |c| c.input.home())
    }

    fn apply<F>(&mut self, action: &str, op: F) -> bool
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        match op(self) {
            Ok(()) => {
                self.monitor.count(action, 1);
                true
            }
            Err(e) => {
                tracing::warn!(action, error = %e, "input failed");
                false
            }
        }
    }

    /// Run a task function under the retry policy. Every error is logged
    /// and counted as a failed attempt; after the final attempt the last
    /// error propagates so callers can tell permanent failure apart from a
    /// plain negative outcome.
    pub fn run_task<F>(&mut self, name: &str, mut task: F) -> Result<bool>
    where
        F: FnMut(&mut Controller) -> Result<bool>,
    {
        tracing::info!(task = name, "running task");
        self.events.emit("task.started", json!({ "task": name }));

        let attempts = self.retry.attempts.max(1);
        let mut last_err = None;

        for attempt in 1..=attempts {
            self.monitor.count("task.attempts", 1);
            match task(self) {
                Ok(outcome) => {
                    if outcome {
                        tracing::info!(task = name, "task completed");
                        self.events.emit("task.succeeded", json!({ "task": name }));
                    } else {
                        tracing::warn!(task = name, "task reported failure");
                        self.events
                            .emit("task.failed", json!({ "task": name, "reason": "negative" }));
                    }
                    return Ok(outcome);
                }
                Err(e) => {
                    tracing::warn!(task = name, attempt, error = %e, "task attempt failed");
                    last_err = Some(e);
                    if attempt < attempts {
                        thread::sleep(self.retry.delay);
                    }
                }
            }
        }

        let err =
            last_err.unwrap_or_else(|| DriverError::command("task finished without attempts"));
        self.events
            .emit("task.failed", json!({ "task": name, "error": err.to_string() }));
        Err(err)
    }
}
