//! Synthetic input dispatch with rate limiting.
//!
//! Every action blocks until the minimum inter-action interval has
//! elapsed, plus 10-30 ms of random jitter so dispatch never falls into a
//! strictly periodic pattern. Tap/swipe coordinates get a ±2 px jitter so
//! repeated taps do not land on the identical pixel.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::adb::AdbTransport;
use crate::error::{DriverError, Result};

/// Hard floor for the configurable minimum interval.
const MIN_INTERVAL_FLOOR: Duration = Duration::from_millis(50);
/// Default press duration for a plain tap, in milliseconds.
const TAP_PRESS_MS: u64 = 50;

pub const KEYCODE_HOME: i32 = 3;
pub const KEYCODE_BACK: i32 = 4;
pub const KEYCODE_APP_SWITCH: i32 = 187;

pub struct InputDispatcher {
    adb: Arc<Mutex<AdbTransport>>,
    last_action: Option<Instant>,
    min_interval: Duration,
    command_timeout: Duration,
    rng: StdRng,
}

impl InputDispatcher {
    pub fn new(
        adb: Arc<Mutex<AdbTransport>>,
        min_interval: Duration,
        command_timeout: Duration,
    ) -> Self {
        Self {
            adb,
            last_action: None,
            min_interval: min_interval.max(MIN_INTERVAL_FLOOR),
            command_timeout,
            rng: StdRng::from_entropy(),
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Change the minimum inter-action interval, floor-clamped to 50 ms.
    pub fn set_min_interval(&mut self, interval: Duration) {
        self.min_interval = interval.max(MIN_INTERVAL_FLOOR);
    }

    pub fn tap(&mut self, x: u32, y: u32) -> Result<()> {
        self.press("tap", x, y, TAP_PRESS_MS)
    }

    pub fn long_press(&mut self, x: u32, y: u32, duration_ms: u64) -> Result<()> {
        self.press("long_press", x, y, duration_ms)
    }

    pub fn swipe(&mut self, x1: u32, y1: u32, x2: u32, y2: u32, duration_ms: u64) -> Result<()> {
        let (x1, y1) = (self.jitter(x1), self.jitter(y1));
        let (x2, y2) = (self.jitter(x2), self.jitter(y2));
        self.dispatch(
            "swipe",
            format!("input swipe {x1} {y1} {x2} {y2} {duration_ms}"),
        )
    }

    /// Type text. Spaces and quotes are escaped for the remote shell's
    /// `input text` primitive.
    pub fn text(&mut self, content: &str) -> Result<()> {
        let escaped = escape_text(content);
        self.dispatch("text", format!("input text \"{escaped}\""))
    }

    pub fn key_event(&mut self, keycode: i32) -> Result<()> {
        self.dispatch("key_event", format!("input keyevent {keycode}"))
    }

    pub fn back(&mut self) -> Result<()> {
        self.key_event(KEYCODE_BACK)
    }

    pub fn home(&mut self) -> Result<()> {
        self.key_event(KEYCODE_HOME)
    }

    pub fn recent(&mut self) -> Result<()> {
        self.key_event(KEYCODE_APP_SWITCH)
    }

    fn press(&mut self, action: &'static str, x: u32, y: u32, duration_ms: u64) -> Result<()> {
        let (x, y) = (self.jitter(x), self.jitter(y));
        // Presses longer than a plain tap become a same-point swipe.
        let command = if duration_ms > TAP_PRESS_MS {
            format!("input swipe {x} {y} {x} {y} {duration_ms}")
        } else {
            format!("input tap {x} {y}")
        };
        self.dispatch(action, command)
    }

    fn dispatch(&mut self, action: &'static str, command: String) -> Result<()> {
        self.pace();
        match self.adb.lock().execute(&command, self.command_timeout) {
            Ok(_) => {
                self.last_action = Some(Instant::now());
                tracing::debug!(action, command = %command, "dispatched");
                Ok(())
            }
            Err(e) => Err(DriverError::action(action, e)),
        }
    }

    /// Block until the minimum interval since the previous dispatch has
    /// elapsed, plus random jitter.
    fn pace(&mut self) {
        if let Some(last) = self.last_action {
            let elapsed = last.elapsed();
            if elapsed < self.min_interval {
                let jitter = Duration::from_millis(self.rng.gen_range(10..=30));
                thread::sleep(self.min_interval - elapsed + jitter);
            }
        }
    }

    fn jitter(&mut self, v: u32) -> u32 {
        (v as i64 + self.rng.gen_range(-2..=2)).max(0) as u32
    }
}

fn escape_text(content: &str) -> String {
    content
        .replace('\\', "\\\\")
        .replace(' ', "%s")
        .replace('"', "\\\"")
        .replace('\'', "\\'")
}
