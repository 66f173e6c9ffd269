//! Lightweight run metrics: named counters, timers, and a frame-rate
//! estimate over a bounded history. Explicitly owned by whoever assembles
//! the controller; there is no global instance.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

const FPS_HISTORY: usize = 100;

pub struct Monitor {
    fps_history: VecDeque<f64>,
    last_frame: Option<Instant>,
    counters: HashMap<String, u64>,
    timers: HashMap<String, Instant>,
}

impl Monitor {
    pub fn new() -> Self {
        Self {
            fps_history: VecDeque::with_capacity(FPS_HISTORY),
            last_frame: None,
            counters: HashMap::new(),
            timers: HashMap::new(),
        }
    }

    /// Record one frame; returns the instantaneous rate.
    pub fn frame_tick(&mut self) -> f64 {
        let now = Instant::now();
        let fps = match self.last_frame {
            Some(last) => {
                let delta = now.duration_since(last).as_secs_f64();
                if delta > 0.0 {
                    1.0 / delta
                } else {
                    0.0
                }
            }
            None => 0.0,
        };
        if fps > 0.0 {
            if self.fps_history.len() == FPS_HISTORY {
                self.fps_history.pop_front();
            }
            self.fps_history.push_back(fps);
        }
        self.last_frame = Some(now);
        fps
    }

    pub fn fps(&self) -> f64 {
        if self.fps_history.is_empty() {
            return 0.0;
        }
        self.fps_history.iter().sum::<f64>() / self.fps_history.len() as f64
    }

    pub fn count(&mut self, name: &str, value: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn get_count(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn timer_start(&mut self, name: &str) {
        self.timers.insert(name.to_string(), Instant::now());
    }

    pub fn timer_end(&mut self, name: &str) -> Option<Duration> {
        self.timers.remove(name).map(|start| start.elapsed())
    }

    pub fn reset(&mut self) {
        self.fps_history.clear();
        self.counters.clear();
        self.timers.clear();
        self.last_frame = None;
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}
