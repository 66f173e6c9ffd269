//! Synchronous in-process pub/sub for task notifications.
//!
//! Delivery is best-effort: a failing subscriber is logged and the
//! remaining subscribers still run. There is no global bus; an instance
//! is handed to the Controller at assembly time.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct TaskEvent {
    pub name: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

type Handler = Box<dyn Fn(&TaskEvent) -> anyhow::Result<()> + Send>;

pub struct EventBus {
    handlers: HashMap<String, Vec<Handler>>,
    enabled: bool,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            enabled: true,
        }
    }

    /// Subscribe a handler to an event name.
    pub fn on<F>(&mut self, event_name: impl Into<String>, handler: F)
    where
        F: Fn(&TaskEvent) -> anyhow::Result<()> + Send + 'static,
    {
        self.handlers
            .entry(event_name.into())
            .or_default()
            .push(Box::new(handler));
    }

    /// Emit an event to all subscribers, returning how many ran. Handler
    /// failures are logged and never abort the emitting call.
    pub fn emit(&self, event_name: &str, data: Value) -> usize {
        if !self.enabled {
            return 0;
        }
        let event = TaskEvent {
            name: event_name.to_string(),
            data,
            timestamp: Utc::now(),
        };
        let handlers = match self.handlers.get(event_name) {
            Some(h) => h,
            None => return 0,
        };
        for handler in handlers {
            if let Err(e) = handler(&event) {
                tracing::error!(event = event_name, error = %e, "event handler failed");
            }
        }
        handlers.len()
    }

    /// Drop subscribers for one event, or all of them.
    pub fn clear(&mut self, event_name: Option<&str>) {
        match event_name {
            Some(name) => {
                self.handlers.remove(name);
            }
            None => self.handlers.clear(),
        }
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }
}
