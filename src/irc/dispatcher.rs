//! Line protocol dispatcher.
//!
//! Incoming protocol lines are matched against an ordered list of
//! registered patterns; every matching handler fires with the captured
//! groups. One-shot listeners are removed after their first match.

use regex::Regex;

use crate::{RelayChatError, Result};

/// Handler invoked with the captured groups of a matching line.
///
/// Group 0 is the whole match; unmatched optional groups are empty.
pub type Handler = Box<dyn FnMut(&[String]) + Send>;

struct Listener {
    pattern: Regex,
    handler: Handler,
    once: bool,
    spent: bool,
}

/// Ordered pattern-match dispatcher for protocol lines.
#[derive(Default)]
pub struct Dispatcher {
    listeners: Vec<Listener>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a persistent listener.
    pub fn register<F>(&mut self, pattern: &str, handler: F) -> Result<()>
    where
        F: FnMut(&[String]) + Send + 'static,
    {
        self.add(pattern, Box::new(handler), false)
    }

    /// Register a listener removed after its first match.
    pub fn register_once<F>(&mut self, pattern: &str, handler: F) -> Result<()>
    where
        F: FnMut(&[String]) + Send + 'static,
    {
        self.add(pattern, Box::new(handler), true)
    }

    fn add(&mut self, pattern: &str, handler: Handler, once: bool) -> Result<()> {
        let pattern = Regex::new(pattern)
            .map_err(|e| RelayChatError::Protocol(format!("bad listener pattern: {e}")))?;
        self.listeners.push(Listener {
            pattern,
            handler,
            once,
            spent: false,
        });
        Ok(())
    }

    /// Feed one protocol line through the listener list.
    ///
    /// Listeners are evaluated in registration order against the list
    /// as it stood when the call began; all matching handlers fire.
    /// Spent one-shot listeners are compacted after the full pass, so a
    /// removal can never skip the listener that follows it.
    pub fn feed(&mut self, line: &str) {
        let count = self.listeners.len();
        for i in 0..count {
            if self.listeners[i].spent {
                continue;
            }

            let groups: Option<Vec<String>> = {
                let listener = &self.listeners[i];
                listener.pattern.captures(line).map(|caps| {
                    caps.iter()
                        .map(|g| g.map(|m| m.as_str().to_string()).unwrap_or_default())
                        .collect()
                })
            };

            if let Some(groups) = groups {
                let listener = &mut self.listeners[i];
                (listener.handler)(&groups);
                if listener.once {
                    listener.spent = true;
                }
            }
        }
        self.listeners.retain(|l| !l.spent);
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether no listeners are registered.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
