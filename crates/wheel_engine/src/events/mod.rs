//! Typed event bus
//!
//! Event kinds are small integer ids. A handful are built in for the window
//! collaborator, the rest are registered by name at runtime. Subscribers are
//! closures invoked in subscription order; the bus is owned by the engine
//! context and torn down with it.

use std::collections::HashMap;
use thiserror::Error;

/// Identifier of an event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventKind(u32);

impl EventKind {
    /// Window close was requested (close button or Escape)
    pub const QUIT: Self = Self(0);
    /// Framebuffer changed size
    pub const WINDOW_RESIZED: Self = Self(1);
    /// A key was released
    pub const KEY_RELEASED: Self = Self(2);

    const BUILTIN: [(&'static str, Self); 3] = [
        ("quit", Self::QUIT),
        ("window_resized", Self::WINDOW_RESIZED),
        ("key_released", Self::KEY_RELEASED),
    ];

    /// Raw id
    pub fn id(self) -> u32 {
        self.0
    }
}

/// Key-value event argument
#[derive(Debug, Clone, PartialEq)]
pub enum EventArg {
    /// Framebuffer size in pixels
    Size(u32, u32),
    /// Platform key name, e.g. "Escape"
    Key(String),
}

/// Event with kind and key-value arguments
#[derive(Debug, Clone)]
pub struct Event {
    /// Kind of event
    pub kind: EventKind,
    args: HashMap<&'static str, EventArg>,
}

impl Event {
    /// Create an event without arguments
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            args: HashMap::new(),
        }
    }

    /// Add an argument to the event (builder pattern)
    pub fn with_arg(mut self, key: &'static str, value: EventArg) -> Self {
        self.args.insert(key, value);
        self
    }

    /// Get an argument by key
    pub fn arg(&self, key: &str) -> Option<&EventArg> {
        self.args.get(key)
    }

    /// Get the `size` argument if present
    pub fn size(&self) -> Option<(u32, u32)> {
        match self.arg("size") {
            Some(EventArg::Size(w, h)) => Some((*w, *h)),
            _ => None,
        }
    }

    /// Get the `key` argument if present
    pub fn key(&self) -> Option<&str> {
        match self.arg("key") {
            Some(EventArg::Key(name)) => Some(name),
            _ => None,
        }
    }
}

/// Event bus errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum EventError {
    /// Subscription by a name nobody registered
    #[error("Unknown event kind: {0}")]
    UnknownKind(String),
}

type Subscriber = Box<dyn FnMut(&Event)>;

/// Mapping from event kind to an ordered list of subscribers
pub struct EventBus {
    names: HashMap<String, EventKind>,
    subscribers: HashMap<EventKind, Vec<Subscriber>>,
    next_id: u32,
}

impl EventBus {
    /// Create a bus with only the built-in kinds registered
    pub fn new() -> Self {
        let names = EventKind::BUILTIN
            .iter()
            .map(|(name, kind)| ((*name).to_string(), *kind))
            .collect();

        Self {
            names,
            subscribers: HashMap::new(),
            next_id: EventKind::BUILTIN.len() as u32,
        }
    }

    /// Register a kind by name, returning the existing id if already known
    pub fn register_kind(&mut self, name: &str) -> EventKind {
        if let Some(kind) = self.names.get(name) {
            return *kind;
        }

        let kind = EventKind(self.next_id);
        self.next_id += 1;
        self.names.insert(name.to_string(), kind);
        log::debug!("Registered event kind '{}' as {}", name, kind.0);
        kind
    }

    /// Look up a kind by name
    pub fn kind(&self, name: &str) -> Option<EventKind> {
        self.names.get(name).copied()
    }

    /// Subscribe a closure to a kind
    pub fn subscribe(&mut self, kind: EventKind, handler: impl FnMut(&Event) + 'static) {
        self.subscribers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Subscribe a closure to a kind registered under `name`
    pub fn subscribe_named(
        &mut self,
        name: &str,
        handler: impl FnMut(&Event) + 'static,
    ) -> Result<EventKind, EventError> {
        let kind = self.kind(name).ok_or_else(|| EventError::UnknownKind(name.to_string()))?;
        self.subscribe(kind, handler);
        Ok(kind)
    }

    /// Invoke every subscriber of the event's kind, in subscription order
    pub fn dispatch(&mut self, event: &Event) {
        if let Some(handlers) = self.subscribers.get_mut(&event.kind) {
            for handler in handlers.iter_mut() {
                handler(event);
            }
        }
    }

    /// Number of subscribers of a kind
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.subscribers.get(&kind).map_or(0, Vec::len)
    }

    /// Drop every subscriber, keeping registered kinds
    pub fn clear(&mut self) {
        self.subscribers.clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
