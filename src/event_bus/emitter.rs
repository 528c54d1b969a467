use std::fmt;
use thiserror::Error;

use super::event::Event;

/// Abstract event emitter handed to the graph registry, execution engine,
/// and session manager so each component can publish without owning a bus.
pub trait EventEmitter: Send + Sync + fmt::Debug {
    /// Emit an event in a synchronous, non-blocking manner.
    fn emit(&self, event: Event) -> Result<(), EmitterError>;
}

/// Errors that can occur when emitting an event.
#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("event bus closed")]
    Closed,
}

/// Emitter backed by a bus channel sender.
#[derive(Clone, Debug)]
pub struct BusEmitter {
    sender: flume::Sender<Event>,
}

impl BusEmitter {
    pub fn new(sender: flume::Sender<Event>) -> Self {
        Self { sender }
    }
}

impl EventEmitter for BusEmitter {
    fn emit(&self, event: Event) -> Result<(), EmitterError> {
        self.sender.send(event).map_err(|_| EmitterError::Closed)
    }
}

/// Emitter that discards everything. Default for components constructed
/// without a bus.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit(&self, _event: Event) -> Result<(), EmitterError> {
        Ok(())
    }
}
