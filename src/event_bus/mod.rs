//! Typed event bus cross-cutting the graph registry, execution engine, and
//! session lifecycle manager.
//!
//! Components publish [`Event`]s through an [`EventEmitter`] handle; an
//! [`EventBus`] drains the channel in emission order and broadcasts each
//! event to its registered [`EventSink`]s. State transitions are emitted
//! before any downstream routing begins, so observers see a node enter
//! `processing` strictly before its successors do.

pub mod bus;
pub mod emitter;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use emitter::{BusEmitter, EmitterError, EventEmitter, NullEmitter};
pub use event::{Event, ExecEvent, GraphEvent, SessionEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
