//! Structured pipeline events with fan-out to pluggable sinks.
//!
//! The runner reports stage transitions, gate decisions, and non-fatal
//! warnings as [`Event`]s over a non-blocking channel. An [`EventBus`]
//! drains that channel on a background task and hands each event to every
//! registered [`EventSink`]: stdout for demos, memory for tests, or a tokio
//! channel for async consumers.

pub mod bus;
pub mod event;
pub mod sink;

pub use bus::EventBus;
pub use event::{DiagnosticEvent, Event, PipelineEvent};
pub use sink::{ChannelSink, EventSink, MemorySink, StdOutSink};
