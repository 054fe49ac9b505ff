//! Emitting Trace Event Format events from application code.
//!
//! [`Tracer`] is an explicit API over any [`tef_codec::EventSink`]. [`TefLayer`] records
//! the spans and events of the `tracing` ecosystem instead.

mod clock;
mod error;
mod frames;
mod layer;
mod tracer;
mod visitor;

#[cfg(test)]
mod tests;

pub use clock::{microsecond_timestamp, monotonic_timestamp, TimestampFn};
pub use error::{Result, TracerError};
pub use frames::{FrameProvider, NoFrames};
pub use layer::TefLayer;
pub use tracer::{Duration, ErrorHandler, EventOptions, Tracer};
