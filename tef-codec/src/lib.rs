//! Reading and writing the Chrome Trace Event Format.
//!
//! A trace is either a JSON object with a `traceEvents` array and envelope fields, or a
//! bare array of events that may have been cut off mid-stream. [`Trace::from_reader`]
//! accepts both. Events decode into the closed [`Event`] sum type; frame-id stack
//! references are resolved against the trace's [`StackFrames`] once all events are read.
//!
//! ```
//! use tef_codec::{Event, EventSink, StreamingWriter, Trace};
//!
//! let trace = Trace::from_json_str(r#"[{"name":"A","ph":"B","ts":0},{"name":"A","ph":"E","ts":5}"#)?;
//! assert_eq!(trace.events.len(), 2);
//!
//! let mut writer = StreamingWriter::new(Vec::new());
//! for event in &trace.events {
//!     writer.write(event)?;
//! }
//! let bytes = writer.into_inner()?;
//! assert!(bytes.ends_with(b"]"));
//! assert!(matches!(trace.events[0], Event::BeginDuration(_)));
//! # Ok::<(), tef_codec::TefError>(())
//! ```

mod container;
mod decode;
mod encode;
mod error;
mod event;
mod stack;
mod writer;

pub use container::{DisplayTimeUnit, Trace, DEFAULT_CONTROLLER_TRACE_DATA_KEY};
pub use decode::{decode_event, split_categories, DecodedEvent};
pub use encode::{encode_event, join_categories};
pub use error::{Result, TefError};
pub use event::*;
pub use stack::{
    frame_id_from_value, resolve_pending, FrameId, StackFrame, StackFrames, StackRequest, StackSlot, StackTrace,
};
pub use writer::{EventSink, StreamingWriter};
