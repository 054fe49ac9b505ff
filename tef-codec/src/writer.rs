//! Incremental array-form output.

use crate::encode::encode_event;
use crate::error::{Result, TefError};
use crate::event::Event;
use std::io::Write;

/// Destination for events, one at a time.
pub trait EventSink {
    fn write(&mut self, event: &Event) -> Result<()>;

    /// Finishes the output. Calling it more than once has no further effect.
    fn close(&mut self) -> Result<()>;
}

impl<T: EventSink + ?Sized> EventSink for Box<T> {
    fn write(&mut self, event: &Event) -> Result<()> {
        (**self).write(event)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Unopened,
    Open,
    Closed,
}

/// Writes events as a JSON array while they happen.
///
/// Each event is flushed as soon as it is written, so at any point between calls the
/// output is a valid array missing only its closing `]`. A writer dropped without
/// [`close`](EventSink::close) leaves the output in exactly that state; the array reader
/// in [`Trace::from_json_array`](crate::Trace::from_json_array) accepts it.
///
/// Not synchronized: share it behind a mutex.
pub struct StreamingWriter<W: Write> {
    sink: Option<W>,
    state: State,
    events_written: u64,
}

impl<W: Write> StreamingWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink: Some(sink),
            state: State::Unopened,
            events_written: 0,
        }
    }

    pub fn events_written(&self) -> u64 {
        self.events_written
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// The underlying sink, until the writer is closed.
    pub fn get_ref(&self) -> Option<&W> {
        self.sink.as_ref()
    }

    /// Closes the writer and hands back the sink.
    pub fn into_inner(mut self) -> Result<W> {
        self.finish()?;
        self.sink.take().ok_or(TefError::WriterClosed)
    }

    fn finish(&mut self) -> Result<()> {
        let sink = match self.sink.as_mut() {
            Some(sink) => sink,
            None => return Ok(()),
        };
        match self.state {
            State::Unopened => sink.write_all(b"[]")?,
            State::Open => sink.write_all(b"]")?,
            State::Closed => return Ok(()),
        }
        sink.flush()?;
        self.state = State::Closed;
        tracing::debug!(events = self.events_written, "closed trace stream");
        Ok(())
    }
}

impl<W: Write> EventSink for StreamingWriter<W> {
    fn write(&mut self, event: &Event) -> Result<()> {
        let sink = match (self.state, self.sink.as_mut()) {
            (State::Closed, _) | (_, None) => return Err(TefError::WriterClosed),
            (_, Some(sink)) => sink,
        };

        let value = encode_event(event)?;
        let separator: &[u8] = match self.state {
            State::Unopened => b"[",
            _ => b",\n",
        };
        sink.write_all(separator)?;
        self.state = State::Open;
        serde_json::to_writer(&mut *sink, &value)?;
        sink.flush()?;
        self.events_written += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.finish()?;
        self.sink = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{DurationEvent, EventCore};
    use rstest::*;
    use serde_json::Value;

    fn begin(name: &str, ts: i64) -> Event {
        Event::BeginDuration(DurationEvent::builder().core(EventCore::new(name, ts)).build())
    }

    #[fixture]
    fn writer() -> StreamingWriter<Vec<u8>> {
        StreamingWriter::new(Vec::new())
    }

    fn contents(writer: &StreamingWriter<Vec<u8>>) -> String {
        String::from_utf8(writer.get_ref().cloned().unwrap_or_default()).expect("utf8 output")
    }

    #[rstest]
    fn test_nothing_written_is_empty(writer: StreamingWriter<Vec<u8>>) {
        assert_eq!(contents(&writer), "");
    }

    #[rstest]
    fn test_close_without_events(writer: StreamingWriter<Vec<u8>>) {
        let out = writer.into_inner().expect("closes");
        assert_eq!(out, b"[]");
    }

    #[rstest]
    fn test_unclosed_stream_is_open_array(mut writer: StreamingWriter<Vec<u8>>) {
        writer.write(&begin("A", 0)).expect("writes");
        let text = contents(&writer);
        assert!(text.starts_with('['));
        assert!(!text.ends_with(']'));
        let value: Value = serde_json::from_str(&format!("{text}]")).expect("valid after appending ]");
        assert_eq!(value.as_array().map(Vec::len), Some(1));
    }

    #[rstest]
    fn test_two_events_then_close(mut writer: StreamingWriter<Vec<u8>>) {
        writer.write(&begin("A", 0)).expect("writes");
        writer.write(&begin("B", 10)).expect("writes");
        assert_eq!(writer.events_written(), 2);
        let out = writer.into_inner().expect("closes");
        let value: Value = serde_json::from_slice(&out).expect("valid json");
        assert_eq!(value[1]["name"], "B");
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut buffer = Vec::new();
        {
            let mut writer = StreamingWriter::new(&mut buffer);
            writer.write(&begin("A", 0)).expect("writes");
            writer.close().expect("closes");
            writer.close().expect("second close is a no-op");
            assert!(writer.is_closed());
        }
        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(text.matches(']').count(), 1);
    }

    #[rstest]
    fn test_write_after_close(mut writer: StreamingWriter<Vec<u8>>) {
        writer.close().expect("closes");
        assert!(matches!(writer.write(&begin("A", 0)), Err(TefError::WriterClosed)));
    }

    #[test]
    fn test_boxed_sink() {
        let mut sink: Box<dyn EventSink> = Box::new(StreamingWriter::new(Vec::new()));
        sink.write(&begin("A", 0)).expect("writes");
        sink.close().expect("closes");
    }
}
