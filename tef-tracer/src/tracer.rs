use crate::clock::{default_timestamp_fn, process_id, thread_id, TimestampFn};
use crate::error::{Result, TracerError};
use crate::frames::{capture, FrameProvider, NoFrames};
use bon::Builder;
use std::collections::BTreeMap;
use tef_codec::{
    Args, CompleteEvent, CounterEvent, DurationEvent, Event, EventCore, EventSink, InstantEvent, InstantScope,
    ProcessNameEvent, StackSlot, ThreadNameEvent,
};

pub type ErrorHandler = Box<dyn FnMut(&TracerError) + Send>;

/// Optional parts of an emitted event.
#[derive(Debug, Clone, Default, Builder)]
pub struct EventOptions {
    #[builder(default)]
    pub categories: Vec<String>,
    #[builder(default)]
    pub args: Args,
    /// Capture the stack at the point the event is emitted.
    #[builder(default)]
    pub stack_trace: bool,
    /// Capture the stack again as the end stack. Only complete events have one.
    #[builder(default)]
    pub end_stack_trace: bool,
}

impl EventOptions {
    pub fn none() -> Self {
        Self::default()
    }
}

/// Emits events into an [`EventSink`] with timestamps and process and thread ids filled in.
///
/// Failures of the sink are not returned to the caller: they are logged and passed to the
/// error handler, if one is set. Only misuse of [`EventOptions`] is returned as an error.
pub struct Tracer<S: EventSink> {
    sink: S,
    timestamp_fn: TimestampFn,
    frames: Box<dyn FrameProvider>,
    error_handler: Option<ErrorHandler>,
    process_id: i64,
}

/// An open `B` event. Pass it back to [`Duration::end`] to emit the matching `E`.
#[must_use = "a duration must be ended"]
#[derive(Debug)]
pub struct Duration {
    name: String,
    process_id: i64,
    thread_id: i64,
}

impl Duration {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn end<S: EventSink>(self, tracer: &mut Tracer<S>, options: EventOptions) -> Result<()> {
        let mut core = EventCore::new(self.name, tracer.timestamp());
        core.process_id = Some(self.process_id);
        core.thread_id = Some(self.thread_id);
        tracer.emit(Event::EndDuration(DurationEvent::builder().core(core).build()), options)
    }
}

impl<S: EventSink> Tracer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            timestamp_fn: default_timestamp_fn(),
            frames: Box::new(NoFrames),
            error_handler: None,
            process_id: process_id(),
        }
    }

    pub fn with_timestamp_fn(mut self, timestamp_fn: TimestampFn) -> Self {
        self.timestamp_fn = timestamp_fn;
        self
    }

    pub fn with_frame_provider(mut self, frames: impl FrameProvider + 'static) -> Self {
        self.frames = Box::new(frames);
        self
    }

    pub fn with_error_handler(mut self, handler: impl FnMut(&TracerError) + Send + 'static) -> Self {
        self.error_handler = Some(Box::new(handler));
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn begin_duration(&mut self, name: impl Into<String>, options: EventOptions) -> Result<Duration> {
        let core = self.core(name.into());
        let duration = Duration {
            name: core.name.clone(),
            process_id: self.process_id,
            thread_id: core.thread_id.unwrap_or_default(),
        };
        self.emit(Event::BeginDuration(DurationEvent::builder().core(core).build()), options)?;
        Ok(duration)
    }

    /// A thread-scoped instant event.
    pub fn instant(&mut self, name: impl Into<String>, options: EventOptions) -> Result<()> {
        self.scoped_instant(name, InstantScope::Thread, options)
    }

    pub fn scoped_instant(
        &mut self,
        name: impl Into<String>,
        scope: InstantScope,
        options: EventOptions,
    ) -> Result<()> {
        let core = self.core(name.into());
        self.emit(
            Event::Instant(InstantEvent::builder().core(core).scope(scope).build()),
            options,
        )
    }

    pub fn counter(
        &mut self,
        name: impl Into<String>,
        values: BTreeMap<String, f64>,
        options: EventOptions,
    ) -> Result<()> {
        let core = self.core(name.into());
        self.emit(
            Event::Counter(CounterEvent::builder().core(core).values(values).build()),
            options,
        )
    }

    /// A complete event that started at `start` (microseconds) and lasted `duration`.
    pub fn complete(
        &mut self,
        name: impl Into<String>,
        start: i64,
        duration: i64,
        options: EventOptions,
    ) -> Result<()> {
        let mut core = self.core(name.into());
        core.timestamp = start;
        self.emit(
            Event::Complete(CompleteEvent::builder().core(core).duration(duration).build()),
            options,
        )
    }

    pub fn process_name(&mut self, process_name: impl Into<String>) -> Result<()> {
        let mut core = self.core(String::new());
        core.thread_id = None;
        self.emit(
            Event::MetadataProcessName(ProcessNameEvent {
                core,
                process_name: process_name.into(),
            }),
            EventOptions::none(),
        )
    }

    /// Names the calling thread.
    pub fn thread_name(&mut self, thread_name: impl Into<String>) -> Result<()> {
        let core = self.core(String::new());
        self.emit(
            Event::MetadataThreadName(ThreadNameEvent {
                core,
                thread_name: thread_name.into(),
            }),
            EventOptions::none(),
        )
    }

    pub fn close(&mut self) -> Result<()> {
        self.sink.close().map_err(TracerError::Close)
    }

    fn timestamp(&self) -> i64 {
        (self.timestamp_fn)()
    }

    fn core(&self, name: String) -> EventCore {
        EventCore {
            name,
            timestamp: self.timestamp(),
            process_id: Some(self.process_id),
            thread_id: Some(thread_id()),
            ..Default::default()
        }
    }

    fn emit(&mut self, mut event: Event, options: EventOptions) -> Result<()> {
        apply_options(&mut event, options, self.frames.as_ref())?;
        if let Err(source) = self.sink.write(&event) {
            let err = TracerError::Write {
                phase: event.phase(),
                source,
            };
            tracing::warn!(error = %err, name = %event.core().name, "dropping trace event");
            if let Some(handler) = self.error_handler.as_mut() {
                handler(&err);
            }
        }
        Ok(())
    }
}

fn apply_options(event: &mut Event, options: EventOptions, frames: &dyn FrameProvider) -> Result<()> {
    let phase = event.phase();
    let unsupported = |capability| TracerError::Unsupported { capability, phase };

    if !options.categories.is_empty() {
        event.core_mut().categories = options.categories;
    }
    if !options.args.is_empty() {
        let args = event.args_mut().ok_or_else(|| unsupported("arguments"))?;
        args.extend(options.args);
    }
    if options.stack_trace {
        let slot = event
            .stack_trace_mut(StackSlot::Start)
            .ok_or_else(|| unsupported("a stack trace"))?;
        *slot = Some(capture(frames));
    }
    if options.end_stack_trace {
        let slot = event
            .stack_trace_mut(StackSlot::End)
            .ok_or_else(|| unsupported("an end stack trace"))?;
        *slot = Some(capture(frames));
    }
    Ok(())
}
