use crate::clock::{default_timestamp_fn, process_id, thread_id, TimestampFn};
use crate::visitor::FieldArgs;
use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tef_codec::{Args, DurationEvent, Event, EventCore, EventSink, InstantEvent};
use thread_local::ThreadLocal;
use tracing::span::{Attributes, Record};
use tracing::{Id, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

struct SpanFields {
    fields: FieldArgs,
}

/// Records `tracing` spans as `B`/`E` pairs and `tracing` events as thread-scoped
/// instant events. Span and event fields become event arguments, the target becomes the
/// category.
///
/// The sink is shared with the caller through [`TefLayer::sink`] so that it can be closed
/// once the subscriber is no longer in use.
pub struct TefLayer<S: EventSink> {
    sink: Arc<Mutex<S>>,
    timestamp_fn: TimestampFn,
    thread_ids: ThreadLocal<Cell<i64>>,
    process_id: i64,
    dropped: AtomicU64,
}

impl<S: EventSink> TefLayer<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(Mutex::new(sink)),
            timestamp_fn: default_timestamp_fn(),
            thread_ids: ThreadLocal::new(),
            process_id: process_id(),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn with_timestamp_fn(mut self, timestamp_fn: TimestampFn) -> Self {
        self.timestamp_fn = timestamp_fn;
        self
    }

    pub fn sink(&self) -> Arc<Mutex<S>> {
        self.sink.clone()
    }

    /// Events the sink refused. They cannot be logged from inside the subscriber.
    pub fn dropped_events(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn get_thread_id(&self) -> i64 {
        self.thread_ids.get_or(|| Cell::new(thread_id())).get()
    }

    fn core(&self, name: &str, target: &str) -> EventCore {
        EventCore {
            name: name.to_string(),
            categories: vec![target.to_string()],
            timestamp: (self.timestamp_fn)(),
            process_id: Some(self.process_id),
            thread_id: Some(self.get_thread_id()),
            ..Default::default()
        }
    }

    fn lock(&self) -> MutexGuard<'_, S> {
        match self.sink.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn submit(&self, event: Event) {
        if self.lock().write(&event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

impl<S, Sub> Layer<Sub> for TefLayer<S>
where
    S: EventSink + Send + 'static,
    Sub: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, Sub>) {
        let mut fields = FieldArgs::default();
        attrs.record(&mut fields);
        if let Some(span) = ctx.span(id) {
            span.extensions_mut().insert(SpanFields { fields });
        }
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, Sub>) {
        if let Some(span) = ctx.span(id) {
            if let Some(span_fields) = span.extensions_mut().get_mut::<SpanFields>() {
                values.record(&mut span_fields.fields);
            }
        }
    }

    fn on_enter(&self, id: &Id, ctx: Context<'_, Sub>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let metadata = span.metadata();
        let args = span
            .extensions()
            .get::<SpanFields>()
            .map(|span_fields| span_fields.fields.args.clone())
            .unwrap_or_default();
        self.submit(Event::BeginDuration(DurationEvent {
            core: self.core(metadata.name(), metadata.target()),
            args,
            stack_trace: None,
        }));
    }

    fn on_exit(&self, id: &Id, ctx: Context<'_, Sub>) {
        if let Some(span) = ctx.span(id) {
            let metadata = span.metadata();
            self.submit(Event::EndDuration(DurationEvent {
                core: self.core(metadata.name(), metadata.target()),
                args: Args::new(),
                stack_trace: None,
            }));
        }
    }

    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, Sub>) {
        let metadata = event.metadata();
        let mut fields = FieldArgs::default();
        event.record(&mut fields);
        let name = fields
            .take_message()
            .unwrap_or_else(|| metadata.name().to_string());
        let mut args = fields.args;
        args.insert("level".to_string(), metadata.level().as_str().into());

        self.submit(Event::Instant(InstantEvent {
            core: self.core(&name, metadata.target()),
            args,
            ..Default::default()
        }));
    }
}
