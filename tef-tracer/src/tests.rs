use crate::TefLayer;
use rstest::{fixture, rstest};
use serde_json::json;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tef_codec::{Event, EventSink, StreamingWriter, Trace};
use tracing::{info_span, Dispatch};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

#[fixture]
fn layer() -> TefLayer<Trace> {
    let now = Arc::new(AtomicI64::new(1_000));
    TefLayer::new(Trace::default()).with_timestamp_fn(Arc::new(move || now.fetch_add(1, Ordering::SeqCst)))
}

fn events_of(layer: TefLayer<Trace>, body: impl FnOnce()) -> Vec<Event> {
    let sink = layer.sink();
    let subscriber = Registry::default().with(layer);
    tracing::subscriber::with_default(subscriber, body);
    let trace = sink.lock().expect("sink lock");
    trace.events.clone()
}

#[rstest]
fn test_basic_span(layer: TefLayer<Trace>) {
    let events = events_of(layer, || {
        let span = info_span!("test_span");
        let _guard = span.enter();
    });

    assert_eq!(events.len(), 2);
    let Event::BeginDuration(begin) = &events[0] else {
        panic!("expected begin, got {:?}", events[0]);
    };
    let Event::EndDuration(end) = &events[1] else {
        panic!("expected end, got {:?}", events[1]);
    };
    assert_eq!(begin.core.name, "test_span");
    assert_eq!(end.core.name, "test_span");
    assert!(end.core.timestamp > begin.core.timestamp);
    assert_eq!(begin.core.thread_id, end.core.thread_id);
    assert_eq!(begin.core.categories, vec![module_path!()]);
}

#[rstest]
fn test_span_with_fields(layer: TefLayer<Trace>) {
    let events = events_of(layer, || {
        let span = info_span!("my_span", answer = 42, name = "test", late = tracing::field::Empty);
        span.record("late", true);
        let _guard = span.enter();
    });

    let Event::BeginDuration(begin) = &events[0] else {
        panic!("expected begin");
    };
    assert_eq!(begin.args.get("answer"), Some(&json!(42)));
    assert_eq!(begin.args.get("name"), Some(&json!("test")));
    assert_eq!(begin.args.get("late"), Some(&json!(true)));
}

#[rstest]
fn test_event_is_instant(layer: TefLayer<Trace>) {
    let events = events_of(layer, || {
        tracing::warn!(attempt = 3, ratio = 0.5, "retrying request");
    });

    assert_eq!(events.len(), 1);
    let Event::Instant(instant) = &events[0] else {
        panic!("expected instant");
    };
    assert_eq!(instant.core.name, "retrying request");
    assert_eq!(instant.args.get("attempt"), Some(&json!(3)));
    assert_eq!(instant.args.get("ratio"), Some(&json!(0.5)));
    assert_eq!(instant.args.get("level"), Some(&json!("WARN")));
    assert!(instant.args.get("message").is_none());
}

#[test]
fn test_closed_sink_counts_drops() {
    let mut writer = StreamingWriter::new(Vec::new());
    writer.close().expect("closes");
    let dispatch = Dispatch::new(Registry::default().with(TefLayer::new(writer)));

    tracing::dispatcher::with_default(&dispatch, || {
        tracing::info!("lost");
        tracing::info!("also lost");
    });

    let layer = dispatch
        .downcast_ref::<TefLayer<StreamingWriter<Vec<u8>>>>()
        .expect("layer is part of the subscriber");
    assert_eq!(layer.dropped_events(), 2);
    assert!(layer.sink().lock().expect("sink lock").is_closed());
}
