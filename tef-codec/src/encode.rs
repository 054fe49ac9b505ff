//! Encoding of typed events back to their wire objects.

use crate::error::{Result, TefError};
use crate::event::*;
use crate::stack::StackTrace;
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use serde_json::{json, Map, Number, Value};

/// Produces the wire object for `event`.
///
/// Stack traces are flattened to their frame names and metadata events are emitted as
/// `ph: "M"` with `name` set to their kind, so the output never depends on the frame
/// table of the trace it came from.
pub fn encode_event(event: &Event) -> Result<Value> {
    let mut out = EventObject::new(event.phase(), event.core());

    match event {
        Event::BeginDuration(e) | Event::EndDuration(e) => {
            out.args(&e.args);
            out.stack("stack", e.stack_trace.as_ref());
        }
        Event::Complete(e) => {
            out.args(&e.args);
            out.stack("stack", e.stack_trace.as_ref());
            out.stack("estack", e.end_stack_trace.as_ref());
            out.insert("dur", e.duration);
            if let Some(tdur) = e.thread_duration {
                out.insert("tdur", tdur);
            }
        }
        Event::Instant(e) => {
            out.args(&e.args);
            if e.scope != InstantScope::Thread {
                out.insert("s", e.scope.code());
            }
            out.stack("stack", e.stack_trace.as_ref());
        }
        Event::Counter(e) => {
            let mut values = Map::new();
            for (series, value) in &e.values {
                let number = Number::from_f64(*value).ok_or_else(|| TefError::TypeMismatch {
                    field: format!("args.{series}"),
                    expected: "finite number",
                    found: value.to_string(),
                })?;
                values.insert(series.clone(), Value::Number(number));
            }
            out.args(&values);
            out.id(e.id.as_ref());
        }
        Event::AsyncBegin(e) | Event::AsyncInstant(e) | Event::AsyncEnd(e) => {
            out.args(&e.args);
            out.id(Some(&e.id));
            out.scope(e.scope.as_deref());
        }
        Event::FlowStart(e) | Event::FlowInstant(e) => {
            out.args(&e.args);
            out.id(e.id.as_ref());
            out.scope(e.scope.as_deref());
        }
        Event::FlowFinish(e) => {
            out.args(&e.args);
            out.id(e.id.as_ref());
            out.scope(e.scope.as_deref());
            if e.binding_point == BindingPoint::Next {
                out.insert("bp", "e");
            }
        }
        Event::ObjectCreated(e) | Event::ObjectDeleted(e) => {
            out.id(Some(&e.id));
            out.scope(e.scope.as_deref());
        }
        Event::ObjectSnapshot(e) => {
            out.args(&e.args);
            out.id(Some(&e.id));
            out.scope(e.scope.as_deref());
        }
        Event::MetadataProcessName(e) => {
            out.metadata(metadata::PROCESS_NAME, "name", json!(e.process_name));
        }
        Event::MetadataProcessLabels(e) => {
            out.metadata(metadata::PROCESS_LABELS, "labels", json!(e.labels));
        }
        Event::MetadataProcessSortIndex(e) => {
            out.metadata(metadata::PROCESS_SORT_INDEX, "sort_index", json!(e.sort_index));
        }
        Event::MetadataThreadName(e) => {
            out.metadata(metadata::THREAD_NAME, "name", json!(e.thread_name));
        }
        Event::MetadataThreadSortIndex(e) => {
            out.metadata(metadata::THREAD_SORT_INDEX, "sort_index", json!(e.sort_index));
        }
        Event::MetadataMisc(e) | Event::GlobalMemoryDump(e) | Event::ProcessMemoryDump(e) | Event::Mark(e) => {
            out.args(&e.args);
        }
        Event::ClockSync(e) => {
            let mut args = e.args.clone();
            args.insert("sync_id".to_string(), json!(e.sync_id));
            if let Some(issue_ts) = e.issue_ts {
                args.insert("issue_ts".to_string(), json!(issue_ts));
            }
            out.args(&args);
        }
        Event::ContextEnter(e) | Event::ContextExit(e) => {
            out.args(&e.args);
            out.id(Some(&e.id));
        }
        Event::LinkIds(e) => {
            let mut args = e.args.clone();
            args.insert("linked_id".to_string(), json!(e.linked_id));
            out.args(&args);
            out.id(Some(&e.id));
        }
    }

    Ok(Value::Object(out.finish()))
}

/// Joins categories into the wire `cat` string.
pub fn join_categories(categories: &[String]) -> String {
    categories.join(",")
}

struct EventObject {
    map: Map<String, Value>,
}

impl EventObject {
    fn new(phase: Phase, core: &EventCore) -> Self {
        let mut map = Map::new();
        map.insert("name".to_string(), json!(core.name));
        map.insert("ph".to_string(), json!(phase.code()));
        if !core.categories.is_empty() {
            map.insert("cat".to_string(), json!(join_categories(&core.categories)));
        }
        map.insert("ts".to_string(), json!(core.timestamp));
        let optional = [
            ("tts", core.thread_timestamp),
            ("pid", core.process_id),
            ("tid", core.thread_id),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                map.insert(key.to_string(), json!(value));
            }
        }
        Self { map }
    }

    fn insert(&mut self, key: &str, value: impl Into<Value>) {
        self.map.insert(key.to_string(), value.into());
    }

    fn args(&mut self, args: &Args) {
        if !args.is_empty() {
            self.insert("args", Value::Object(args.clone()));
        }
    }

    fn stack(&mut self, key: &str, trace: Option<&StackTrace>) {
        if let Some(trace) = trace {
            self.insert(key, json!(trace.names()));
        }
    }

    fn id(&mut self, id: Option<&Id>) {
        match id {
            None => {}
            Some(Id::String(s)) => self.insert("id", s.as_str()),
            Some(Id::Number(n)) => self.insert("id", *n),
            Some(Id::Local(s)) => self.insert("id2", json!({ "local": s })),
            Some(Id::Global(s)) => self.insert("id2", json!({ "global": s })),
        }
    }

    fn scope(&mut self, scope: Option<&str>) {
        if let Some(scope) = scope {
            self.insert("scope", scope);
        }
    }

    fn metadata(&mut self, kind: &str, key: &str, value: Value) {
        self.insert("name", kind);
        let mut args = Map::new();
        args.insert(key.to_string(), value);
        self.insert("args", Value::Object(args));
    }

    fn finish(self) -> Map<String, Value> {
        self.map
    }
}

impl Serialize for Event {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        encode_event(self)
            .map_err(S::Error::custom)?
            .serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::decode_event;
    use crate::stack::StackFrame;
    use rstest::rstest;
    use std::collections::BTreeMap;

    fn core(name: &str, ts: i64) -> EventCore {
        EventCore::new(name, ts)
    }

    #[test]
    fn test_minimal_fields() {
        let event = Event::BeginDuration(DurationEvent::builder().core(core("A", 0)).build());
        assert_eq!(
            encode_event(&event).expect("encodes"),
            json!({"name": "A", "ph": "B", "ts": 0})
        );
    }

    #[test]
    fn test_core_fields() {
        let core = EventCore::builder()
            .name("A")
            .categories(vec!["x".to_string(), "y".to_string()])
            .timestamp(3)
            .thread_timestamp(4)
            .process_id(1)
            .thread_id(2)
            .build();
        let event = Event::Mark(ArgsEvent {
            core,
            args: Args::new(),
        });
        assert_eq!(
            encode_event(&event).expect("encodes"),
            json!({"name": "A", "ph": "R", "cat": "x,y", "ts": 3, "tts": 4, "pid": 1, "tid": 2})
        );
    }

    #[test]
    fn test_resolved_stack_flattens_to_names() {
        let trace = StackTrace::new(vec![
            StackFrame::new("main.rs", "main"),
            StackFrame::new("lib.rs", "run").with_parent("a"),
        ]);
        let event = Event::Complete(
            CompleteEvent::builder()
                .core(core("A", 0))
                .duration(7)
                .thread_duration(3)
                .stack_trace(trace.clone())
                .end_stack_trace(trace)
                .build(),
        );
        assert_eq!(
            encode_event(&event).expect("encodes"),
            json!({
                "name": "A", "ph": "X", "ts": 0, "dur": 7, "tdur": 3,
                "stack": ["main", "run"], "estack": ["main", "run"]
            })
        );
    }

    #[rstest]
    #[case(InstantScope::Thread, None)]
    #[case(InstantScope::Process, Some("p"))]
    #[case(InstantScope::Global, Some("g"))]
    fn test_instant_scope(#[case] scope: InstantScope, #[case] expected: Option<&str>) {
        let event = Event::Instant(InstantEvent::builder().core(core("tick", 1)).scope(scope).build());
        let value = encode_event(&event).expect("encodes");
        assert_eq!(value["ph"], "I");
        assert_eq!(value.get("s").and_then(Value::as_str), expected);
    }

    #[test]
    fn test_counter_values_are_numbers() {
        let event = Event::Counter(
            CounterEvent::builder()
                .core(core("mem", 0))
                .values(BTreeMap::from([("heap".to_string(), 24.0), ("stack".to_string(), 1.5)]))
                .build(),
        );
        let value = encode_event(&event).expect("encodes");
        assert_eq!(value["args"], json!({"heap": 24.0, "stack": 1.5}));
        assert!(value["args"]["heap"].is_number());
    }

    #[test]
    fn test_counter_rejects_non_finite() {
        let event = Event::Counter(
            CounterEvent::builder()
                .core(core("mem", 0))
                .values(BTreeMap::from([("heap".to_string(), f64::NAN)]))
                .build(),
        );
        let err = encode_event(&event).unwrap_err();
        assert!(matches!(err, TefError::TypeMismatch { field, .. } if field == "args.heap"));
    }

    #[rstest]
    #[case(Id::String("0x1".into()), json!({"id": "0x1"}))]
    #[case(Id::Number(9), json!({"id": 9}))]
    #[case(Id::Local("0x1".into()), json!({"id2": {"local": "0x1"}}))]
    #[case(Id::Global("0x1".into()), json!({"id2": {"global": "0x1"}}))]
    fn test_id_forms(#[case] id: Id, #[case] expected: Value) {
        let event = Event::ObjectDeleted(ObjectEvent {
            core: core("obj", 0),
            id,
            scope: None,
        });
        let value = encode_event(&event).expect("encodes");
        let mut wanted = json!({"name": "obj", "ph": "D", "ts": 0});
        if let (Some(wanted), Some(extra)) = (wanted.as_object_mut(), expected.as_object()) {
            wanted.extend(extra.clone());
        }
        assert_eq!(value, wanted);
    }

    #[test]
    fn test_flow_finish_binding_point() {
        let event = Event::FlowFinish(FlowFinishEvent {
            core: core("flow", 0),
            id: Some(Id::Number(1)),
            binding_point: BindingPoint::Next,
            ..Default::default()
        });
        assert_eq!(
            encode_event(&event).expect("encodes"),
            json!({"name": "flow", "ph": "f", "ts": 0, "id": 1, "bp": "e"})
        );
    }

    #[rstest]
    #[case(Event::MetadataProcessName(ProcessNameEvent { core: core("", 0), process_name: "app".into() }),
           json!({"name": "process_name", "ph": "M", "ts": 0, "args": {"name": "app"}}))]
    #[case(Event::MetadataProcessLabels(ProcessLabelsEvent { core: core("ignored", 0), labels: "a,b".into() }),
           json!({"name": "process_labels", "ph": "M", "ts": 0, "args": {"labels": "a,b"}}))]
    #[case(Event::MetadataThreadSortIndex(SortIndexEvent { core: core("", 0), sort_index: 4 }),
           json!({"name": "thread_sort_index", "ph": "M", "ts": 0, "args": {"sort_index": 4}}))]
    fn test_metadata_shapes(#[case] event: Event, #[case] expected: Value) {
        assert_eq!(encode_event(&event).expect("encodes"), expected);
    }

    #[test]
    fn test_clock_sync_and_link_args() {
        let sync = Event::ClockSync(ClockSyncEvent {
            core: core("clock_sync", 1),
            args: Args::new(),
            sync_id: "guid".into(),
            issue_ts: Some(0),
        });
        assert_eq!(
            encode_event(&sync).expect("encodes")["args"],
            json!({"sync_id": "guid", "issue_ts": 0})
        );

        let link = Event::LinkIds(LinkIdsEvent {
            core: core("link", 1),
            args: Args::new(),
            id: Id::String("0x1".into()),
            linked_id: "0x2".into(),
        });
        let value = encode_event(&link).expect("encodes");
        assert_eq!(value["args"], json!({"linked_id": "0x2"}));
        assert_eq!(value["id"], "0x1");
        assert_eq!(value["ph"], "=");
    }

    #[rstest]
    #[case(json!({"name": "A", "ph": "B", "ts": 0, "cat": "a,b", "args": {"k": [1, 2]}, "stack": ["m"]}))]
    #[case(json!({"name": "A", "ph": "X", "ts": 0, "dur": 3, "pid": 1, "tid": 1}))]
    #[case(json!({"name": "r", "ph": "b", "ts": 2, "id": "0x1", "scope": "net"}))]
    #[case(json!({"name": "thread_name", "ph": "M", "ts": 0, "args": {"name": "worker-1"}}))]
    #[case(json!({"name": "num_cpus", "ph": "M", "ts": 0, "args": {"number": 8}}))]
    #[case(json!({"name": "snap", "ph": "O", "ts": 0, "id2": {"local": "0x2"}, "args": {"snapshot": {}}}))]
    #[case(json!({"name": "ctx", "ph": "(", "ts": 0, "id": 3}))]
    #[case(json!({"name": "dump", "ph": "v", "ts": 0, "args": {"dumps": {}}}))]
    fn test_decode_encode_preserves_wire_shape(#[case] raw: Value) {
        let event = decode_event(&raw).expect("decodes").event;
        assert_eq!(encode_event(&event).expect("encodes"), raw);
    }

    #[test]
    fn test_legacy_phase_is_not_reemitted() {
        let event = decode_event(&json!({"name": "r", "ph": "S", "ts": 0, "id": 1}))
            .expect("decodes")
            .event;
        assert_eq!(encode_event(&event).expect("encodes")["ph"], "b");
    }

    #[test]
    fn test_serialize_matches_encode() {
        let event = Event::Instant(InstantEvent::builder().core(core("tick", 5)).build());
        let text = serde_json::to_string(&event).expect("serializes");
        assert_eq!(
            serde_json::from_str::<Value>(&text).expect("valid json"),
            encode_event(&event).expect("encodes")
        );
    }
}
