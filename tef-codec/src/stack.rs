//! Stack frames, stack traces and the frame-id resolver.
//!
//! Events reference stack traces either inline (`stack`/`estack`, a list of names) or
//! through a frame id (`sf`/`esf`) into the `stackFrames` table owned by the trace.
//! Frame ids are only resolved once the whole table is known, so decoding records a
//! [`StackRequest`] per reference and [`resolve_pending`] walks them afterwards.

use crate::error::{json_type_name, Result, TefError};
use crate::event::Event;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Key into the stack frame table. Integer ids on the wire are stored as their decimal string.
pub type FrameId = String;

/// One entry of a call stack.
///
/// Frames built from an inline `stack` array only carry a `name`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackFrame {
    /// Conventionally the source file the symbol lives in.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub category: String,
    /// Conventionally the function (and location) of this frame.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub name: String,
    /// Calling frame in the owning [`StackFrames`] table. `None` for root frames.
    #[serde(
        default,
        deserialize_with = "deserialize_parent",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent: Option<FrameId>,
}

/// A frame id as it appears on the wire.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireFrameId {
    Text(String),
    Unsigned(u64),
    Signed(i64),
}

fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// Integer parents become their decimal string; an empty string marks a root.
fn deserialize_parent<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<FrameId>, D::Error> {
    Ok(match Option::<WireFrameId>::deserialize(deserializer)? {
        None => None,
        Some(WireFrameId::Text(id)) if id.is_empty() => None,
        Some(WireFrameId::Text(id)) => Some(id),
        Some(WireFrameId::Unsigned(id)) => Some(id.to_string()),
        Some(WireFrameId::Signed(id)) => Some(id.to_string()),
    })
}

impl StackFrame {
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: impl Into<FrameId>) -> Self {
        self.parent = Some(parent.into());
        self
    }
}

/// A materialized call stack, outermost call first and innermost call last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StackTrace {
    pub frames: Vec<StackFrame>,
}

impl StackTrace {
    pub fn new(frames: Vec<StackFrame>) -> Self {
        Self { frames }
    }

    /// Builds a trace of name-only frames, as found in inline `stack` arrays.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            frames: names
                .into_iter()
                .map(|name| StackFrame {
                    name: name.into(),
                    ..Default::default()
                })
                .collect(),
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.frames.iter().map(|frame| frame.name.as_str()).collect()
    }

    pub fn root(&self) -> Option<&StackFrame> {
        self.frames.first()
    }

    pub fn leaf(&self) -> Option<&StackFrame> {
        self.frames.last()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// The `stackFrames` table of a trace: frame id to frame, linked through `parent`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StackFrames(BTreeMap<FrameId, StackFrame>);

impl StackFrames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<FrameId>, frame: StackFrame) -> Option<StackFrame> {
        self.0.insert(id.into(), frame)
    }

    pub fn get(&self, id: &str) -> Option<&StackFrame> {
        self.0.get(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FrameId, &StackFrame)> {
        self.0.iter()
    }

    /// Number of frames without a parent, i.e. the number of distinct call stack roots.
    pub fn root_count(&self) -> usize {
        self.0.values().filter(|frame| frame.parent.is_none()).count()
    }

    /// Walks the parent chain starting at `id` and returns it root first.
    ///
    /// A chain longer than the table can only revisit a frame, so it is reported as
    /// [`TefError::CyclicStackReference`].
    pub fn resolve(&self, id: &str) -> Result<StackTrace> {
        let mut frames = Vec::new();
        let mut current = id;
        loop {
            let frame = self
                .0
                .get(current)
                .ok_or_else(|| TefError::UnresolvedStackReference(current.to_string()))?;
            frames.push(frame.clone());
            if frames.len() > self.0.len() {
                return Err(TefError::CyclicStackReference(id.to_string()));
            }
            match frame.parent.as_deref() {
                Some(parent) => current = parent,
                None => break,
            }
        }
        frames.reverse();
        Ok(StackTrace { frames })
    }

    /// Parses the wire `stackFrames` object. A malformed entry is reported by its id.
    pub(crate) fn from_json(value: &Value) -> Result<Self> {
        let entries = value
            .as_object()
            .ok_or_else(|| TefError::type_mismatch("stackFrames", "object", value))?;

        entries
            .iter()
            .map(|(id, raw)| -> Result<(FrameId, StackFrame)> {
                let frame = StackFrame::deserialize(raw).map_err(|err| TefError::TypeMismatch {
                    field: format!("stackFrames.{id}"),
                    expected: "stack frame",
                    found: err.to_string(),
                })?;
                Ok((id.clone(), frame))
            })
            .collect()
    }
}

impl FromIterator<(FrameId, StackFrame)> for StackFrames {
    fn from_iter<T: IntoIterator<Item = (FrameId, StackFrame)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Normalizes a wire `sf`/`esf` value to a table key.
pub fn frame_id_from_value(value: &Value) -> Result<FrameId> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) if n.is_i64() || n.is_u64() => Ok(n.to_string()),
        other => Err(TefError::InvalidStackReference(json_type_name(other).to_string())),
    }
}

/// Which stack trace of an event a reference fills in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackSlot {
    /// `stack` / `sf`
    Start,
    /// `estack` / `esf`
    End,
}

/// A deferred frame-id reference: resolve `frame_id` and store it in `slot` of event `event_index`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackRequest {
    pub event_index: usize,
    pub slot: StackSlot,
    pub frame_id: FrameId,
}

/// Second decoding pass: resolves every request, in order, against the complete table.
pub fn resolve_pending(
    events: &mut [Event],
    frames: &StackFrames,
    requests: impl IntoIterator<Item = StackRequest>,
) -> Result<()> {
    for request in requests {
        let event = events.get_mut(request.event_index).ok_or_else(|| {
            TefError::UnresolvedStackReference(format!(
                "{} (event {} out of range)",
                request.frame_id, request.event_index
            ))
        })?;
        let trace = match frames.resolve(&request.frame_id) {
            Ok(trace) => trace,
            Err(err) => return Err(event_context(err, request.event_index, event)),
        };
        match event.stack_trace_mut(request.slot) {
            Some(target) => *target = Some(trace),
            None => tracing::debug!(
                event_index = request.event_index,
                slot = ?request.slot,
                "event has no stack slot for resolved frame reference"
            ),
        }
    }
    Ok(())
}

fn event_context(err: TefError, index: usize, event: &Event) -> TefError {
    TefError::Event {
        index,
        phase: Some(event.phase().code().to_string()),
        name: Some(event.core().name.clone()),
        source: Box::new(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;
    use serde_json::json;

    #[fixture]
    fn table() -> StackFrames {
        StackFrames::from_json(&json!({
            "a": {"category": "main.rs", "name": "main", "parent": ""},
            "b": {"category": "lib.rs", "name": "run", "parent": "a"},
            "c": {"category": "lib.rs", "name": "step", "parent": "b"},
            "7": {"category": "io.rs", "name": "read", "parent": 8},
            "8": {"category": "io.rs", "name": "poll"}
        }))
        .expect("valid table")
    }

    #[rstest]
    fn test_resolve_orders_root_first(table: StackFrames) {
        let trace = table.resolve("b").expect("resolves");
        assert_eq!(trace.names(), vec!["main", "run"]);

        let trace = table.resolve("c").expect("resolves");
        assert_eq!(trace.names(), vec!["main", "run", "step"]);
        assert_eq!(trace.root().map(|f| f.category.as_str()), Some("main.rs"));
        assert_eq!(trace.leaf().map(|f| f.name.as_str()), Some("step"));
    }

    #[rstest]
    fn test_resolve_single_root(table: StackFrames) {
        let trace = table.resolve("a").expect("resolves");
        assert_eq!(trace.len(), 1);
        assert_eq!(trace.frames[0].parent, None);
    }

    #[rstest]
    fn test_integer_parents_are_normalized(table: StackFrames) {
        assert_eq!(table.get("7").and_then(|f| f.parent.as_deref()), Some("8"));
        let trace = table.resolve("7").expect("resolves");
        assert_eq!(trace.names(), vec!["poll", "read"]);
        assert_eq!(table.root_count(), 2);
    }

    #[rstest]
    fn test_missing_frame_is_unresolved(table: StackFrames) {
        let err = table.resolve("zzz").unwrap_err();
        assert!(matches!(err, TefError::UnresolvedStackReference(id) if id == "zzz"));
    }

    #[test]
    fn test_dangling_parent_is_unresolved() {
        let mut table = StackFrames::new();
        table.insert("leaf", StackFrame::new("f.rs", "leaf").with_parent("gone"));
        let err = table.resolve("leaf").unwrap_err();
        assert!(matches!(err, TefError::UnresolvedStackReference(id) if id == "gone"));
    }

    #[rstest]
    #[case::two_cycle(json!({"x": {"parent": "y"}, "y": {"parent": "x"}}), "x")]
    #[case::self_loop(json!({"x": {"parent": "x"}}), "x")]
    #[case::tail_into_cycle(json!({"a": {"parent": "b"}, "b": {"parent": "c"}, "c": {"parent": "b"}}), "a")]
    fn test_cycles_are_reported(#[case] raw: Value, #[case] start: &str) {
        let table = StackFrames::from_json(&raw).expect("valid table");
        let err = table.resolve(start).unwrap_err();
        assert!(matches!(err, TefError::CyclicStackReference(id) if id == start));
    }

    #[rstest]
    #[case(json!("12"), "12")]
    #[case(json!(12), "12")]
    #[case(json!(""), "")]
    fn test_frame_id_from_value(#[case] raw: Value, #[case] expected: &str) {
        assert_eq!(frame_id_from_value(&raw).expect("valid id"), expected);
    }

    #[rstest]
    #[case(json!(1.5))]
    #[case(json!(true))]
    #[case(json!(["a"]))]
    #[case(json!(null))]
    fn test_invalid_frame_id(#[case] raw: Value) {
        assert!(matches!(
            frame_id_from_value(&raw),
            Err(TefError::InvalidStackReference(_))
        ));
    }

    #[rstest]
    #[case::name(json!({"a": {"name": 3}}))]
    #[case::parent(json!({"a": {"name": "main", "parent": 1.5}}))]
    #[case::entry(json!({"a": "main"}))]
    fn test_frame_table_type_mismatch(#[case] raw: Value) {
        let err = StackFrames::from_json(&raw).unwrap_err();
        assert!(
            matches!(&err, TefError::TypeMismatch { field, .. } if field == "stackFrames.a"),
            "unexpected error {err:?}"
        );
    }

    #[test]
    fn test_frame_null_fields_are_empty() {
        let table = StackFrames::from_json(&json!({"a": {"category": null, "name": null, "parent": null}}))
            .expect("valid table");
        assert_eq!(table.get("a"), Some(&StackFrame::default()));
    }

    #[test]
    fn test_frame_serializes_without_root_parent() {
        let frame = StackFrame::new("main.rs", "main");
        assert_eq!(
            serde_json::to_value(&frame).expect("serializes"),
            json!({"category": "main.rs", "name": "main"})
        );
        let child = frame.with_parent("1");
        assert_eq!(serde_json::to_value(&child).expect("serializes")["parent"], "1");
    }
}
