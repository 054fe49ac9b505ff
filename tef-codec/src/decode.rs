//! Decoding of single raw event objects.
//!
//! The phase (`ph`) is read first and selects the field set to read; metadata events
//! additionally dispatch on `name`. Frame id references (`sf`/`esf`) are not resolved
//! here, they are returned alongside the event for the container to resolve later.

use crate::error::{Result, TefError};
use crate::event::*;
use crate::stack::{frame_id_from_value, FrameId, StackSlot, StackTrace};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A decoded event and the frame references it is still waiting on.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedEvent {
    pub event: Event,
    pub stack_refs: Vec<(StackSlot, FrameId)>,
}

/// Typed access to the fields of one JSON object. `null` reads as absent.
pub(crate) struct Fields<'a> {
    map: &'a Map<String, Value>,
    prefix: &'static str,
}

impl<'a> Fields<'a> {
    pub(crate) fn new(map: &'a Map<String, Value>) -> Self {
        Self { map, prefix: "" }
    }

    fn nested(map: &'a Map<String, Value>, prefix: &'static str) -> Self {
        Self { map, prefix }
    }

    fn path(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    pub(crate) fn get(&self, key: &str) -> Option<&'a Value> {
        match self.map.get(key) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value),
        }
    }

    pub(crate) fn str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(TefError::type_mismatch(self.path(key), "string", other)),
        }
    }

    pub(crate) fn required_str(&self, key: &str) -> Result<&'a str> {
        self.str(key)?
            .ok_or_else(|| TefError::MissingField(self.path(key)))
    }

    pub(crate) fn int(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => as_int(value)
                .map(Some)
                .ok_or_else(|| TefError::type_mismatch(self.path(key), "integer", value)),
        }
    }

    pub(crate) fn required_int(&self, key: &str) -> Result<i64> {
        self.int(key)?
            .ok_or_else(|| TefError::MissingField(self.path(key)))
    }

    pub(crate) fn object(&self, key: &str) -> Result<Option<&'a Map<String, Value>>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(TefError::type_mismatch(self.path(key), "object", other)),
        }
    }
}

/// Any JSON number as an integer; fractional values are truncated toward zero.
fn as_int(value: &Value) -> Option<i64> {
    let number = value.as_number()?;
    number
        .as_i64()
        .or_else(|| number.as_u64().and_then(|n| i64::try_from(n).ok()))
        .or_else(|| number.as_f64().map(|f| f as i64))
}

/// Decodes one raw event object.
pub fn decode_event(raw: &Value) -> Result<DecodedEvent> {
    let map = raw
        .as_object()
        .ok_or_else(|| TefError::type_mismatch("event", "object", raw))?;
    let fields = Fields::new(map);

    let code = fields.required_str("ph")?;
    let phase = Phase::from_code(code).ok_or_else(|| TefError::UnknownPhase(code.to_string()))?;

    let core = decode_core(&fields)?;
    let mut stack_refs = Vec::new();

    let event = match phase {
        Phase::BeginDuration | Phase::EndDuration => {
            let duration = DurationEvent {
                args: decode_args(&fields)?,
                stack_trace: decode_stack(&fields, StackSlot::Start, &mut stack_refs)?,
                core,
            };
            if phase == Phase::BeginDuration {
                Event::BeginDuration(duration)
            } else {
                Event::EndDuration(duration)
            }
        }
        Phase::Complete => Event::Complete(CompleteEvent {
            args: decode_args(&fields)?,
            stack_trace: decode_stack(&fields, StackSlot::Start, &mut stack_refs)?,
            end_stack_trace: decode_stack(&fields, StackSlot::End, &mut stack_refs)?,
            duration: fields.required_int("dur")?,
            thread_duration: fields.int("tdur")?,
            core,
        }),
        Phase::Instant => Event::Instant(InstantEvent {
            args: decode_args(&fields)?,
            scope: decode_instant_scope(&fields)?,
            stack_trace: decode_stack(&fields, StackSlot::Start, &mut stack_refs)?,
            core,
        }),
        Phase::Counter => Event::Counter(CounterEvent {
            values: decode_counter_values(&fields)?,
            id: decode_id(&fields)?,
            core,
        }),
        Phase::AsyncBegin | Phase::AsyncInstant | Phase::AsyncEnd => {
            let event = AsyncEvent {
                args: decode_args(&fields)?,
                id: required_id(&fields)?,
                scope: fields.str("scope")?.map(str::to_string),
                core,
            };
            match phase {
                Phase::AsyncBegin => Event::AsyncBegin(event),
                Phase::AsyncInstant => Event::AsyncInstant(event),
                _ => Event::AsyncEnd(event),
            }
        }
        Phase::FlowStart | Phase::FlowInstant => {
            let event = FlowEvent {
                args: decode_args(&fields)?,
                id: decode_id(&fields)?,
                scope: fields.str("scope")?.map(str::to_string),
                core,
            };
            if phase == Phase::FlowStart {
                Event::FlowStart(event)
            } else {
                Event::FlowInstant(event)
            }
        }
        Phase::FlowFinish => Event::FlowFinish(FlowFinishEvent {
            args: decode_args(&fields)?,
            id: decode_id(&fields)?,
            scope: fields.str("scope")?.map(str::to_string),
            binding_point: match fields.str("bp")? {
                Some("e") => BindingPoint::Next,
                _ => BindingPoint::Enclosing,
            },
            core,
        }),
        Phase::ObjectCreated | Phase::ObjectDeleted => {
            let event = ObjectEvent {
                id: required_id(&fields)?,
                scope: fields.str("scope")?.map(str::to_string),
                core,
            };
            if phase == Phase::ObjectCreated {
                Event::ObjectCreated(event)
            } else {
                Event::ObjectDeleted(event)
            }
        }
        Phase::ObjectSnapshot => Event::ObjectSnapshot(ObjectSnapshotEvent {
            args: decode_args(&fields)?,
            id: required_id(&fields)?,
            scope: fields.str("scope")?.map(str::to_string),
            core,
        }),
        Phase::Metadata => decode_metadata(&fields, core)?,
        Phase::GlobalMemoryDump => Event::GlobalMemoryDump(ArgsEvent {
            args: decode_args(&fields)?,
            core,
        }),
        Phase::ProcessMemoryDump => Event::ProcessMemoryDump(ArgsEvent {
            args: decode_args(&fields)?,
            core,
        }),
        Phase::Mark => Event::Mark(ArgsEvent {
            args: decode_args(&fields)?,
            core,
        }),
        Phase::ClockSync => {
            let mut args = decode_args(&fields)?;
            let (sync_id, issue_ts) = {
                let arg_fields = Fields::nested(&args, "args.");
                (
                    arg_fields.required_str("sync_id")?.to_string(),
                    arg_fields.int("issue_ts")?,
                )
            };
            args.remove("sync_id");
            args.remove("issue_ts");
            Event::ClockSync(ClockSyncEvent {
                core,
                args,
                sync_id,
                issue_ts,
            })
        }
        Phase::ContextEnter | Phase::ContextExit => {
            let event = ContextEvent {
                args: decode_args(&fields)?,
                id: required_id(&fields)?,
                core,
            };
            if phase == Phase::ContextEnter {
                Event::ContextEnter(event)
            } else {
                Event::ContextExit(event)
            }
        }
        Phase::LinkIds => {
            let mut args = decode_args(&fields)?;
            let linked_id = Fields::nested(&args, "args.")
                .required_str("linked_id")?
                .to_string();
            args.remove("linked_id");
            Event::LinkIds(LinkIdsEvent {
                id: required_id(&fields)?,
                core,
                args,
                linked_id,
            })
        }
    };

    Ok(DecodedEvent { event, stack_refs })
}

fn decode_core(fields: &Fields<'_>) -> Result<EventCore> {
    Ok(EventCore {
        name: fields.str("name")?.unwrap_or_default().to_string(),
        categories: split_categories(fields.str("cat")?.unwrap_or_default()),
        timestamp: fields.required_int("ts")?,
        thread_timestamp: fields.int("tts")?,
        process_id: fields.int("pid")?,
        thread_id: fields.int("tid")?,
    })
}

/// Splits the wire `cat` string. The empty string has no categories.
pub fn split_categories(cat: &str) -> Vec<String> {
    if cat.is_empty() {
        return Vec::new();
    }
    cat.split(',').map(str::to_string).collect()
}

fn decode_args(fields: &Fields<'_>) -> Result<Args> {
    Ok(fields.object("args")?.cloned().unwrap_or_default())
}

/// Reads the inline stack of `slot` and queues its frame reference, if any.
/// A frame reference supersedes the inline stack once resolved.
fn decode_stack(
    fields: &Fields<'_>,
    slot: StackSlot,
    stack_refs: &mut Vec<(StackSlot, FrameId)>,
) -> Result<Option<StackTrace>> {
    let (inline_key, ref_key) = match slot {
        StackSlot::Start => ("stack", "sf"),
        StackSlot::End => ("estack", "esf"),
    };

    let inline = match fields.get(inline_key) {
        None => None,
        Some(Value::Array(entries)) => {
            let names = entries
                .iter()
                .map(|entry| {
                    entry
                        .as_str()
                        .ok_or_else(|| TefError::type_mismatch(inline_key, "array of strings", entry))
                })
                .collect::<Result<Vec<_>>>()?;
            Some(StackTrace::from_names(names))
        }
        Some(other) => return Err(TefError::type_mismatch(inline_key, "array of strings", other)),
    };

    if let Some(reference) = fields.get(ref_key) {
        stack_refs.push((slot, frame_id_from_value(reference)?));
    }

    Ok(inline)
}

fn decode_instant_scope(fields: &Fields<'_>) -> Result<InstantScope> {
    match fields.get("s") {
        None => Ok(InstantScope::default()),
        Some(value) => InstantScope::deserialize(value).map_err(|err| TefError::TypeMismatch {
            field: "s".to_string(),
            expected: "one of \"t\", \"p\", \"g\"",
            found: err.to_string(),
        }),
    }
}

/// Counter series values. Numeric strings are accepted for compatibility with writers
/// that stringify them. Values must be finite.
fn decode_counter_values(fields: &Fields<'_>) -> Result<BTreeMap<String, f64>> {
    let Some(args) = fields.object("args")? else {
        return Ok(BTreeMap::new());
    };

    args.iter()
        .map(|(key, value)| {
            let number = match value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            number
                .filter(|n| n.is_finite())
                .map(|n| (key.clone(), n))
                .ok_or_else(|| TefError::type_mismatch(format!("args.{key}"), "finite number or numeric string", value))
        })
        .collect()
}

fn decode_id(fields: &Fields<'_>) -> Result<Option<Id>> {
    if let Some(id2) = fields.object("id2")? {
        let id2 = Fields::nested(id2, "id2.");
        if let Some(local) = id2.str("local")? {
            return Ok(Some(Id::Local(local.to_string())));
        }
        if let Some(global) = id2.str("global")? {
            return Ok(Some(Id::Global(global.to_string())));
        }
        return Err(TefError::MissingField("id2.local".to_string()));
    }

    match fields.get("id") {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(Id::String(s.clone()))),
        Some(value @ Value::Number(n)) => n
            .as_u64()
            .map(|n| Some(Id::Number(n)))
            .ok_or_else(|| TefError::type_mismatch("id", "string or unsigned integer", value)),
        Some(other) => Err(TefError::type_mismatch("id", "string or unsigned integer", other)),
    }
}

fn required_id(fields: &Fields<'_>) -> Result<Id> {
    decode_id(fields)?.ok_or_else(|| TefError::MissingField("id".to_string()))
}

fn decode_metadata(fields: &Fields<'_>, core: EventCore) -> Result<Event> {
    let args = decode_args(fields)?;
    let arg_fields = Fields::nested(&args, "args.");

    let event = match core.name.as_str() {
        metadata::PROCESS_NAME => Event::MetadataProcessName(ProcessNameEvent {
            process_name: arg_fields.required_str("name")?.to_string(),
            core,
        }),
        metadata::PROCESS_LABELS => Event::MetadataProcessLabels(ProcessLabelsEvent {
            labels: arg_fields.required_str("labels")?.to_string(),
            core,
        }),
        metadata::PROCESS_SORT_INDEX => Event::MetadataProcessSortIndex(SortIndexEvent {
            sort_index: arg_fields.required_int("sort_index")?,
            core,
        }),
        metadata::THREAD_NAME => Event::MetadataThreadName(ThreadNameEvent {
            thread_name: arg_fields.required_str("name")?.to_string(),
            core,
        }),
        metadata::THREAD_SORT_INDEX => Event::MetadataThreadSortIndex(SortIndexEvent {
            sort_index: arg_fields.required_int("sort_index")?,
            core,
        }),
        _ => Event::MetadataMisc(ArgsEvent { core, args }),
    };
    Ok(event)
}
