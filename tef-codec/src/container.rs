// Copyright (C) 2025 Category Labs, Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! The two top-level wire shapes: the object form (`{"traceEvents": [...], ...}`) and the
//! bare, possibly truncated, array form.

use crate::decode::decode_event;
use crate::encode::encode_event;
use crate::error::{Result, TefError};
use crate::event::{Event, Phase};
use crate::stack::{resolve_pending, StackFrames, StackRequest};
use crate::writer::EventSink;
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, BufReader, Read, Write};

pub const DEFAULT_CONTROLLER_TRACE_DATA_KEY: &str = "traceEvents";

const KNOWN_KEYS: [&str; 6] = [
    "traceEvents",
    "displayTimeUnit",
    "stackFrames",
    "systemTraceEvents",
    "powerTraceAsString",
    "controllerTraceDataKey",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisplayTimeUnit {
    #[default]
    #[serde(rename = "ms", alias = "")]
    Milliseconds,
    #[serde(rename = "ns")]
    Nanoseconds,
}

impl DisplayTimeUnit {
    pub fn as_str(self) -> &'static str {
        match self {
            DisplayTimeUnit::Milliseconds => "ms",
            DisplayTimeUnit::Nanoseconds => "ns",
        }
    }

    /// Parses the wire value; the empty string means the default.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "" | "ms" => Ok(DisplayTimeUnit::Milliseconds),
            "ns" => Ok(DisplayTimeUnit::Nanoseconds),
            other => Err(TefError::InvalidDisplayTimeUnit(other.to_string())),
        }
    }
}

impl fmt::Display for DisplayTimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The object form as it appears on the wire. Events stay raw until the phase dispatcher
/// has seen them.
#[derive(Debug, Serialize, Deserialize)]
struct TraceEnvelope {
    #[serde(rename = "traceEvents", skip_serializing_if = "Option::is_none")]
    trace_events: Option<Vec<Value>>,
    #[serde(rename = "displayTimeUnit", skip_serializing_if = "Option::is_none")]
    display_time_unit: Option<String>,
    #[serde(rename = "systemTraceEvents", skip_serializing_if = "Option::is_none")]
    system_trace_events: Option<String>,
    #[serde(rename = "powerTraceAsString", skip_serializing_if = "Option::is_none")]
    power_trace_as_string: Option<String>,
    #[serde(rename = "controllerTraceDataKey", skip_serializing_if = "Option::is_none")]
    controller_trace_data_key: Option<String>,
    #[serde(rename = "stackFrames", skip_serializing_if = "Option::is_none")]
    stack_frames: Option<Value>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// A whole trace: its events plus the envelope of the object form.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(on(String, into))]
pub struct Trace {
    #[builder(default)]
    pub events: Vec<Event>,
    #[builder(default)]
    pub display_time_unit: DisplayTimeUnit,
    pub system_trace_events: Option<String>,
    pub power_trace_as_string: Option<String>,
    #[builder(default)]
    pub stack_frames: StackFrames,
    #[builder(default = DEFAULT_CONTROLLER_TRACE_DATA_KEY.to_string())]
    pub controller_trace_data_key: String,
    /// Unrecognized top-level keys, written back unchanged.
    #[builder(default)]
    pub metadata: Map<String, Value>,
}

impl Default for Trace {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Trace {
    pub fn new(events: Vec<Event>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    /// Decodes either wire shape, chosen by the first non-whitespace byte.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        match skip_whitespace(&mut reader)? {
            Some(b'[') => Self::from_json_array(reader),
            Some(b'{') => Self::from_json_object(reader),
            Some(other) => Err(TefError::Syntax(format!(
                "expected '{{' or '[' at start of trace, found '{}'",
                char::from(other)
            ))),
            None => Err(TefError::Syntax("empty trace".to_string())),
        }
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    /// Decodes the object form. Decoding is all or nothing.
    pub fn from_json_object<R: Read>(reader: R) -> Result<Self> {
        let root: Value = serde_json::from_reader(reader)?;
        Self::from_value(root)
    }

    /// Decodes an already parsed object form.
    pub fn from_value(root: Value) -> Result<Self> {
        if !root.is_object() {
            return Err(TefError::type_mismatch("trace", "object", &root));
        }
        let envelope = TraceEnvelope::deserialize(root).map_err(|err| TefError::Envelope(err.to_string()))?;

        let display_time_unit = match envelope.display_time_unit.as_deref() {
            None => DisplayTimeUnit::default(),
            Some(unit) => DisplayTimeUnit::parse(unit)?,
        };
        let controller_trace_data_key = envelope
            .controller_trace_data_key
            .filter(|key| !key.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTROLLER_TRACE_DATA_KEY.to_string());
        let stack_frames = match &envelope.stack_frames {
            None => StackFrames::new(),
            Some(raw) => StackFrames::from_json(raw)?,
        };
        let raw_events = envelope
            .trace_events
            .ok_or_else(|| TefError::MissingField("traceEvents".to_string()))?;

        let mut events = Vec::with_capacity(raw_events.len());
        let mut requests = Vec::new();
        for (index, raw) in raw_events.iter().enumerate() {
            push_decoded(&mut events, &mut requests, index, raw)?;
        }
        resolve_pending(&mut events, &stack_frames, requests)?;

        tracing::debug!(
            events = events.len(),
            stack_frames = stack_frames.len(),
            passthrough_keys = envelope.extra.len(),
            "decoded object-form trace"
        );

        Ok(Self {
            events,
            display_time_unit,
            system_trace_events: envelope.system_trace_events,
            power_trace_as_string: envelope.power_trace_as_string,
            stack_frames,
            controller_trace_data_key,
            metadata: envelope.extra,
        })
    }

    /// Decodes the array form.
    ///
    /// Input cut off by end of stream (no closing `]`, a trailing `,`, or a partially
    /// written last element) yields every complete event before the cut. There is no frame
    /// table in this form, so any frame reference fails to resolve.
    pub fn from_json_array<R: Read>(reader: R) -> Result<Self> {
        let mut reader = BufReader::new(reader);
        if !consume_byte(&mut reader, b'[')? {
            return Err(TefError::Syntax("expected '[' at start of trace".to_string()));
        }

        let mut events = Vec::new();
        let mut requests = Vec::new();
        let mut truncated = false;
        loop {
            match skip_whitespace(&mut reader)? {
                None => {
                    truncated = true;
                    break;
                }
                Some(b']') if events.is_empty() => {
                    reader.consume(1);
                    expect_end(&mut reader)?;
                    break;
                }
                Some(_) => {}
            }

            let raw = match read_element(&mut reader)? {
                Some(raw) => raw,
                None => {
                    truncated = true;
                    break;
                }
            };
            let index = events.len();
            push_decoded(&mut events, &mut requests, index, &raw)?;

            match skip_whitespace(&mut reader)? {
                None => {
                    truncated = true;
                    break;
                }
                Some(b',') => reader.consume(1),
                Some(b']') => {
                    reader.consume(1);
                    expect_end(&mut reader)?;
                    break;
                }
                Some(other) => {
                    return Err(TefError::Syntax(format!(
                        "expected ',' or ']' after event {index}, found '{}'",
                        char::from(other)
                    )))
                }
            }
        }

        let stack_frames = StackFrames::new();
        resolve_pending(&mut events, &stack_frames, requests)?;

        if truncated {
            tracing::warn!(events = events.len(), "trace array is truncated, keeping complete events");
        } else {
            tracing::debug!(events = events.len(), "decoded array-form trace");
        }
        Ok(Self::new(events))
    }

    /// The object form as a JSON value. Envelope fields are only present when they differ
    /// from their defaults.
    pub fn to_json_object(&self) -> Result<Value> {
        let envelope = TraceEnvelope {
            trace_events: Some(self.encode_events()?),
            display_time_unit: (self.display_time_unit != DisplayTimeUnit::default())
                .then(|| self.display_time_unit.as_str().to_string()),
            system_trace_events: self.system_trace_events.clone(),
            power_trace_as_string: self.power_trace_as_string.clone(),
            controller_trace_data_key: (self.controller_trace_data_key != DEFAULT_CONTROLLER_TRACE_DATA_KEY)
                .then(|| self.controller_trace_data_key.clone()),
            stack_frames: if self.stack_frames.is_empty() {
                None
            } else {
                Some(serde_json::to_value(&self.stack_frames)?)
            },
            extra: self
                .metadata
                .iter()
                .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect(),
        };
        Ok(serde_json::to_value(envelope)?)
    }

    pub fn write_json_object<W: Write>(&self, mut writer: W) -> Result<()> {
        serde_json::to_writer(&mut writer, &self.to_json_object()?)?;
        writer.flush()?;
        Ok(())
    }

    /// Writes only the events, as a closed array. The envelope is dropped.
    pub fn write_json_array<W: Write>(&self, mut writer: W) -> Result<()> {
        serde_json::to_writer(&mut writer, &self.encode_events()?)?;
        writer.flush()?;
        Ok(())
    }

    /// Number of events per phase.
    pub fn phase_counts(&self) -> BTreeMap<Phase, usize> {
        let mut counts = BTreeMap::new();
        for event in &self.events {
            *counts.entry(event.phase()).or_default() += 1;
        }
        counts
    }

    fn encode_events(&self) -> Result<Vec<Value>> {
        self.events
            .iter()
            .enumerate()
            .map(|(index, event)| {
                encode_event(event).map_err(|err| TefError::Event {
                    index,
                    phase: Some(event.phase().code().to_string()),
                    name: Some(event.core().name.clone()),
                    source: Box::new(err),
                })
            })
            .collect()
    }
}

impl EventSink for Trace {
    fn write(&mut self, event: &Event) -> Result<()> {
        self.events.push(event.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

fn push_decoded(
    events: &mut Vec<Event>,
    requests: &mut Vec<StackRequest>,
    index: usize,
    raw: &Value,
) -> Result<()> {
    let decoded = decode_event(raw).map_err(|err| err.in_event(index, raw))?;
    requests.extend(
        decoded
            .stack_refs
            .into_iter()
            .map(|(slot, frame_id)| StackRequest {
                event_index: index,
                slot,
                frame_id,
            }),
    );
    events.push(decoded.event);
    Ok(())
}

/// Reads one JSON value. `Ok(None)` means the input ended before the value did.
fn read_element<R: BufRead>(reader: &mut R) -> Result<Option<Value>> {
    let mut values = serde_json::Deserializer::from_reader(reader).into_iter::<Value>();
    match values.next() {
        None => Ok(None),
        Some(Ok(value)) => Ok(Some(value)),
        Some(Err(err)) if err.is_eof() => Ok(None),
        Some(Err(err)) => Err(err.into()),
    }
}

/// Skips JSON whitespace and peeks at the next byte without consuming it.
fn skip_whitespace<R: BufRead>(reader: &mut R) -> Result<Option<u8>> {
    loop {
        let buf = reader.fill_buf()?;
        if buf.is_empty() {
            return Ok(None);
        }
        match buf.iter().position(|b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r')) {
            Some(pos) => {
                let next = buf[pos];
                reader.consume(pos);
                return Ok(Some(next));
            }
            None => {
                let len = buf.len();
                reader.consume(len);
            }
        }
    }
}

/// Only whitespace may follow the closing bracket.
fn expect_end<R: BufRead>(reader: &mut R) -> Result<()> {
    match skip_whitespace(reader)? {
        None => Ok(()),
        Some(other) => Err(TefError::Syntax(format!(
            "trailing characters after trace array, found '{}'",
            char::from(other)
        ))),
    }
}

/// Consumes `expected` if it is the next non-whitespace byte.
fn consume_byte<R: BufRead>(reader: &mut R, expected: u8) -> Result<bool> {
    match skip_whitespace(reader)? {
        Some(b) if b == expected => {
            reader.consume(1);
            Ok(true)
        }
        _ => Ok(false),
    }
}
