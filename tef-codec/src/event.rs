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

//! Typed trace events.
//!
//! Every event carries an [`EventCore`]. The [`Event`] enum has one arm per wire shape;
//! metadata events (`ph: "M"`) are split further by their `name`.

use crate::stack::{StackSlot, StackTrace};
use bon::Builder;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Free-form event arguments (`args` on the wire).
pub type Args = Map<String, Value>;

/// Fields shared by every event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder)]
#[builder(on(String, into))]
pub struct EventCore {
    /// Display name of the event.
    pub name: String,
    /// Categories for filtering. Joined with `,` on the wire, so a category may not contain a comma.
    #[builder(default)]
    pub categories: Vec<String>,
    /// Timestamp in microseconds.
    pub timestamp: i64,
    /// Thread clock timestamp in microseconds.
    pub thread_timestamp: Option<i64>,
    pub process_id: Option<i64>,
    pub thread_id: Option<i64>,
}

impl EventCore {
    pub fn new(name: impl Into<String>, timestamp: i64) -> Self {
        Self {
            name: name.into(),
            timestamp,
            ..Default::default()
        }
    }
}

/// Event phase, the one-letter discriminator of the wire shape.
///
/// Several legacy codes are accepted on input (see [`Phase::from_code`]) but
/// [`Phase::code`] always returns the current code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Phase {
    BeginDuration,
    EndDuration,
    Complete,
    Instant,
    Counter,
    AsyncBegin,
    AsyncInstant,
    AsyncEnd,
    FlowStart,
    FlowInstant,
    FlowFinish,
    ObjectCreated,
    ObjectSnapshot,
    ObjectDeleted,
    Metadata,
    GlobalMemoryDump,
    ProcessMemoryDump,
    Mark,
    ClockSync,
    ContextEnter,
    ContextExit,
    LinkIds,
}

impl Phase {
    pub const ALL: [Phase; 22] = [
        Phase::BeginDuration,
        Phase::EndDuration,
        Phase::Complete,
        Phase::Instant,
        Phase::Counter,
        Phase::AsyncBegin,
        Phase::AsyncInstant,
        Phase::AsyncEnd,
        Phase::FlowStart,
        Phase::FlowInstant,
        Phase::FlowFinish,
        Phase::ObjectCreated,
        Phase::ObjectSnapshot,
        Phase::ObjectDeleted,
        Phase::Metadata,
        Phase::GlobalMemoryDump,
        Phase::ProcessMemoryDump,
        Phase::Mark,
        Phase::ClockSync,
        Phase::ContextEnter,
        Phase::ContextExit,
        Phase::LinkIds,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Phase::BeginDuration => "B",
            Phase::EndDuration => "E",
            Phase::Complete => "X",
            Phase::Instant => "I",
            Phase::Counter => "C",
            Phase::AsyncBegin => "b",
            Phase::AsyncInstant => "n",
            Phase::AsyncEnd => "e",
            Phase::FlowStart => "s",
            Phase::FlowInstant => "t",
            Phase::FlowFinish => "f",
            Phase::ObjectCreated => "N",
            Phase::ObjectSnapshot => "O",
            Phase::ObjectDeleted => "D",
            Phase::Metadata => "M",
            Phase::GlobalMemoryDump => "V",
            Phase::ProcessMemoryDump => "v",
            Phase::Mark => "R",
            Phase::ClockSync => "c",
            Phase::ContextEnter => "(",
            Phase::ContextExit => ")",
            Phase::LinkIds => "=",
        }
    }

    /// Maps a wire code to its phase, folding legacy aliases:
    /// `i` is Instant, `S` is AsyncBegin, `T` and `p` are AsyncInstant, `F` is AsyncEnd.
    pub fn from_code(code: &str) -> Option<Phase> {
        let phase = match code {
            "i" => Phase::Instant,
            "S" => Phase::AsyncBegin,
            "T" | "p" => Phase::AsyncInstant,
            "F" => Phase::AsyncEnd,
            _ => return Phase::ALL.into_iter().find(|phase| phase.code() == code),
        };
        Some(phase)
    }

    pub fn is_legacy(code: &str) -> bool {
        matches!(code, "i" | "S" | "T" | "p" | "F")
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Correlation identifier for async, flow, object and context events.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Id {
    /// `"id": "0x1000"`
    String(String),
    /// `"id": 4096`
    Number(u64),
    /// `"id2": {"local": "..."}`, explicitly process-local.
    Local(String),
    /// `"id2": {"global": "..."}`, explicitly shared across processes.
    Global(String),
}

impl From<&str> for Id {
    fn from(value: &str) -> Self {
        Id::String(value.to_string())
    }
}

impl From<String> for Id {
    fn from(value: String) -> Self {
        Id::String(value)
    }
}

impl From<u64> for Id {
    fn from(value: u64) -> Self {
        Id::Number(value)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::String(s) | Id::Local(s) | Id::Global(s) => f.write_str(s),
            Id::Number(n) => write!(f, "{n}"),
        }
    }
}

/// How far an instant event extends in a viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstantScope {
    #[default]
    #[serde(rename = "t")]
    Thread,
    #[serde(rename = "p")]
    Process,
    #[serde(rename = "g")]
    Global,
}

impl InstantScope {
    pub fn code(self) -> &'static str {
        match self {
            InstantScope::Thread => "t",
            InstantScope::Process => "p",
            InstantScope::Global => "g",
        }
    }
}

/// Which slice a flow finish event attaches to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BindingPoint {
    /// The slice enclosing the flow event.
    #[default]
    Enclosing,
    /// The next slice to begin after the flow event (`"bp": "e"`).
    Next,
}

/// `B` and `E` events.
#[derive(Debug, Clone, Default, PartialEq, Builder)]
pub struct DurationEvent {
    pub core: EventCore,
    #[builder(default)]
    pub args: Args,
    pub stack_trace: Option<StackTrace>,
}

/// `X` events: a begin/end pair folded into one record.
#[derive(Debug, Clone, Default, PartialEq, Builder)]
pub struct CompleteEvent {
    pub core: EventCore,
    #[builder(default)]
    pub args: Args,
    pub stack_trace: Option<StackTrace>,
    pub end_stack_trace: Option<StackTrace>,
    /// Wall clock duration in microseconds.
    pub duration: i64,
    /// Thread clock duration in microseconds.
    pub thread_duration: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Builder)]
pub struct InstantEvent {
    pub core: EventCore,
    #[builder(default)]
    pub args: Args,
    #[builder(default)]
    pub scope: InstantScope,
    pub stack_trace: Option<StackTrace>,
}

/// `C` events. Each entry of `values` is one series of the counter.
#[derive(Debug, Clone, Default, PartialEq, Builder)]
pub struct CounterEvent {
    pub core: EventCore,
    #[builder(default)]
    pub values: BTreeMap<String, f64>,
    pub id: Option<Id>,
}

/// `b`, `n` and `e` events.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncEvent {
    pub core: EventCore,
    pub args: Args,
    pub id: Id,
    pub scope: Option<String>,
}

/// `s` and `t` events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowEvent {
    pub core: EventCore,
    pub args: Args,
    pub id: Option<Id>,
    pub scope: Option<String>,
}

/// `f` events.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowFinishEvent {
    pub core: EventCore,
    pub args: Args,
    pub id: Option<Id>,
    pub scope: Option<String>,
    pub binding_point: BindingPoint,
}

/// `N` and `D` events.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectEvent {
    pub core: EventCore,
    pub id: Id,
    pub scope: Option<String>,
}

/// `O` events.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSnapshotEvent {
    pub core: EventCore,
    pub args: Args,
    pub id: Id,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessNameEvent {
    pub core: EventCore,
    pub process_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ThreadNameEvent {
    pub core: EventCore,
    pub thread_name: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProcessLabelsEvent {
    pub core: EventCore,
    pub labels: String,
}

/// `process_sort_index` / `thread_sort_index`: lower values are drawn higher up.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortIndexEvent {
    pub core: EventCore,
    pub sort_index: i64,
}

/// Events that carry nothing beyond the core fields and an argument map.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArgsEvent {
    pub core: EventCore,
    pub args: Args,
}

/// `c` events. `args` excludes `sync_id` and `issue_ts`, which have their own fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClockSyncEvent {
    pub core: EventCore,
    pub args: Args,
    pub sync_id: String,
    pub issue_ts: Option<i64>,
}

/// `(` and `)` events.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextEvent {
    pub core: EventCore,
    pub args: Args,
    pub id: Id,
}

/// `=` events. `args` excludes `linked_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkIdsEvent {
    pub core: EventCore,
    pub args: Args,
    pub id: Id,
    pub linked_id: String,
}

/// Well-known metadata event names.
pub mod metadata {
    pub const PROCESS_NAME: &str = "process_name";
    pub const PROCESS_LABELS: &str = "process_labels";
    pub const PROCESS_SORT_INDEX: &str = "process_sort_index";
    pub const THREAD_NAME: &str = "thread_name";
    pub const THREAD_SORT_INDEX: &str = "thread_sort_index";
}

/// A decoded trace event.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    BeginDuration(DurationEvent),
    EndDuration(DurationEvent),
    Complete(CompleteEvent),
    Instant(InstantEvent),
    Counter(CounterEvent),
    AsyncBegin(AsyncEvent),
    AsyncInstant(AsyncEvent),
    AsyncEnd(AsyncEvent),
    FlowStart(FlowEvent),
    FlowInstant(FlowEvent),
    FlowFinish(FlowFinishEvent),
    ObjectCreated(ObjectEvent),
    ObjectSnapshot(ObjectSnapshotEvent),
    ObjectDeleted(ObjectEvent),
    MetadataProcessName(ProcessNameEvent),
    MetadataProcessLabels(ProcessLabelsEvent),
    MetadataProcessSortIndex(SortIndexEvent),
    MetadataThreadName(ThreadNameEvent),
    MetadataThreadSortIndex(SortIndexEvent),
    MetadataMisc(ArgsEvent),
    GlobalMemoryDump(ArgsEvent),
    ProcessMemoryDump(ArgsEvent),
    Mark(ArgsEvent),
    ClockSync(ClockSyncEvent),
    ContextEnter(ContextEvent),
    ContextExit(ContextEvent),
    LinkIds(LinkIdsEvent),
}

impl Event {
    pub fn phase(&self) -> Phase {
        match self {
            Event::BeginDuration(_) => Phase::BeginDuration,
            Event::EndDuration(_) => Phase::EndDuration,
            Event::Complete(_) => Phase::Complete,
            Event::Instant(_) => Phase::Instant,
            Event::Counter(_) => Phase::Counter,
            Event::AsyncBegin(_) => Phase::AsyncBegin,
            Event::AsyncInstant(_) => Phase::AsyncInstant,
            Event::AsyncEnd(_) => Phase::AsyncEnd,
            Event::FlowStart(_) => Phase::FlowStart,
            Event::FlowInstant(_) => Phase::FlowInstant,
            Event::FlowFinish(_) => Phase::FlowFinish,
            Event::ObjectCreated(_) => Phase::ObjectCreated,
            Event::ObjectSnapshot(_) => Phase::ObjectSnapshot,
            Event::ObjectDeleted(_) => Phase::ObjectDeleted,
            Event::MetadataProcessName(_)
            | Event::MetadataProcessLabels(_)
            | Event::MetadataProcessSortIndex(_)
            | Event::MetadataThreadName(_)
            | Event::MetadataThreadSortIndex(_)
            | Event::MetadataMisc(_) => Phase::Metadata,
            Event::GlobalMemoryDump(_) => Phase::GlobalMemoryDump,
            Event::ProcessMemoryDump(_) => Phase::ProcessMemoryDump,
            Event::Mark(_) => Phase::Mark,
            Event::ClockSync(_) => Phase::ClockSync,
            Event::ContextEnter(_) => Phase::ContextEnter,
            Event::ContextExit(_) => Phase::ContextExit,
            Event::LinkIds(_) => Phase::LinkIds,
        }
    }

    pub fn core(&self) -> &EventCore {
        match self {
            Event::BeginDuration(e) | Event::EndDuration(e) => &e.core,
            Event::Complete(e) => &e.core,
            Event::Instant(e) => &e.core,
            Event::Counter(e) => &e.core,
            Event::AsyncBegin(e) | Event::AsyncInstant(e) | Event::AsyncEnd(e) => &e.core,
            Event::FlowStart(e) | Event::FlowInstant(e) => &e.core,
            Event::FlowFinish(e) => &e.core,
            Event::ObjectCreated(e) | Event::ObjectDeleted(e) => &e.core,
            Event::ObjectSnapshot(e) => &e.core,
            Event::MetadataProcessName(e) => &e.core,
            Event::MetadataProcessLabels(e) => &e.core,
            Event::MetadataProcessSortIndex(e) | Event::MetadataThreadSortIndex(e) => &e.core,
            Event::MetadataThreadName(e) => &e.core,
            Event::MetadataMisc(e)
            | Event::GlobalMemoryDump(e)
            | Event::ProcessMemoryDump(e)
            | Event::Mark(e) => &e.core,
            Event::ClockSync(e) => &e.core,
            Event::ContextEnter(e) | Event::ContextExit(e) => &e.core,
            Event::LinkIds(e) => &e.core,
        }
    }

    pub fn core_mut(&mut self) -> &mut EventCore {
        match self {
            Event::BeginDuration(e) | Event::EndDuration(e) => &mut e.core,
            Event::Complete(e) => &mut e.core,
            Event::Instant(e) => &mut e.core,
            Event::Counter(e) => &mut e.core,
            Event::AsyncBegin(e) | Event::AsyncInstant(e) | Event::AsyncEnd(e) => &mut e.core,
            Event::FlowStart(e) | Event::FlowInstant(e) => &mut e.core,
            Event::FlowFinish(e) => &mut e.core,
            Event::ObjectCreated(e) | Event::ObjectDeleted(e) => &mut e.core,
            Event::ObjectSnapshot(e) => &mut e.core,
            Event::MetadataProcessName(e) => &mut e.core,
            Event::MetadataProcessLabels(e) => &mut e.core,
            Event::MetadataProcessSortIndex(e) | Event::MetadataThreadSortIndex(e) => &mut e.core,
            Event::MetadataThreadName(e) => &mut e.core,
            Event::MetadataMisc(e)
            | Event::GlobalMemoryDump(e)
            | Event::ProcessMemoryDump(e)
            | Event::Mark(e) => &mut e.core,
            Event::ClockSync(e) => &mut e.core,
            Event::ContextEnter(e) | Event::ContextExit(e) => &mut e.core,
            Event::LinkIds(e) => &mut e.core,
        }
    }

    /// The free-form argument map, for variants that carry one.
    pub fn args(&self) -> Option<&Args> {
        match self {
            Event::BeginDuration(e) | Event::EndDuration(e) => Some(&e.args),
            Event::Complete(e) => Some(&e.args),
            Event::Instant(e) => Some(&e.args),
            Event::AsyncBegin(e) | Event::AsyncInstant(e) | Event::AsyncEnd(e) => Some(&e.args),
            Event::FlowStart(e) | Event::FlowInstant(e) => Some(&e.args),
            Event::FlowFinish(e) => Some(&e.args),
            Event::ObjectSnapshot(e) => Some(&e.args),
            Event::MetadataMisc(e)
            | Event::GlobalMemoryDump(e)
            | Event::ProcessMemoryDump(e)
            | Event::Mark(e) => Some(&e.args),
            Event::ClockSync(e) => Some(&e.args),
            Event::ContextEnter(e) | Event::ContextExit(e) => Some(&e.args),
            Event::LinkIds(e) => Some(&e.args),
            Event::Counter(_)
            | Event::ObjectCreated(_)
            | Event::ObjectDeleted(_)
            | Event::MetadataProcessName(_)
            | Event::MetadataProcessLabels(_)
            | Event::MetadataProcessSortIndex(_)
            | Event::MetadataThreadName(_)
            | Event::MetadataThreadSortIndex(_) => None,
        }
    }

    pub fn args_mut(&mut self) -> Option<&mut Args> {
        match self {
            Event::BeginDuration(e) | Event::EndDuration(e) => Some(&mut e.args),
            Event::Complete(e) => Some(&mut e.args),
            Event::Instant(e) => Some(&mut e.args),
            Event::AsyncBegin(e) | Event::AsyncInstant(e) | Event::AsyncEnd(e) => Some(&mut e.args),
            Event::FlowStart(e) | Event::FlowInstant(e) => Some(&mut e.args),
            Event::FlowFinish(e) => Some(&mut e.args),
            Event::ObjectSnapshot(e) => Some(&mut e.args),
            Event::MetadataMisc(e)
            | Event::GlobalMemoryDump(e)
            | Event::ProcessMemoryDump(e)
            | Event::Mark(e) => Some(&mut e.args),
            Event::ClockSync(e) => Some(&mut e.args),
            Event::ContextEnter(e) | Event::ContextExit(e) => Some(&mut e.args),
            Event::LinkIds(e) => Some(&mut e.args),
            Event::Counter(_)
            | Event::ObjectCreated(_)
            | Event::ObjectDeleted(_)
            | Event::MetadataProcessName(_)
            | Event::MetadataProcessLabels(_)
            | Event::MetadataProcessSortIndex(_)
            | Event::MetadataThreadName(_)
            | Event::MetadataThreadSortIndex(_) => None,
        }
    }

    pub fn stack_trace(&self, slot: StackSlot) -> Option<&StackTrace> {
        match (self, slot) {
            (Event::BeginDuration(e) | Event::EndDuration(e), StackSlot::Start) => e.stack_trace.as_ref(),
            (Event::Complete(e), StackSlot::Start) => e.stack_trace.as_ref(),
            (Event::Complete(e), StackSlot::End) => e.end_stack_trace.as_ref(),
            (Event::Instant(e), StackSlot::Start) => e.stack_trace.as_ref(),
            _ => None,
        }
    }

    /// The stack trace slot, for variants that carry it.
    pub fn stack_trace_mut(&mut self, slot: StackSlot) -> Option<&mut Option<StackTrace>> {
        match (self, slot) {
            (Event::BeginDuration(e) | Event::EndDuration(e), StackSlot::Start) => Some(&mut e.stack_trace),
            (Event::Complete(e), StackSlot::Start) => Some(&mut e.stack_trace),
            (Event::Complete(e), StackSlot::End) => Some(&mut e.end_stack_trace),
            (Event::Instant(e), StackSlot::Start) => Some(&mut e.stack_trace),
            _ => None,
        }
    }
}
