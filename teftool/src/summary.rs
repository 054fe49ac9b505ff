use std::collections::{BTreeMap, HashMap};
use std::fmt;
use tef_codec::{DisplayTimeUnit, Phase, Trace};

/// What `teftool stats` reports about a trace.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub display_time_unit: DisplayTimeUnit,
    pub controller_trace_data_key: String,
    pub has_system_trace: bool,
    pub has_power_trace: bool,
    pub stack_frames: usize,
    pub stack_roots: usize,
    pub metadata_keys: Vec<String>,
    pub events: usize,
    pub phases: BTreeMap<Phase, usize>,
    /// Most frequent event names, most frequent first.
    pub top_names: Vec<(String, usize)>,
    /// First and last timestamp, in microseconds.
    pub time_range: Option<(i64, i64)>,
}

impl Summary {
    pub fn new(trace: &Trace, top_names: usize) -> Self {
        let mut name_counts: HashMap<&str, usize> = HashMap::new();
        for event in &trace.events {
            *name_counts.entry(event.core().name.as_str()).or_default() += 1;
        }
        let mut names: Vec<(String, usize)> = name_counts
            .into_iter()
            .map(|(name, count)| (name.to_string(), count))
            .collect();
        names.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        names.truncate(top_names);

        let timestamps = trace.events.iter().map(|event| event.core().timestamp);
        let time_range = timestamps
            .clone()
            .min()
            .zip(timestamps.max());

        Self {
            display_time_unit: trace.display_time_unit,
            controller_trace_data_key: trace.controller_trace_data_key.clone(),
            has_system_trace: trace.system_trace_events.is_some(),
            has_power_trace: trace.power_trace_as_string.is_some(),
            stack_frames: trace.stack_frames.len(),
            stack_roots: trace.stack_frames.root_count(),
            metadata_keys: trace.metadata.keys().cloned().collect(),
            events: trace.events.len(),
            phases: trace.phase_counts(),
            top_names: names,
            time_range,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "display time unit: {}", self.display_time_unit)?;
        writeln!(f, "controller trace data key: {}", self.controller_trace_data_key)?;
        writeln!(f, "system trace: {}", yes_no(self.has_system_trace))?;
        writeln!(f, "power trace: {}", yes_no(self.has_power_trace))?;
        writeln!(f, "stack frames: {} ({} roots)", self.stack_frames, self.stack_roots)?;
        if !self.metadata_keys.is_empty() {
            writeln!(f, "metadata keys: {}", self.metadata_keys.join(", "))?;
        }
        writeln!(f, "events: {}", self.events)?;
        if let Some((first, last)) = self.time_range {
            writeln!(f, "time range: {first}..{last} us ({} us)", last - first)?;
        }
        for (phase, count) in &self.phases {
            writeln!(f, "  {phase} {phase:?}: {count}")?;
        }
        if !self.top_names.is_empty() {
            writeln!(f, "top names:")?;
            for (name, count) in &self.top_names {
                writeln!(f, "  {count:>8}  {name}")?;
            }
        }
        Ok(())
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}
