use serde_json::Value;
use std::fmt;
use tef_codec::Args;
use tracing::field::{Field, Visit};

/// Fields of a span or event, collected as event arguments.
#[derive(Debug, Default)]
pub(crate) struct FieldArgs {
    pub args: Args,
}

impl FieldArgs {
    /// Removes the `message` field of a `tracing` event, which names the event instead.
    pub fn take_message(&mut self) -> Option<String> {
        match self.args.remove("message")? {
            Value::String(message) => Some(message),
            other => Some(other.to_string()),
        }
    }

    fn insert(&mut self, field: &Field, value: impl Into<Value>) {
        self.args.insert(field.name().to_string(), value.into());
    }
}

impl Visit for FieldArgs {
    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        // NaN and infinities have no JSON form.
        match serde_json::Number::from_f64(value) {
            Some(number) => self.insert(field, number),
            None => self.insert(field, value.to_string()),
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value);
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value);
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{:?}", value));
    }
}
