use serde_json::error::Category;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TefError {
    #[error("syntax error: {0}")]
    Syntax(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown phase '{0}'")]
    UnknownPhase(String),

    #[error("invalid display time unit '{0}' (expected \"ms\" or \"ns\")")]
    InvalidDisplayTimeUnit(String),

    #[error("field '{field}' expected {expected}, got {found}")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        found: String,
    },

    #[error("invalid trace envelope: {0}")]
    Envelope(String),

    #[error("missing required field '{0}'")]
    MissingField(String),

    #[error("stack frame reference must be a string or integer, got {0}")]
    InvalidStackReference(String),

    #[error("stack frame '{0}' not found in stack frame table")]
    UnresolvedStackReference(String),

    #[error("stack frame chain starting at '{0}' does not terminate")]
    CyclicStackReference(String),

    #[error("stream writer already closed")]
    WriterClosed,

    #[error("event {index} (ph={phase:?}, name={name:?}): {source}")]
    Event {
        index: usize,
        phase: Option<String>,
        name: Option<String>,
        #[source]
        source: Box<TefError>,
    },
}

pub type Result<T> = std::result::Result<T, TefError>;

impl TefError {
    pub(crate) fn type_mismatch(field: impl Into<String>, expected: &'static str, found: &Value) -> Self {
        TefError::TypeMismatch {
            field: field.into(),
            expected,
            found: json_type_name(found).to_string(),
        }
    }

    /// Attaches the identity of the raw event that produced this error.
    pub(crate) fn in_event(self, index: usize, raw: &Value) -> Self {
        let field = |key: &str| raw.get(key).and_then(Value::as_str).map(str::to_string);
        TefError::Event {
            index,
            phase: field("ph"),
            name: field("name"),
            source: Box::new(self),
        }
    }

    /// The underlying error with any per-event context stripped.
    pub fn root_cause(&self) -> &TefError {
        let mut err = self;
        while let TefError::Event { source, .. } = err {
            err = source;
        }
        err
    }

    /// Index of the offending event, if the error is tied to one.
    pub fn event_index(&self) -> Option<usize> {
        match self {
            TefError::Event { index, .. } => Some(*index),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for TefError {
    fn from(err: serde_json::Error) -> Self {
        match err.classify() {
            Category::Io => TefError::Io(err.into()),
            Category::Syntax | Category::Eof | Category::Data => TefError::Syntax(err.to_string()),
        }
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
