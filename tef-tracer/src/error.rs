use tef_codec::{Phase, TefError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TracerError {
    #[error("{capability} cannot be attached to '{phase}' events")]
    Unsupported { capability: &'static str, phase: Phase },

    #[error("failed to write '{phase}' event: {source}")]
    Write {
        phase: Phase,
        #[source]
        source: TefError,
    },

    #[error("failed to close trace sink: {0}")]
    Close(#[source] TefError),
}

pub type Result<T> = std::result::Result<T, TracerError>;
