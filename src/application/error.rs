// Application errors surfaced to the HTTP layer
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LabError {
    #[error("unknown sensor: {0}")]
    UnknownSensor(String),
    #[error("sensor {0} is not mounted")]
    NotMounted(String),
    #[error("invalid note key: {0:?}")]
    InvalidNoteKey(String),
    #[error("note store unavailable: {0}")]
    NoteStore(String),
}
