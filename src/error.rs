use thiserror::Error;

use crate::store::CardId;

#[derive(Debug, Error)]
pub enum CardError {
    #[error("TYPE_MISMATCH: card {id} is not {expected}")]
    TypeMismatch { id: CardId, expected: &'static str },
    #[error("INDEX_OUT_OF_BOUNDS: position {position} in {index} (length {len})")]
    IndexOutOfBounds {
        index: String,
        position: isize,
        len: usize,
    },
    #[error("UNKNOWN_CARD: {0}")]
    UnknownCard(CardId),
    #[error("FORMAT_STRIP: {0}")]
    FormatStrip(String),
    #[error("IO_FAILURE: {0}")]
    Io(String),
    #[error("SERIALIZATION: {0}")]
    Serialization(String),
    #[error("CONFIG: {0}")]
    Config(String),
}

impl CardError {
    pub fn type_mismatch(id: &str, expected: &'static str) -> Self {
        Self::TypeMismatch {
            id: id.to_string(),
            expected,
        }
    }
}

impl From<std::io::Error> for CardError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value.to_string())
    }
}

impl From<serde_json::Error> for CardError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

impl From<bincode::Error> for CardError {
    fn from(value: bincode::Error) -> Self {
        Self::Serialization(value.to_string())
    }
}

impl From<toml::de::Error> for CardError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}

impl From<toml::ser::Error> for CardError {
    fn from(value: toml::ser::Error) -> Self {
        Self::Config(value.to_string())
    }
}

pub type CardResult<T> = Result<T, CardError>;
