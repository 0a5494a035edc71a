use thiserror::Error;

use crate::cards::Rarity;

/// A user facing error, sent to clients as a title and a body of text.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct MessageError {
    pub title: String,
    pub text: String,
}

impl MessageError {
    pub fn new<T: ToString, S: ToString>(title: T, text: S) -> Self {
        Self {
            title: title.to_string(),
            text: text.to_string(),
        }
    }

    pub fn generation<S: ToString>(text: S) -> Self {
        Self::new("Error generating boosters", text)
    }
}

impl std::fmt::Display for MessageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.title, self.text)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DraftError {
    #[error("Pool is empty.")]
    EmptyPool,
    #[error("Insufficient {0:?}s in pool.")]
    InsufficientCards(Rarity),
    #[error("{0}")]
    Generation(MessageError),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Invalid pick: {0}")]
    InvalidPick(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DraftError {
    /// Convert into the message shown to the session owner when a draft could
    /// not be started.
    pub fn into_message(self) -> MessageError {
        match self {
            DraftError::Generation(message) => message,
            DraftError::EmptyPool => MessageError::generation(
                "An error occured while generating boosters. Make sure there are enough cards in the list.",
            ),
            DraftError::InsufficientCards(rarity) => MessageError::generation(format!(
                "Not enough {} cards in collection.",
                rarity.name()
            )),
            DraftError::Config(text) => MessageError::new("Invalid configuration", text),
            DraftError::InvalidPick(text) => MessageError::new("Invalid pick", text),
            DraftError::Internal(text) => MessageError::generation(format!("Unspecified error: {text}")),
        }
    }
}

impl From<MessageError> for DraftError {
    fn from(value: MessageError) -> Self {
        DraftError::Generation(value)
    }
}

pub type Res<T> = Result<T, DraftError>;

/// Shorthand for an invalid pick error.
pub fn err<T, S: ToString>(message: S) -> Res<T> {
    Err(DraftError::InvalidPick(message.to_string()))
}
