use serde::{Deserialize, Serialize};
use thiserror::Error;
use ts_rs::TS;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum AuthError {
    #[error("username already taken")]
    UsernameTaken,
    #[error("invalid username or password")]
    InvalidCredentials,
    #[error("login required")]
    NotLoggedIn,
    #[error("already logged in as {username}")]
    AlreadyLoggedIn { username: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum GameStateError {
    #[error("no active round")]
    NoActiveRound,
    #[error("not joined to the current round")]
    NotInRound,
    #[error("round already terminated for this player")]
    AlreadyTerminated,
    #[error("round has expired")]
    RoundExpired,
    #[error("a proposal needs exactly 4 words, got {count}")]
    WrongWordCount { count: usize },
    #[error("proposal contains duplicate words")]
    DuplicateWords,
    #[error("word not in this round: {word}")]
    UnknownWord { word: String },
    #[error("group already found")]
    GroupAlreadyFound,
    #[error("player not found: {username}")]
    PlayerNotFound { username: String },
}

/// Every failure a request can produce. The display string is what the
/// client sees as `message` in a `success:false` response.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ServerError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    GameState(#[from] GameStateError),
    #[error("malformed message: {0}")]
    Transport(String),
    #[error("internal error")]
    Internal,
}

impl ServerError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServerError::Validation(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        ServerError::Transport(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_errors_display_inner_message() {
        let error: ServerError = GameStateError::AlreadyTerminated.into();
        assert_eq!(error.to_string(), "round already terminated for this player");

        let error: ServerError = AuthError::UsernameTaken.into();
        assert_eq!(error.to_string(), "username already taken");
    }

    #[test]
    fn test_transport_error_is_prefixed() {
        let error = ServerError::transport("expected value at line 1 column 1");
        assert!(error.to_string().starts_with("malformed message:"));
    }
}
