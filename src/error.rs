use crate::mention::TokenKind;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("config file i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("config is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("message has no {0}")]
    MissingToken(TokenKind),

    #[error("server {0} is not registered")]
    ServerNotFound(String),

    #[error("no emoji is mapped to role {0}")]
    RoleNotFound(String),

    #[error("user {0} may not change this server")]
    PermissionDenied(String),

    #[error("platform call failed: {0}")]
    Platform(String),
}

impl Error {
    /// Coarse category, used as a log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::Json(_) | Self::MissingToken(_) => "parse",
            Self::ServerNotFound(_) | Self::RoleNotFound(_) => "not_found",
            Self::PermissionDenied(_) => "permission_denied",
            Self::Platform(_) => "platform",
        }
    }
}

impl From<serenity::Error> for Error {
    fn from(err: serenity::Error) -> Self {
        Self::Platform(err.to_string())
    }
}
