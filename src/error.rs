//! Error types shared across the crate.
//!
//! None of these are fatal to a chat turn: the interpreter renders each of
//! them as a `system` entry in the conversation.

use thiserror::Error;

/// Failure reported by an [`AppletStore`](crate::store::AppletStore)
///
/// The `Display` text is the diagnostic shown to the user.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No record matches both the user id and the record id
    #[error("AppletState not found")]
    NotFound,

    #[error("Failed to create AppletState: {0}")]
    Create(String),

    #[error("Failed to retrieve user applets: {0}")]
    List(String),

    #[error("Failed to retrieve AppletState: {0}")]
    Get(String),

    #[error("Failed to update AppletState: {0}")]
    Update(String),
}

/// Failure raised by an applet's state transition
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppletError {
    /// The persisted state does not have the shape the applet expects
    #[error("Invalid applet state: {0}")]
    InvalidState(String),

    /// The applet refused the input
    #[error("{0}")]
    Rejected(String),
}

/// Failure reported by the [`UserDirectory`](crate::users::UserDirectory)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("Username already exists")]
    UsernameTaken,

    #[error("Email already exists")]
    EmailTaken,

    #[error("Username and email cannot be empty")]
    MissingField,

    #[error("Invalid email format. Please enter a valid email address.")]
    InvalidEmail,

    #[error("User not found")]
    UserNotFound,

    #[error("Failed to access users file: {0}")]
    Storage(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: &'static str, message: String },
}
