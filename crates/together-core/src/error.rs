use std::fmt;

use thiserror::Error;

use crate::store::StoreError;

/// Machine-readable error codes surfaced by the CLI in JSON mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    UserNotFound,
    WishNotFound,
    InvalidEnumValue,
    InvalidTitle,
    InvalidPriority,
    InvalidComment,
    DuplicateVote,
    InvalidInviteCode,
    SelfLink,
    NotLinked,
    FetchFailed,
    WriteFailed,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::UserNotFound => "E2001",
            Self::WishNotFound => "E2002",
            Self::InvalidEnumValue => "E2003",
            Self::InvalidTitle => "E2004",
            Self::InvalidPriority => "E2005",
            Self::InvalidComment => "E2006",
            Self::DuplicateVote => "E2007",
            Self::InvalidInviteCode => "E3001",
            Self::SelfLink => "E3002",
            Self::NotLinked => "E3003",
            Self::FetchFailed => "E5001",
            Self::WriteFailed => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Project not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::UserNotFound => "User not found",
            Self::WishNotFound => "Wish not found",
            Self::InvalidEnumValue => "Invalid category value",
            Self::InvalidTitle => "Wish title is empty",
            Self::InvalidPriority => "Priority out of range",
            Self::InvalidComment => "Comment text is empty",
            Self::DuplicateVote => "Priority already set",
            Self::InvalidInviteCode => "Invite code not recognized",
            Self::SelfLink => "Cannot link to yourself",
            Self::NotLinked => "No partner linked",
            Self::FetchFailed => "Failed to load data",
            Self::WriteFailed => "Write rejected by store",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint for operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `tg init` to create a wishlist database here."),
            Self::ConfigParseError => Some("Fix syntax in .together/config.toml and retry."),
            Self::UserNotFound => Some("Create the user with `tg user add` or pass --user."),
            Self::WishNotFound | Self::WriteFailed => None,
            Self::InvalidEnumValue => {
                Some("Use one of: all, places, restaurants, movies, games, events.")
            }
            Self::InvalidTitle => Some("Give the wish a non-blank title."),
            Self::InvalidPriority => Some("Pick a priority between 1 and 5."),
            Self::InvalidComment => Some("Write something before posting."),
            Self::DuplicateVote => Some("Each partner sets a wish's priority once."),
            Self::InvalidInviteCode => Some("Ask your partner for the code shown by `tg invite`."),
            Self::SelfLink => Some("Use your partner's invite code, not your own."),
            Self::NotLinked => Some("Link with a partner first using `tg link <code>`."),
            Self::FetchFailed => Some("Check the database path and retry."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors returned by the public together-core API.
#[derive(Debug, Error)]
pub enum TogetherError {
    #[error("fetch failed: {0}")]
    FetchFailed(#[source] StoreError),
    #[error("write failed: {0}")]
    WriteFailed(#[source] StoreError),
    #[error("wish title must not be empty")]
    InvalidTitle,
    #[error("priority must be between 1 and 5, got {0}")]
    InvalidPriority(i64),
    #[error("comment text must not be empty")]
    InvalidComment,
    #[error("invalid category '{0}'")]
    InvalidCategory(String),
    #[error("{user_id} already set a priority for wish {wish_id}")]
    DuplicateVote { wish_id: String, user_id: String },
    #[error("no user with invite code '{0}'")]
    InvalidInviteCode(String),
    #[error("cannot link with your own invite code")]
    SelfLink,
    #[error("user {0} is not linked to a partner")]
    NotLinked(String),
    #[error("user not found: {0}")]
    UserNotFound(String),
    #[error("wish not found: {0}")]
    WishNotFound(String),
}

impl TogetherError {
    /// Stable machine code for this error.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::FetchFailed(_) => ErrorCode::FetchFailed,
            Self::WriteFailed(_) => ErrorCode::WriteFailed,
            Self::InvalidTitle => ErrorCode::InvalidTitle,
            Self::InvalidPriority(_) => ErrorCode::InvalidPriority,
            Self::InvalidComment => ErrorCode::InvalidComment,
            Self::InvalidCategory(_) => ErrorCode::InvalidEnumValue,
            Self::DuplicateVote { .. } => ErrorCode::DuplicateVote,
            Self::InvalidInviteCode(_) => ErrorCode::InvalidInviteCode,
            Self::SelfLink => ErrorCode::SelfLink,
            Self::NotLinked(_) => ErrorCode::NotLinked,
            Self::UserNotFound(_) => ErrorCode::UserNotFound,
            Self::WishNotFound(_) => ErrorCode::WishNotFound,
        }
    }

    /// Remediation hint, if one applies.
    #[must_use]
    pub fn suggestion(&self) -> Option<String> {
        self.error_code().hint().map(str::to_string)
    }
}
