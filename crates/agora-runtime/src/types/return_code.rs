//! Outcome codes for lifecycle, organization and messaging operations

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result of a kernel operation
///
/// Lifecycle, organization and messaging operations never fail with an
/// error: every outcome, including the negative ones, is a `ReturnCode`.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReturnCode {
    Success,

    // Lifecycle
    AlreadyLaunched,
    AlreadyKilled,
    NotYetLaunched,
    TimeOut,
    AgentCrash,

    // Messaging
    InvalidArg,
    InvalidAa,
    NotInGroup,
    NotRole,
    RoleNotHandled,
    NoRecipientFound,

    // Organization
    NotCommunity,
    NotGroup,
    AlreadyGroup,
    RoleAlreadyHandled,
    AccessDenied,
    Ignored,
}

impl ReturnCode {
    pub fn is_success(&self) -> bool {
        matches!(self, ReturnCode::Success)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReturnCode::Success => "SUCCESS",
            ReturnCode::AlreadyLaunched => "ALREADY_LAUNCHED",
            ReturnCode::AlreadyKilled => "ALREADY_KILLED",
            ReturnCode::NotYetLaunched => "NOT_YET_LAUNCHED",
            ReturnCode::TimeOut => "TIME_OUT",
            ReturnCode::AgentCrash => "AGENT_CRASH",
            ReturnCode::InvalidArg => "INVALID_ARG",
            ReturnCode::InvalidAa => "INVALID_AA",
            ReturnCode::NotInGroup => "NOT_IN_GROUP",
            ReturnCode::NotRole => "NOT_ROLE",
            ReturnCode::RoleNotHandled => "ROLE_NOT_HANDLED",
            ReturnCode::NoRecipientFound => "NO_RECIPIENT_FOUND",
            ReturnCode::NotCommunity => "NOT_COMMUNITY",
            ReturnCode::NotGroup => "NOT_GROUP",
            ReturnCode::AlreadyGroup => "ALREADY_GROUP",
            ReturnCode::RoleAlreadyHandled => "ROLE_ALREADY_HANDLED",
            ReturnCode::AccessDenied => "ACCESS_DENIED",
            ReturnCode::Ignored => "IGNORED",
        }
    }
}

impl fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
