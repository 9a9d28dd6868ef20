//! User Name Value Object
//!
//! The display name doubles as the key the verification job uses to find its
//! user again, so it is unique on a canonical form: NFKC, trimmed, lower-case.
//!
//! ## Rules (checked on the canonical form)
//! - 3 to 30 characters
//! - ASCII letters, digits and `_ . -`
//! - starts and ends with a letter, digit or `_`
//! - no `..`
//! - not a reserved word

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use unicode_normalization::UnicodeNormalization;

pub const USER_NAME_MIN_LENGTH: usize = 3;
pub const USER_NAME_MAX_LENGTH: usize = 30;

const ALLOWED_SPECIAL_CHARS: &[char] = &['_', '.', '-'];

/// Names that would collide with routes or impersonate staff
const RESERVED_NAMES: &[&str] = &[
    "admin",
    "administrator",
    "root",
    "system",
    "moderator",
    "staff",
    "support",
    "api",
    "auth",
    "login",
    "register",
    "verify_email",
    "profile",
    "me",
    "null",
    "anonymous",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UserNameError {
    #[error("User name cannot be empty")]
    Empty,

    #[error("User name must be {min} to {max} characters (got {length})", min = USER_NAME_MIN_LENGTH, max = USER_NAME_MAX_LENGTH)]
    Length { length: usize },

    #[error("Invalid character '{ch}' in user name; only a-z, 0-9, _, ., - are allowed")]
    InvalidCharacter { ch: char },

    #[error("User name must start and end with a letter, digit or underscore")]
    InvalidBoundary,

    #[error("User name cannot contain consecutive dots")]
    ConsecutiveDots,

    #[error("'{0}' is a reserved user name")]
    Reserved(String),
}

/// Validated user name
///
/// `display` keeps the caller's casing; `canonical` is what uniqueness and
/// lookups use.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserName {
    display: String,
    canonical: String,
}

impl UserName {
    pub fn parse(raw: impl AsRef<str>) -> Result<Self, UserNameError> {
        let display: String = raw.as_ref().nfkc().collect::<String>().trim().to_string();
        let canonical = display.to_lowercase();
        validate(&canonical)?;
        Ok(Self { display, canonical })
    }

    /// Stored values were validated on the way in
    pub fn from_db(display: impl Into<String>) -> Self {
        let display = display.into();
        let canonical = display.to_lowercase();
        Self { display, canonical }
    }

    #[inline]
    pub fn display(&self) -> &str {
        &self.display
    }

    #[inline]
    pub fn canonical(&self) -> &str {
        &self.canonical
    }
}

fn validate(canonical: &str) -> Result<(), UserNameError> {
    if canonical.is_empty() {
        return Err(UserNameError::Empty);
    }

    let length = canonical.chars().count();
    if !(USER_NAME_MIN_LENGTH..=USER_NAME_MAX_LENGTH).contains(&length) {
        return Err(UserNameError::Length { length });
    }

    if let Some(ch) = canonical
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || ALLOWED_SPECIAL_CHARS.contains(c)))
    {
        return Err(UserNameError::InvalidCharacter { ch });
    }

    let boundary_ok = |c: Option<char>| {
        c.is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    };
    if !boundary_ok(canonical.chars().next()) || !boundary_ok(canonical.chars().next_back()) {
        return Err(UserNameError::InvalidBoundary);
    }

    if canonical.contains("..") {
        return Err(UserNameError::ConsecutiveDots);
    }

    if RESERVED_NAMES.contains(&canonical) {
        return Err(UserNameError::Reserved(canonical.to_string()));
    }

    Ok(())
}

impl fmt::Debug for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UserName({})", self.canonical)
    }
}

impl fmt::Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl TryFrom<String> for UserName {
    type Error = UserNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<UserName> for String {
    fn from(name: UserName) -> Self {
        name.display
    }
}
