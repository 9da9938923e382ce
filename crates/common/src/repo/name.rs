// Repository name validation: safe charset, no separators, no traversal, 100 char max.

use std::fmt;
use std::ops::Deref;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum allowed repository name length in characters.
pub const MAX_REPO_NAME_CHARS: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RepoNameError {
    #[error("repository name is empty")]
    Empty,

    #[error("repository name exceeds maximum length of {MAX_REPO_NAME_CHARS} characters")]
    TooLong,

    #[error("repository name contains a path separator: {0:?}")]
    Separator(char),

    #[error("repository name is a directory traversal component: {0}")]
    Traversal(String),

    #[error("repository name must not start with {0:?}")]
    InvalidLeading(char),

    #[error("repository name contains invalid character {0:?}")]
    InvalidChar(char),
}

/// A repository name that is safe to use as a directory name under the
/// repository root, as a git command-line argument, and as a metric label.
///
/// Rules:
/// - Non-empty, at most 100 characters
/// - Only ASCII letters, digits, `.`, `_` and `-`
/// - No `/` or `\` separators
/// - Not `.` or `..`
/// - Must not start with `.` (hidden entries are never listed as mirrors)
/// - Must not start with `-` (would be parsed as a git option)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName(String);

impl RepoName {
    pub fn parse(input: &str) -> Result<Self, RepoNameError> {
        validate(input)?;
        Ok(Self(input.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate(input: &str) -> Result<(), RepoNameError> {
    if input.is_empty() {
        return Err(RepoNameError::Empty);
    }

    if input.chars().count() > MAX_REPO_NAME_CHARS {
        return Err(RepoNameError::TooLong);
    }

    if input == "." || input == ".." {
        return Err(RepoNameError::Traversal(input.to_string()));
    }

    if let Some(separator) = input.chars().find(|c| *c == '/' || *c == '\\') {
        return Err(RepoNameError::Separator(separator));
    }

    if let Some(leading) = input.chars().next().filter(|c| *c == '.' || *c == '-') {
        return Err(RepoNameError::InvalidLeading(leading));
    }

    if let Some(invalid) =
        input.chars().find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(RepoNameError::InvalidChar(invalid));
    }

    Ok(())
}

impl TryFrom<String> for RepoName {
    type Error = RepoNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate(&value)?;
        Ok(Self(value))
    }
}

impl From<RepoName> for String {
    fn from(name: RepoName) -> Self {
        name.0
    }
}

impl Deref for RepoName {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for RepoName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<std::path::Path> for RepoName {
    fn as_ref(&self) -> &std::path::Path {
        std::path::Path::new(&self.0)
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
