//! Definition path validation
//!
//! Definitions are identified by filesystem-style paths:
//! - Must start with `/`
//! - Segments separated by `/`
//! - Each segment: `[a-z][a-z0-9-]*` (starts with letter, then lowercase alphanumeric and hyphens)
//! - Max 255 characters total
//! - Normalized to lowercase

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

/// Validation errors for definition paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathValidationError {
    /// Path is empty
    Empty,
    /// Path doesn't start with `/`
    MissingLeadingSlash,
    /// Path is too long (> 255 chars)
    TooLong,
    /// Path contains empty segment (consecutive slashes)
    EmptySegment,
    /// Segment contains invalid characters or format
    InvalidSegment(String),
    /// Segment doesn't start with a letter
    SegmentStartsWithNonLetter(String),
}

impl fmt::Display for PathValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathValidationError::Empty => write!(f, "definition path cannot be empty"),
            PathValidationError::MissingLeadingSlash => {
                write!(f, "definition path must start with '/'")
            }
            PathValidationError::TooLong => {
                write!(f, "definition path must be 255 characters or less")
            }
            PathValidationError::EmptySegment => {
                write!(
                    f,
                    "definition path cannot contain empty segments (consecutive slashes)"
                )
            }
            PathValidationError::InvalidSegment(seg) => {
                write!(
                    f,
                    "segment '{}' contains invalid characters (allowed: lowercase letters, digits, hyphens)",
                    seg
                )
            }
            PathValidationError::SegmentStartsWithNonLetter(seg) => {
                write!(f, "segment '{}' must start with a letter", seg)
            }
        }
    }
}

impl std::error::Error for PathValidationError {}

const MAX_PATH_LEN: usize = 255;

static SEGMENT_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap());

/// Validate and normalize a definition path.
///
/// # Examples
/// ```
/// use mudobj::objects::validate_definition_path;
///
/// assert!(validate_definition_path("/std/room").is_ok());
/// assert_eq!(validate_definition_path("/Std/Room").unwrap(), "/std/room");
///
/// assert!(validate_definition_path("std/room").is_err());
/// assert!(validate_definition_path("/std//room").is_err());
/// assert!(validate_definition_path("/2nd/room").is_err());
/// ```
pub fn validate_definition_path(path: &str) -> Result<String, PathValidationError> {
    if path.is_empty() {
        return Err(PathValidationError::Empty);
    }

    let normalized = path.to_lowercase();
    let Some(rest) = normalized.strip_prefix('/') else {
        return Err(PathValidationError::MissingLeadingSlash);
    };
    if normalized.len() > MAX_PATH_LEN {
        return Err(PathValidationError::TooLong);
    }

    // `//` and a trailing `/` are reported before any segment contents
    if rest.split('/').any(str::is_empty) {
        return Err(PathValidationError::EmptySegment);
    }
    rest.split('/').try_for_each(check_segment)?;

    Ok(normalized)
}

/// One path component: a letter, then letters, digits and hyphens
fn check_segment(segment: &str) -> Result<(), PathValidationError> {
    match segment.chars().next() {
        Some(first) if first.is_ascii_lowercase() => {}
        _ => {
            return Err(PathValidationError::SegmentStartsWithNonLetter(
                segment.to_string(),
            ))
        }
    }

    if SEGMENT_REGEX.is_match(segment) {
        Ok(())
    } else {
        Err(PathValidationError::InvalidSegment(segment.to_string()))
    }
}

/// Identity of a definition: a validated, normalized path like `/std/room`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DefinitionId(String);

impl DefinitionId {
    /// Validate `path` and build an id from it
    pub fn new(path: &str) -> Result<Self, PathValidationError> {
        validate_definition_path(path).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Final segment of the path (`/std/room` -> `room`)
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Relative file path of this definition's source (`/std/room` -> `std/room.toml`)
    pub fn source_file(&self) -> PathBuf {
        PathBuf::from(format!("{}.toml", &self.0[1..]))
    }
}

impl fmt::Display for DefinitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for DefinitionId {
    type Error = PathValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl TryFrom<&str> for DefinitionId {
    type Error = PathValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DefinitionId> for String {
    fn from(id: DefinitionId) -> Self {
        id.0
    }
}

impl AsRef<str> for DefinitionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_paths() {
        assert_eq!(validate_definition_path("/std").unwrap(), "/std");
        assert_eq!(
            validate_definition_path("/std/dark-room").unwrap(),
            "/std/dark-room"
        );
        assert_eq!(
            validate_definition_path("/domains/keep/room2").unwrap(),
            "/domains/keep/room2"
        );
        assert_eq!(validate_definition_path("/STD/Room").unwrap(), "/std/room");
    }

    #[test]
    fn test_invalid_paths() {
        assert_eq!(validate_definition_path(""), Err(PathValidationError::Empty));
        assert_eq!(
            validate_definition_path("std/room"),
            Err(PathValidationError::MissingLeadingSlash)
        );
        assert_eq!(
            validate_definition_path("/std/"),
            Err(PathValidationError::EmptySegment)
        );
        assert_eq!(
            validate_definition_path("/"),
            Err(PathValidationError::EmptySegment)
        );
        assert_eq!(
            validate_definition_path("/1std//room"),
            Err(PathValidationError::EmptySegment)
        );
        assert_eq!(
            validate_definition_path("/std/1room"),
            Err(PathValidationError::SegmentStartsWithNonLetter(
                "1room".to_string()
            ))
        );
        assert_eq!(
            validate_definition_path("/std/my_room"),
            Err(PathValidationError::InvalidSegment("my_room".to_string()))
        );
    }

    #[test]
    fn test_too_long() {
        let long_path = format!("/{}", "a".repeat(255));
        assert_eq!(
            validate_definition_path(&long_path),
            Err(PathValidationError::TooLong)
        );

        let max_path = format!("/{}", "a".repeat(253));
        assert!(validate_definition_path(&max_path).is_ok());
    }

    #[test]
    fn test_definition_id() {
        let id = DefinitionId::new("/Std/Room").unwrap();
        assert_eq!(id.as_str(), "/std/room");
        assert_eq!(id.name(), "room");
        assert_eq!(id.source_file(), PathBuf::from("std/room.toml"));
        assert_eq!(id.to_string(), "/std/room");
    }

    #[test]
    fn test_definition_id_serde() {
        let id: DefinitionId = serde_json::from_str("\"/std/thing\"").unwrap();
        assert_eq!(id.as_str(), "/std/thing");
        assert!(serde_json::from_str::<DefinitionId>("\"thing\"").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"/std/thing\"");
    }
}
