//! Key validation and the filesystem allow-list sandbox
//!
//! Keys are opaque UTF-8 strings to the indices; they need not be filesystem
//! paths. Validation happens in two tiers:
//!
//! - [`validate_key`] applies the universal rules every key must satisfy
//!   (non-empty, bounded, no NUL, no traversal, not absolute), including a
//!   single percent-decode pass so encoded traversal cannot slip through.
//! - [`PathValidator`] additionally confines keys that are used as
//!   filesystem indirection to a configured allow-list of prefixes.
//!
//! "Path-ness" is a property of a key's use, not of the key itself, so the
//! allow-list check runs only at the boundary where indirection occurs.
//! Keys are never silently normalized.

use crate::limits::Limits;
use thiserror::Error;

/// Validate a key using default limits
///
/// # Examples
///
/// ```
/// use agrama_core::key::validate_key;
///
/// assert!(validate_key("src/main.rs").is_ok());
/// assert!(validate_key("concept:frontier-reduction").is_ok());
///
/// assert!(validate_key("").is_err());
/// assert!(validate_key("../etc/passwd").is_err());
/// assert!(validate_key("/etc/passwd").is_err());
/// assert!(validate_key("%2e%2e/secret").is_err());
/// ```
pub fn validate_key(key: &str) -> Result<(), KeyError> {
    validate_key_with_limits(key, &Limits::default())
}

/// Validate a key with custom limits
pub fn validate_key_with_limits(key: &str, limits: &Limits) -> Result<(), KeyError> {
    if key.is_empty() {
        return Err(KeyError::Empty);
    }

    if key.contains('\x00') {
        return Err(KeyError::ContainsNul);
    }

    let len = key.len();
    if len > limits.max_key_bytes {
        return Err(KeyError::TooLong {
            actual: len,
            max: limits.max_key_bytes,
        });
    }

    check_structure(key)?;

    // One decode pass catches %2e%2e, %2f and %00 disguises. Decoding is
    // applied exactly once; a doubly-encoded key stays rejected or opaque.
    if key.contains('%') {
        let decoded = percent_decode_once(key);
        if decoded.contains('\x00') {
            return Err(KeyError::ContainsNul);
        }
        check_structure(&decoded)?;
    }

    Ok(())
}

/// Structural rules shared between the raw and decoded forms
fn check_structure(key: &str) -> Result<(), KeyError> {
    if key.starts_with('/') {
        return Err(KeyError::Absolute);
    }
    if key.split('/').any(|component| component == "..") {
        return Err(KeyError::Traversal);
    }
    // `..` embedded without separators (e.g. "a..b") is harmless; reject
    // only when backslashes smuggle a component boundary.
    if key.split('\\').any(|component| component == "..") {
        return Err(KeyError::Traversal);
    }
    Ok(())
}

/// Decode `%XX` escapes exactly once, leaving malformed escapes untouched
fn percent_decode_once(key: &str) -> String {
    let bytes = key.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hi = (bytes[i + 1] as char).to_digit(16);
            let lo = (bytes[i + 2] as char).to_digit(16);
            if let (Some(hi), Some(lo)) = (hi, lo) {
                out.push((hi * 16 + lo) as u8);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Key validation errors
///
/// These map to `InvalidKey` on the wire.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum KeyError {
    /// Key is empty (length 0)
    #[error("key cannot be empty")]
    Empty,

    /// Key contains a NUL byte, raw or percent-encoded
    #[error("key cannot contain NUL bytes")]
    ContainsNul,

    /// Key contains a `..` path component, raw or percent-encoded
    #[error("key cannot contain '..' components")]
    Traversal,

    /// Key is an absolute path
    #[error("key cannot be absolute")]
    Absolute,

    /// Key exceeds maximum length
    #[error("key too long: {actual} bytes exceeds maximum {max}")]
    TooLong {
        /// Actual key length in bytes
        actual: usize,
        /// Maximum allowed length
        max: usize,
    },

    /// Key used as a filesystem path lies outside the allow-list
    #[error("key is outside the allowed path prefixes")]
    OutsideAllowList,
}

impl KeyError {
    /// Stable reason code for the wire protocol
    pub fn reason_code(&self) -> &'static str {
        match self {
            KeyError::Empty => "empty_key",
            KeyError::ContainsNul => "contains_nul",
            KeyError::Traversal => "traversal",
            KeyError::Absolute => "absolute_path",
            KeyError::TooLong { .. } => "key_too_long",
            KeyError::OutsideAllowList => "outside_allow_list",
        }
    }
}

/// Allow-list sandbox for keys used as filesystem indirection
///
/// A pure checker: it never touches the filesystem and never rewrites the
/// key. An empty allow-list rejects every path-like use.
#[derive(Debug, Clone, Default)]
pub struct PathValidator {
    prefixes: Vec<String>,
    limits: Limits,
}

impl PathValidator {
    /// Create a validator for the given prefixes
    pub fn new(prefixes: impl IntoIterator<Item = impl Into<String>>) -> Self {
        PathValidator {
            prefixes: prefixes.into_iter().map(Into::into).collect(),
            limits: Limits::default(),
        }
    }

    /// Builder: override limits
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// The configured prefixes
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Validate a key that is about to be interpreted as a filesystem path
    pub fn validate(&self, key: &str) -> Result<(), KeyError> {
        validate_key_with_limits(key, &self.limits)?;
        let allowed = self.prefixes.iter().any(|p| {
            key.strip_prefix(p.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('/') || p.ends_with('/'))
        });
        if allowed {
            Ok(())
        } else {
            Err(KeyError::OutsideAllowList)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // === Valid keys ===

    #[test]
    fn test_valid_simple_key() {
        assert!(validate_key("mykey").is_ok());
    }

    #[test]
    fn test_valid_path_like_key() {
        assert!(validate_key("src/db/temporal.rs").is_ok());
    }

    #[test]
    fn test_valid_unicode_key() {
        assert!(validate_key("概念/時間").is_ok());
    }

    #[test]
    fn test_valid_dots_inside_component() {
        assert!(validate_key("a..b").is_ok());
        assert!(validate_key("archive.tar.gz").is_ok());
    }

    #[test]
    fn test_valid_percent_literal() {
        // Malformed escape stays a literal percent sign
        assert!(validate_key("50%done").is_ok());
    }

    #[test]
    fn test_valid_key_at_max_length() {
        let limits = Limits::default();
        let key = "x".repeat(limits.max_key_bytes);
        assert!(validate_key_with_limits(&key, &limits).is_ok());
    }

    // === Invalid keys ===

    #[test]
    fn test_invalid_empty() {
        assert_eq!(validate_key(""), Err(KeyError::Empty));
    }

    #[test]
    fn test_invalid_nul() {
        assert_eq!(validate_key("a\x00b"), Err(KeyError::ContainsNul));
    }

    #[test]
    fn test_invalid_encoded_nul() {
        assert_eq!(validate_key("a%00b"), Err(KeyError::ContainsNul));
    }

    #[test]
    fn test_invalid_traversal() {
        assert_eq!(validate_key("../etc/passwd"), Err(KeyError::Traversal));
        assert_eq!(validate_key("a/../b"), Err(KeyError::Traversal));
        assert_eq!(validate_key("a/.."), Err(KeyError::Traversal));
    }

    #[test]
    fn test_invalid_encoded_traversal() {
        assert_eq!(validate_key("%2e%2e/secret"), Err(KeyError::Traversal));
        assert_eq!(validate_key("a/%2E%2E/b"), Err(KeyError::Traversal));
    }

    #[test]
    fn test_invalid_encoded_slash_traversal() {
        // %2f decodes to '/' which exposes the '..' component
        assert_eq!(validate_key("..%2fsecret"), Err(KeyError::Traversal));
    }

    #[test]
    fn test_invalid_absolute() {
        assert_eq!(validate_key("/etc/passwd"), Err(KeyError::Absolute));
    }

    #[test]
    fn test_invalid_encoded_absolute() {
        assert_eq!(validate_key("%2fetc/passwd"), Err(KeyError::Absolute));
    }

    #[test]
    fn test_invalid_backslash_traversal() {
        assert_eq!(validate_key("..\\secret"), Err(KeyError::Traversal));
    }

    #[test]
    fn test_invalid_too_long() {
        let limits = Limits::default();
        let key = "x".repeat(limits.max_key_bytes + 1);
        assert!(matches!(
            validate_key_with_limits(&key, &limits),
            Err(KeyError::TooLong { .. })
        ));
    }

    // === PathValidator ===

    #[test]
    fn test_allow_list_accepts_inside() {
        let v = PathValidator::new(["workspace", "deps"]);
        assert!(v.validate("workspace/src/main.rs").is_ok());
        assert!(v.validate("deps/serde/lib.rs").is_ok());
        assert!(v.validate("workspace").is_ok());
    }

    #[test]
    fn test_allow_list_rejects_outside() {
        let v = PathValidator::new(["workspace"]);
        assert_eq!(v.validate("etc/passwd"), Err(KeyError::OutsideAllowList));
        // Prefix match is per component: "workspacex" is not "workspace/"
        assert_eq!(
            v.validate("workspacex/file"),
            Err(KeyError::OutsideAllowList)
        );
    }

    #[test]
    fn test_allow_list_rejects_escape_before_prefix_check() {
        let v = PathValidator::new(["workspace"]);
        assert_eq!(
            v.validate("workspace/../etc/passwd"),
            Err(KeyError::Traversal)
        );
        assert_eq!(
            v.validate("workspace/%2e%2e/etc"),
            Err(KeyError::Traversal)
        );
    }

    #[test]
    fn test_empty_allow_list_rejects_everything() {
        let v = PathValidator::default();
        assert_eq!(v.validate("anything"), Err(KeyError::OutsideAllowList));
    }

    #[test]
    fn test_reason_codes() {
        assert_eq!(KeyError::Empty.reason_code(), "empty_key");
        assert_eq!(KeyError::Traversal.reason_code(), "traversal");
        assert_eq!(KeyError::OutsideAllowList.reason_code(), "outside_allow_list");
    }
}
