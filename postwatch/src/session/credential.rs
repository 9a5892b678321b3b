//! Portal session cookie.

use std::fmt;

/// Cookie name the portal authenticates with.
pub const DEFAULT_COOKIE_NAME: &str = ".ASPXAUTH";

/// The authentication cookie sent with every portal request.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionCredential {
    name: String,
    value: String,
}

impl SessionCredential {
    /// Create a credential from an explicit cookie name and value.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Create a credential for the default portal cookie.
    pub fn aspxauth(value: impl Into<String>) -> Self {
        Self::new(DEFAULT_COOKIE_NAME, value)
    }

    /// Parse a seed value such as `.ASPXAUTH=ABCDEF` or a bare cookie value.
    ///
    /// Surrounding whitespace and quotes are stripped. Returns `None` for an empty seed.
    pub fn parse(seed: &str) -> Option<Self> {
        let seed = seed.trim().trim_matches(|c| c == '\'' || c == '"').trim();
        if seed.is_empty() {
            return None;
        }

        if let Some((name, value)) = seed.split_once('=') {
            let name = name.trim();
            let value = value.trim();
            let named = !name.is_empty()
                && !name.contains(char::is_whitespace)
                && !value.trim_end_matches('=').is_empty();
            if named {
                return Some(Self::new(name, value));
            }
        }

        Some(Self::aspxauth(seed))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Value for the `Cookie` request header.
    pub fn header_value(&self) -> String {
        format!("{}={}", self.name, self.value)
    }
}

impl fmt::Debug for SessionCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tail: String = self
            .value
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        f.debug_struct("SessionCredential")
            .field("name", &self.name)
            .field("value", &format_args!("…{tail}"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_named_seed() {
        let cred = SessionCredential::parse(".ASPXAUTH=ABC123").unwrap();
        assert_eq!(cred.name(), ".ASPXAUTH");
        assert_eq!(cred.value(), "ABC123");
        assert_eq!(cred.header_value(), ".ASPXAUTH=ABC123");
    }

    #[test]
    fn test_parse_quoted_seed() {
        let cred = SessionCredential::parse("'.ASPXAUTH=ABC123'\n").unwrap();
        assert_eq!(cred.value(), "ABC123");
    }

    #[test]
    fn test_parse_bare_value() {
        let cred = SessionCredential::parse("DEADBEEF").unwrap();
        assert_eq!(cred.name(), DEFAULT_COOKIE_NAME);
        assert_eq!(cred.value(), "DEADBEEF");

        // Base64 padding is not a name/value separator.
        let cred = SessionCredential::parse("abc==").unwrap();
        assert_eq!(cred.name(), DEFAULT_COOKIE_NAME);
        assert_eq!(cred.value(), "abc==");
    }

    #[test]
    fn test_parse_empty_seed() {
        assert!(SessionCredential::parse("  ").is_none());
        assert!(SessionCredential::parse("''").is_none());
    }

    #[test]
    fn test_debug_redacts_value() {
        let cred = SessionCredential::aspxauth("SECRETVALUE1234");
        let debug = format!("{cred:?}");
        assert!(!debug.contains("SECRETVALUE"));
        assert!(debug.contains("1234"));
    }
}
