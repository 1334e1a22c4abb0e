// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;

/// Longest accepted nickname, in characters, after trimming.
pub const MAX_LEN: usize = 32;

/// A nickname that passed validation.
///
/// Surrounding whitespace is trimmed; case is preserved. Only ASCII letters, digits, space,
/// `_`, `-` and `.` are accepted, and the trimmed value must be 1 to 32 characters long. The
/// trimmed value is used verbatim as the cache key and upstream query parameter.
///
/// # Examples
///
/// ```
/// use elo_gateway::Nickname;
///
/// let nickname = Nickname::parse("  s1mple ").unwrap();
/// assert_eq!(nickname.as_str(), "s1mple");
///
/// assert!(Nickname::parse("bad;nick").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Nickname(String);

/// Why a nickname was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum InvalidNickname {
    /// Nothing left after trimming.
    #[error("nickname must not be empty")]
    Empty,

    /// Longer than [`MAX_LEN`] characters.
    #[error("nickname must be at most {max} characters, got {0}", max = MAX_LEN)]
    TooLong(usize),

    /// Contains a character outside the allow-list.
    #[error("nickname contains disallowed character {0:?}")]
    DisallowedCharacter(char),
}

impl Nickname {
    /// Validates and normalizes `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidNickname`] if the trimmed value is empty, too long, or contains a
    /// character outside the allow-list.
    pub fn parse(raw: &str) -> Result<Self, InvalidNickname> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidNickname::Empty);
        }

        if let Some(bad) = trimmed.chars().find(|c| !is_allowed(*c)) {
            return Err(InvalidNickname::DisallowedCharacter(bad));
        }

        // Every allowed character is single-byte.
        if trimmed.len() > MAX_LEN {
            return Err(InvalidNickname::TooLong(trimmed.len()));
        }

        Ok(Self(trimmed.to_owned()))
    }

    /// The normalized nickname.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the nickname, returning the normalized string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl Display for Nickname {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, ' ' | '_' | '-' | '.')
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("shroud", "shroud")]
    #[case("  s1mple\t", "s1mple")]
    #[case("ZywOo", "ZywOo")]
    #[case("the.dev-ice_", "the.dev-ice_")]
    #[case("two words", "two words")]
    #[case("a", "a")]
    #[case("abcdefghijabcdefghijabcdefghij12", "abcdefghijabcdefghijabcdefghij12")]
    fn accepts(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(Nickname::parse(raw).unwrap().as_str(), expected);
    }

    #[rstest]
    #[case("", InvalidNickname::Empty)]
    #[case("   ", InvalidNickname::Empty)]
    #[case("bad;nick", InvalidNickname::DisallowedCharacter(';'))]
    #[case("<script>", InvalidNickname::DisallowedCharacter('<'))]
    #[case("naïve", InvalidNickname::DisallowedCharacter('ï'))]
    #[case("tab\tinside", InvalidNickname::DisallowedCharacter('\t'))]
    #[case("abcdefghijabcdefghijabcdefghij123", InvalidNickname::TooLong(33))]
    fn rejects(#[case] raw: &str, #[case] expected: InvalidNickname) {
        assert_eq!(Nickname::parse(raw), Err(expected));
    }

    #[test]
    fn error_messages_are_readable() {
        assert_eq!(InvalidNickname::Empty.to_string(), "nickname must not be empty");
        assert_eq!(
            InvalidNickname::TooLong(40).to_string(),
            "nickname must be at most 32 characters, got 40"
        );
        assert_eq!(
            InvalidNickname::DisallowedCharacter(';').to_string(),
            "nickname contains disallowed character ';'"
        );
    }
}
