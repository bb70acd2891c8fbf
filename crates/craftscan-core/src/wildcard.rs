//! Wildcard patterns and matching of concrete codes against them.
//!
//! A pattern is a namespaced code whose path holds exactly one variable token,
//! written either as `*` (`game:planks-*`) or as a named placeholder
//! (`game:planks-{wood}`). Matching is case-sensitive on raw codes.

use craftscan_common::{split_code, ItemClass, BASE_DOMAIN};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while parsing a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WildcardError {
    /// Pattern has no variable token, or more than one
    #[error("Pattern '{pattern}' must contain exactly one wildcard token, found {found}")]
    TokenCount {
        /// Offending pattern
        pattern: String,
        /// Number of tokens found
        found: usize,
    },

    /// Placeholder opened with `{` but never closed
    #[error("Unterminated placeholder in pattern '{0}'")]
    Unterminated(String),

    /// Regex-style patterns are not supported
    #[error("Unsupported pattern syntax: {0}")]
    Unsupported(String),
}

/// Result type for pattern operations.
pub type WildcardResult<T> = Result<T, WildcardError>;

/// Checks whether a code contains any wildcard syntax.
#[must_use]
pub fn is_pattern(code: &str) -> bool {
    code.contains('*') || code.contains('{') || code.starts_with('@')
}

/// Replaces every wildcard token in `template` with `token`.
///
/// Both `*` and `{name}` placeholders are substituted. Text without a
/// placeholder is returned unchanged.
#[must_use]
pub fn fill_template(template: &str, token: &str) -> String {
    let mut out = String::with_capacity(template.len() + token.len());
    let mut rest = template;
    while let Some(pos) = rest.find(['*', '{']) {
        out.push_str(&rest[..pos]);
        if rest[pos..].starts_with('*') {
            out.push_str(token);
            rest = &rest[pos + 1..];
        } else if let Some(close) = rest[pos..].find('}') {
            out.push_str(token);
            rest = &rest[pos + close + 1..];
        } else {
            out.push_str(&rest[pos..]);
            rest = "";
        }
    }
    out.push_str(rest);
    out
}

/// A parsed single-token pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WildcardPattern {
    raw: String,
    domain: String,
    prefix: String,
    suffix: String,
}

impl WildcardPattern {
    /// Parses a pattern such as `game:planks-*`.
    pub fn parse(raw: &str) -> WildcardResult<Self> {
        if raw.starts_with('@') {
            return Err(WildcardError::Unsupported(raw.to_owned()));
        }
        let (domain, path) = split_code(raw);

        let mut tokens = 0usize;
        let mut span = None;
        let bytes = path.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            match bytes[i] {
                b'*' => {
                    tokens += 1;
                    span.get_or_insert((i, i + 1));
                    i += 1;
                }
                b'{' => {
                    let close = path[i..]
                        .find('}')
                        .ok_or_else(|| WildcardError::Unterminated(raw.to_owned()))?;
                    tokens += 1;
                    span.get_or_insert((i, i + close + 1));
                    i += close + 1;
                }
                _ => i += 1,
            }
        }

        match (tokens, span) {
            (1, Some((start, end))) => Ok(Self {
                raw: raw.to_owned(),
                domain: domain.to_owned(),
                prefix: path[..start].to_owned(),
                suffix: path[end..].to_owned(),
            }),
            _ => Err(WildcardError::TokenCount {
                pattern: raw.to_owned(),
                found: tokens,
            }),
        }
    }

    /// The pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Extracts the token a concrete code binds to this pattern's wildcard.
    #[must_use]
    pub fn extract_token<'a>(&self, code: &'a str) -> Option<&'a str> {
        let (domain, path) = split_code(code);
        if domain != self.domain {
            return None;
        }
        if path.len() < self.prefix.len() + self.suffix.len() {
            return None;
        }
        let token = path.strip_prefix(self.prefix.as_str())?.strip_suffix(self.suffix.as_str())?;
        Some(token)
    }

    /// Checks if a concrete code matches, ignoring allow-lists and classes.
    #[must_use]
    pub fn matches_code(&self, code: &str) -> bool {
        self.extract_token(code).is_some()
    }

    /// Builds the concrete code this pattern yields for `token`.
    #[must_use]
    pub fn concrete_code(&self, token: &str) -> String {
        if self.domain == BASE_DOMAIN && !self.raw.contains(':') {
            format!("{}{token}{}", self.prefix, self.suffix)
        } else {
            format!("{}:{}{token}{}", self.domain, self.prefix, self.suffix)
        }
    }
}

impl TryFrom<String> for WildcardPattern {
    type Error = WildcardError;

    fn try_from(value: String) -> WildcardResult<Self> {
        Self::parse(&value)
    }
}

impl From<WildcardPattern> for String {
    fn from(value: WildcardPattern) -> Self {
        value.raw
    }
}

impl std::fmt::Display for WildcardPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.raw)
    }
}

/// A pattern together with its optional allow-list and class filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WildcardMatcher {
    pattern: WildcardPattern,
    allowed: Option<Vec<String>>,
    class: ItemClass,
}

impl WildcardMatcher {
    /// Creates a matcher. The allow-list is sorted and deduplicated; an empty
    /// list means "no restriction".
    #[must_use]
    pub fn new(pattern: WildcardPattern, allowed: Option<Vec<String>>, class: ItemClass) -> Self {
        let allowed = allowed.and_then(|mut list| {
            list.sort();
            list.dedup();
            (!list.is_empty()).then_some(list)
        });
        Self {
            pattern,
            allowed,
            class,
        }
    }

    /// The underlying pattern.
    #[must_use]
    pub const fn pattern(&self) -> &WildcardPattern {
        &self.pattern
    }

    /// Sorted allow-list, if any.
    #[must_use]
    pub fn allowed(&self) -> Option<&[String]> {
        self.allowed.as_deref()
    }

    /// Required item class.
    #[must_use]
    pub const fn class(&self) -> ItemClass {
        self.class
    }

    /// Returns the token of `code` if it matches pattern and allow-list.
    #[must_use]
    pub fn token<'a>(&self, code: &'a str) -> Option<&'a str> {
        let token = self.pattern.extract_token(code)?;
        match &self.allowed {
            Some(list) if list.binary_search_by(|a| a.as_str().cmp(token)).is_err() => None,
            _ => Some(token),
        }
    }

    /// Checks a concrete identity against pattern, allow-list and class.
    #[must_use]
    pub fn matches(&self, code: &str, class: ItemClass) -> bool {
        class == self.class && self.token(code).is_some()
    }

    /// Narrows the allow-list to the single allowed value embedded in
    /// `desired`, if exactly one candidate can be found there.
    ///
    /// Used when checking a recipe against a specific target identity so the
    /// consumed variant agrees with the requested output.
    #[must_use]
    pub fn narrowed_to(&self, desired: &str) -> Self {
        let Some(list) = &self.allowed else {
            return self.clone();
        };
        match list.iter().find(|value| desired.contains(value.as_str())) {
            Some(hit) => Self {
                pattern: self.pattern.clone(),
                allowed: Some(vec![hit.clone()]),
                class: self.class,
            },
            None => self.clone(),
        }
    }

    /// Narrows to an explicit token.
    #[must_use]
    pub fn restricted_to(&self, token: &str) -> Self {
        Self {
            pattern: self.pattern.clone(),
            allowed: Some(vec![token.to_owned()]),
            class: self.class,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(pattern: &str, allowed: Option<&[&str]>, class: ItemClass) -> WildcardMatcher {
        WildcardMatcher::new(
            WildcardPattern::parse(pattern).expect("valid pattern"),
            allowed.map(|a| a.iter().map(|s| (*s).to_owned()).collect()),
            class,
        )
    }

    #[test]
    fn test_parse_rejects_token_counts() {
        assert!(matches!(
            WildcardPattern::parse("game:planks"),
            Err(WildcardError::TokenCount { found: 0, .. })
        ));
        assert!(matches!(
            WildcardPattern::parse("game:*-planks-*"),
            Err(WildcardError::TokenCount { found: 2, .. })
        ));
        assert!(matches!(
            WildcardPattern::parse("game:planks-{wood"),
            Err(WildcardError::Unterminated(_))
        ));
        assert!(matches!(
            WildcardPattern::parse("@game:planks-.*"),
            Err(WildcardError::Unsupported(_))
        ));
    }

    #[test]
    fn test_token_extraction() {
        let p = WildcardPattern::parse("game:plank-*-raw").expect("valid");
        assert_eq!(p.extract_token("game:plank-oak-raw"), Some("oak"));
        assert_eq!(p.extract_token("game:plank-oak"), None);
        assert_eq!(p.extract_token("mod:plank-oak-raw"), None);

        let named = WildcardPattern::parse("game:planks-{wood}").expect("valid");
        assert_eq!(named.extract_token("game:planks-birch"), Some("birch"));
        assert_eq!(named.concrete_code("birch"), "game:planks-birch");
    }

    #[test]
    fn test_unqualified_pattern_uses_base_domain() {
        let p = WildcardPattern::parse("planks-*").expect("valid");
        assert_eq!(p.extract_token("game:planks-oak"), Some("oak"));
        assert_eq!(p.extract_token("planks-oak"), Some("oak"));
    }

    #[test]
    fn test_allow_list_and_class() {
        let m = matcher("game:planks-*", Some(&["oak", "pine"]), ItemClass::Block);
        assert!(m.matches("game:planks-oak", ItemClass::Block));
        assert!(!m.matches("game:planks-oak", ItemClass::Item));
        assert!(!m.matches("game:planks-birch", ItemClass::Block));
        assert!(!m.matches("game:Planks-oak", ItemClass::Block));
    }

    #[test]
    fn test_empty_allow_list_is_unrestricted() {
        let m = matcher("game:planks-*", Some(&[]), ItemClass::Block);
        assert!(m.allowed().is_none());
        assert!(m.matches("game:planks-anything", ItemClass::Block));
    }

    #[test]
    fn test_narrowing_picks_variant_from_target() {
        let m = matcher("game:planks-*", Some(&["oak", "pine"]), ItemClass::Block);
        let narrowed = m.narrowed_to("game:bucket-pine");
        assert_eq!(narrowed.allowed(), Some(&["pine".to_owned()][..]));
        let unchanged = m.narrowed_to("game:bucket-birch");
        assert_eq!(unchanged.allowed().map(<[String]>::len), Some(2));
    }

    #[test]
    fn test_fill_template() {
        assert_eq!(fill_template("game:bucket-*", "oak"), "game:bucket-oak");
        assert_eq!(fill_template("game:door-{wood}-{wood}", "ash"), "game:door-ash-ash");
        assert_eq!(fill_template("game:bucket", "oak"), "game:bucket");
        assert!(is_pattern("game:bucket-{wood}"));
        assert!(!is_pattern("game:bucket"));
    }

    #[test]
    fn test_serde_uses_raw_string() {
        let p = WildcardPattern::parse("game:planks-*").expect("valid");
        let encoded = bincode::serialize(&p).expect("serialize");
        let decoded: WildcardPattern = bincode::deserialize(&encoded).expect("deserialize");
        assert_eq!(decoded, p);
    }
}
