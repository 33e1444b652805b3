//! Normalized field-change lists for trigger conditions.
//!
//! A trigger can name fields whose change is relevant to the rule. Each
//! token is a field name, optionally prefixed with `+` to mark the change
//! as mandatory for the rule to match rather than merely relevant.

use std::fmt;
use std::str::FromStr;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

/// One field-name token, optionally marked mandatory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldChange {
    pub name: String,
    pub required: bool,
}

/// Whether a token is a valid field name: `[A-Za-z_][A-Za-z0-9_]*`.
fn is_valid_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

impl FromStr for FieldChange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let required = s.starts_with('+');
        let name = s.trim_start_matches('+');
        if !is_valid_field_name(name) {
            return Err(format!("Invalid field name: {}", s));
        }
        Ok(FieldChange {
            name: name.to_string(),
            required,
        })
    }
}

impl fmt::Display for FieldChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.required {
            write!(f, "+{}", self.name)
        } else {
            write!(f, "{}", self.name)
        }
    }
}

/// An ordered set of field-change tokens.
///
/// Built from a space-delimited string or from pre-split tokens. Invalid
/// and empty tokens are dropped silently; duplicate names keep the first
/// occurrence. An all-blank input collapses to the empty set.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FieldChanges(Vec<FieldChange>);

impl FieldChanges {
    /// Parse a space-delimited token list, e.g. `"title +body"`.
    pub fn parse(input: &str) -> Self {
        Self::from_tokens(input.split_whitespace())
    }

    /// Build from pre-split tokens, applying the same sanitization as
    /// [`FieldChanges::parse`].
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut out: Vec<FieldChange> = Vec::new();
        for token in tokens {
            let Ok(fc) = token.as_ref().trim().parse::<FieldChange>() else {
                continue;
            };
            if out.iter().any(|existing| existing.name == fc.name) {
                continue;
            }
            out.push(fc);
        }
        FieldChanges(out)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldChange> {
        self.0.iter()
    }

    /// The canonical token forms, `+`-prefixed where mandatory.
    pub fn tokens(&self) -> Vec<String> {
        self.0.iter().map(|fc| fc.to_string()).collect()
    }

    /// Check this set against the fields an event reports as changed.
    ///
    /// An empty set never constrains. Otherwise every mandatory field must
    /// appear in `changed`, and at least one listed field must appear.
    pub fn matches(&self, changed: &[String]) -> bool {
        if self.0.is_empty() {
            return true;
        }
        let contains = |name: &str| changed.iter().any(|c| c == name);
        let required_ok = self
            .0
            .iter()
            .filter(|fc| fc.required)
            .all(|fc| contains(&fc.name));
        let any_listed = self.0.iter().any(|fc| contains(&fc.name));
        required_ok && any_listed
    }
}

impl fmt::Display for FieldChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tokens().join(" "))
    }
}

// Persisted form is the token array embedded in a settings bag.
impl Serialize for FieldChanges {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.tokens().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for FieldChanges {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw: Vec<String> = Vec::deserialize(deserializer)?;
        Ok(FieldChanges::from_tokens(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mixed_tokens() {
        let fc = FieldChanges::parse("title +body junk!");
        assert_eq!(fc.tokens(), vec!["title", "+body"]);
    }

    #[test]
    fn test_parse_blank_collapses_to_empty() {
        assert!(FieldChanges::parse("").is_empty());
        assert!(FieldChanges::parse("   ").is_empty());
    }

    #[test]
    fn test_invalid_tokens_dropped_silently() {
        let fc = FieldChanges::parse("9lives e-mail ok_name +");
        assert_eq!(fc.tokens(), vec!["ok_name"]);
    }

    #[test]
    fn test_duplicates_keep_first_occurrence() {
        let fc = FieldChanges::parse("title +title body");
        assert_eq!(fc.tokens(), vec!["title", "body"]);
    }

    #[test]
    fn test_from_tokens_prebuilt_set() {
        let fc = FieldChanges::from_tokens(["+status", "summary"]);
        assert_eq!(fc.len(), 2);
        assert!(fc.iter().next().unwrap().required);
    }

    #[test]
    fn test_field_change_display_round_trip() {
        for token in ["title", "+body"] {
            let fc: FieldChange = token.parse().unwrap();
            assert_eq!(fc.to_string(), token);
        }
    }

    #[test]
    fn test_empty_set_matches_anything() {
        let fc = FieldChanges::default();
        assert!(fc.matches(&[]));
        assert!(fc.matches(&["anything".to_string()]));
    }

    #[test]
    fn test_required_field_must_change() {
        let fc = FieldChanges::parse("+status title");
        assert!(fc.matches(&["status".to_string()]));
        assert!(fc.matches(&["status".to_string(), "title".to_string()]));
        assert!(!fc.matches(&["title".to_string()]));
    }

    #[test]
    fn test_relevant_fields_need_at_least_one_change() {
        let fc = FieldChanges::parse("title body");
        assert!(fc.matches(&["body".to_string()]));
        assert!(!fc.matches(&["status".to_string()]));
        assert!(!fc.matches(&[]));
    }

    #[test]
    fn test_serde_round_trip() {
        let fc = FieldChanges::parse("title +body");
        let json = serde_json::to_string(&fc).unwrap();
        assert_eq!(json, r#"["title","+body"]"#);
        let rt: FieldChanges = serde_json::from_str(&json).unwrap();
        assert_eq!(fc, rt);
    }

    #[test]
    fn test_deserialize_sanitizes_stored_tokens() {
        let rt: FieldChanges = serde_json::from_str(r#"["title","bad token","+body"]"#).unwrap();
        assert_eq!(rt.tokens(), vec!["title", "+body"]);
    }

    #[test]
    fn test_display_joins_with_spaces() {
        let fc = FieldChanges::parse("title +body");
        assert_eq!(fc.to_string(), "title +body");
    }
}
