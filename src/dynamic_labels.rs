//! Metric labels derived at runtime from free text (interface descriptions)
//! using an operator supplied regex with named capture groups.

use regex::Regex;

/// Labels every interface series carries ahead of the dynamic ones
pub const FIXED_KEYS: [&str; 4] = ["target", "name", "description", "mac"];

/// Prometheus label name: `[a-zA-Z_][a-zA-Z0-9_]*`, without the reserved
/// `__` prefix
fn is_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    valid && !name.starts_with("__")
}

/// Reject group names that cannot become labels next to [`FIXED_KEYS`]
pub fn check_keys(pattern: &Regex) -> Result<(), String> {
    for name in pattern.capture_names().flatten() {
        if !is_label_name(name) {
            return Err(format!("group {:?} is not a valid label name", name));
        }
        if FIXED_KEYS.contains(&name) {
            return Err(format!("group {:?} clashes with a fixed label", name));
        }
    }
    Ok(())
}

/// Ordered (label name, label value) pairs.
///
/// Names follow the declaration order of the named groups in the pattern,
/// so every call with the same pattern yields the same names in the same
/// order, whatever the input text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DynamicLabels {
    labels: Vec<(String, String)>,
}

impl DynamicLabels {
    /// Apply `pattern` to `text`. No pattern means no labels. Groups that do
    /// not participate in the match (or a pattern that does not match at
    /// all) produce empty values.
    pub fn parse(text: &str, pattern: Option<&Regex>) -> Self {
        let Some(re) = pattern else {
            return Self::default();
        };

        let captures = re.captures(text);
        let labels = re
            .capture_names()
            .flatten()
            .map(|name| {
                let value = captures
                    .as_ref()
                    .and_then(|c| c.name(name))
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default();
                (name.to_string(), value)
            })
            .collect();

        Self { labels }
    }

    /// Label names `pattern` produces, in order
    pub fn keys_for(pattern: Option<&Regex>) -> Vec<String> {
        pattern
            .map(|re| re.capture_names().flatten().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn values(&self) -> Vec<String> {
        self.labels.iter().map(|(_, v)| v.clone()).collect()
    }
}

#[cfg(test)]
impl DynamicLabels {
    pub fn keys(&self) -> Vec<String> {
        self.labels.iter().map(|(k, _)| k.clone()).collect()
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.labels
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern() -> Regex {
        Regex::new(r"(?:cid=(?P<a>\w+))?.*?(?:peer=(?P<b>\w+))?$").unwrap()
    }

    #[test]
    fn test_no_pattern_yields_no_labels() {
        let labels = DynamicLabels::parse("cid=42", None);
        assert!(labels.is_empty());
        assert!(DynamicLabels::keys_for(None).is_empty());
    }

    #[test]
    fn test_full_match() {
        let re = Regex::new(r"^(?P<kind>\w+): (?P<customer>\w+)").unwrap();
        let labels = DynamicLabels::parse("uplink: acme", Some(&re));
        assert_eq!(
            labels.pairs(),
            &[
                ("kind".to_string(), "uplink".to_string()),
                ("customer".to_string(), "acme".to_string())
            ]
        );
    }

    #[test]
    fn test_partial_match_keeps_cardinality_and_order() {
        let re = pattern();
        let labels = DynamicLabels::parse("cid=value", Some(&re));
        assert_eq!(labels.keys(), vec!["a", "b"]);
        assert_eq!(labels.values(), vec!["value", ""]);
    }

    #[test]
    fn test_no_match_yields_empty_values() {
        let re = Regex::new(r"^\[(?P<site>\w+)\] (?P<role>\w+)$").unwrap();
        let labels = DynamicLabels::parse("no brackets here", Some(&re));
        assert_eq!(labels.keys(), vec!["site", "role"]);
        assert_eq!(labels.values(), vec!["", ""]);
    }

    #[test]
    fn test_keys_are_stable_across_calls() {
        let re = pattern();
        let first = DynamicLabels::parse("peer=x", Some(&re));
        let second = DynamicLabels::parse("something else entirely", Some(&re));
        assert_eq!(first.keys(), second.keys());
        assert_eq!(first.keys(), DynamicLabels::keys_for(Some(&re)));
    }

    #[test]
    fn test_unnamed_groups_are_ignored() {
        let re = Regex::new(r"(\d+)-(?P<role>\w+)").unwrap();
        let labels = DynamicLabels::parse("12-core", Some(&re));
        assert_eq!(labels.keys(), vec!["role"]);
        assert_eq!(labels.values(), vec!["core"]);
    }

    #[test]
    fn test_check_keys() {
        let ok = Regex::new(r"^(?P<site>\w+)-(?P<_role2>\w+)").unwrap();
        assert!(check_keys(&ok).is_ok());

        for pattern in [
            r"(?P<name>\S+)",
            r"(?P<mac>\S+)",
            r"(?P<a.b>\w+)",
            r"(?P<a[0]>\w+)",
            r"(?P<__meta>\w+)",
        ] {
            let re = Regex::new(pattern).unwrap();
            assert!(check_keys(&re).is_err(), "{} should be rejected", pattern);
        }
    }
}
