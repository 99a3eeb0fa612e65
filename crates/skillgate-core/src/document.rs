//! Skill document helpers: metadata header parsing, header validation, slugs.
//!
//! A skill document may open with a YAML metadata header delimited by `---`
//! lines. Generated and repaired documents are required to open with one.

use serde::Serialize;

use crate::domain::HeaderError;

/// Every generated or repaired document must begin with this marker.
pub const REQUIRED_OPENING_MARKER: &str = "---";

/// Upper bound on the header `description` field.
pub const MAX_DESCRIPTION_CHARS: usize = 1024;

/// A document split into its raw header text and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitDocument<'a> {
    pub header: Option<&'a str>,
    pub body: &'a str,
}

/// Split off the metadata header, if the document opens with one.
///
/// Returns [`HeaderError::Unterminated`] when the opening `---` line is never
/// closed.
pub fn split_header(text: &str) -> Result<SplitDocument<'_>, HeaderError> {
    let Some(rest) = strip_marker_line(text) else {
        return Ok(SplitDocument {
            header: None,
            body: text,
        });
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        if line.trim_end() == REQUIRED_OPENING_MARKER {
            let header = rest[..offset].trim_end_matches(['\n', '\r']);
            return Ok(SplitDocument {
                header: Some(header),
                body: &rest[offset + line.len()..],
            });
        }
        offset += line.len();
    }
    Err(HeaderError::Unterminated)
}

fn strip_marker_line(text: &str) -> Option<&str> {
    let first_end = text.find('\n')?;
    if text[..first_end].trim_end() == REQUIRED_OPENING_MARKER {
        Some(&text[first_end + 1..])
    } else {
        None
    }
}

/// Parse the metadata header into a YAML mapping. `Ok(None)` when the
/// document has no header at all.
pub fn parse_header(text: &str) -> Result<Option<serde_yaml::Mapping>, HeaderError> {
    let split = split_header(text)?;
    let Some(raw) = split.header else {
        return Ok(None);
    };
    let value: serde_yaml::Value =
        serde_yaml::from_str(raw).map_err(|e| HeaderError::InvalidYaml(e.to_string()))?;
    match value {
        serde_yaml::Value::Mapping(map) => Ok(Some(map)),
        other => Err(HeaderError::NotAMapping {
            found: yaml_kind(&other).to_string(),
        }),
    }
}

fn yaml_kind(value: &serde_yaml::Value) -> &'static str {
    match value {
        serde_yaml::Value::Null => "null",
        serde_yaml::Value::Bool(_) => "bool",
        serde_yaml::Value::Number(_) => "number",
        serde_yaml::Value::String(_) => "string",
        serde_yaml::Value::Sequence(_) => "sequence",
        serde_yaml::Value::Mapping(_) => "mapping",
        serde_yaml::Value::Tagged(_) => "tagged value",
    }
}

// ---------------------------------------------------------------------------
// Header validation
// ---------------------------------------------------------------------------

/// Result of checking a document's header for publishability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HeaderCheck {
    pub name: Option<String>,
    pub problems: Vec<String>,
}

impl HeaderCheck {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check that the header exists and carries a usable `name` and `description`.
pub fn validate_header(text: &str) -> HeaderCheck {
    let mut problems = Vec::new();
    let map = match parse_header(text) {
        Ok(Some(map)) => map,
        Ok(None) => {
            problems.push("missing metadata header".to_string());
            return HeaderCheck { name: None, problems };
        }
        Err(e) => {
            problems.push(e.to_string());
            return HeaderCheck { name: None, problems };
        }
    };

    let name = map.get("name").and_then(|v| v.as_str()).map(str::to_string);
    match &name {
        None => problems.push("missing field: name".to_string()),
        Some(n) if !is_kebab_case(n) => {
            problems.push(format!("name must be kebab-case: {n}"));
        }
        Some(_) => {}
    }

    match map.get("description").and_then(|v| v.as_str()) {
        None => problems.push("missing field: description".to_string()),
        Some(desc) => {
            let chars = desc.chars().count();
            if chars > MAX_DESCRIPTION_CHARS {
                problems.push(format!(
                    "description too long: {chars} chars (max {MAX_DESCRIPTION_CHARS})"
                ));
            }
            if desc.contains('<') || desc.contains('>') {
                problems.push("description must not contain < or >".to_string());
            }
        }
    }

    HeaderCheck { name, problems }
}

fn is_kebab_case(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c.is_ascii_digit() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Lowercase the topic, replace anything outside `[a-z0-9-]` with `-`, and
/// trim leading/trailing dashes.
pub fn slugify(topic: &str) -> String {
    topic
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD: &str = "---\nname: stripe-checkout\ndescription: Accept payments with Stripe Checkout.\n---\n\n# Stripe\n";

    #[test]
    fn test_split_header_present() {
        let split = split_header(GOOD).unwrap();
        assert_eq!(
            split.header,
            Some("name: stripe-checkout\ndescription: Accept payments with Stripe Checkout.")
        );
        assert!(split.body.starts_with("\n# Stripe"));
    }

    #[test]
    fn test_split_header_absent() {
        let split = split_header("# Title\n\nbody").unwrap();
        assert!(split.header.is_none());
    }

    #[test]
    fn test_unterminated_header() {
        let err = split_header("---\nname: x\n# never closed\n").unwrap_err();
        assert!(matches!(err, HeaderError::Unterminated));
    }

    #[test]
    fn test_non_mapping_header() {
        let err = parse_header("---\n- a\n- b\n---\nbody").unwrap_err();
        match err {
            HeaderError::NotAMapping { found } => assert_eq!(found, "sequence"),
            other => panic!("expected NotAMapping, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_yaml_header() {
        let err = parse_header("---\nname: [unclosed\n---\nbody").unwrap_err();
        assert!(matches!(err, HeaderError::InvalidYaml(_)));
    }

    #[test]
    fn test_validate_header_ok() {
        let check = validate_header(GOOD);
        assert!(check.is_valid(), "{:?}", check.problems);
        assert_eq!(check.name.as_deref(), Some("stripe-checkout"));
    }

    #[test]
    fn test_validate_header_problems() {
        let doc = "---\nname: Stripe_Checkout\ndescription: uses <html>\n---\n";
        let check = validate_header(doc);
        assert_eq!(check.problems.len(), 2);
        assert!(check.problems[0].contains("kebab-case"));
        assert!(check.problems[1].contains("< or >"));

        let check = validate_header("no header here");
        assert_eq!(check.problems, vec!["missing metadata header".to_string()]);
    }

    #[test]
    fn test_validate_header_long_description() {
        let doc = format!("---\nname: a\ndescription: {}\n---\n", "x".repeat(1025));
        let check = validate_header(&doc);
        assert!(check.problems[0].contains("too long"));
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Stripe Checkout"), "stripe-checkout");
        assert_eq!(slugify("  Next.js "), "next-js");
        assert_eq!(slugify("AWS S3"), "aws-s3");
    }
}
