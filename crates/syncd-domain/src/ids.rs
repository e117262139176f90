use serde::{Deserialize, Serialize};

/// Stable ERP-side identifier for an order.
///
/// Always stored in canonical form: see [`canonicalize`]. Construct through
/// `InternalId::canonicalize`, never `InternalId(raw)` directly, or two
/// literal spellings of the same id ("10" vs "10.0") will be treated as
/// different records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InternalId(pub String);

impl InternalId {
    pub fn canonicalize(raw: impl AsRef<str>) -> Self {
        InternalId(canonicalize(raw.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque cloud-side identifier for a delivery, assigned on successful ADD.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExternalId(pub String);

impl ExternalId {
    pub fn new(s: impl Into<String>) -> Self {
        ExternalId(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coerces a numeric-looking id through `f64` -> `i64` truncation, falling
/// back to the trimmed raw string when it doesn't parse as a number.
///
/// This is the one canonicalization layer the whole core routes `internal_id`
/// values through: "10", "10.0" and 10 must all resolve to "10".
pub fn canonicalize(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.parse::<f64>() {
        Ok(n) => (n as i64).to_string(),
        Err(_) => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_integer_strings() {
        assert_eq!(canonicalize("10"), "10");
    }

    #[test]
    fn canonicalizes_float_strings_by_truncation() {
        assert_eq!(canonicalize("10.0"), "10");
        assert_eq!(canonicalize("623604.0"), "623604");
        assert_eq!(canonicalize("10.9"), "10");
    }

    #[test]
    fn falls_back_to_raw_string_for_non_numeric() {
        assert_eq!(canonicalize("ABC-1"), "ABC-1");
    }

    #[test]
    fn all_literal_forms_of_the_same_id_resolve_equal() {
        let forms = ["10", "10.0", "10.00"];
        let canon: Vec<_> = forms.iter().map(|s| canonicalize(s)).collect();
        assert!(canon.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn trims_whitespace_before_parsing() {
        assert_eq!(canonicalize("  42  "), "42");
    }
}
