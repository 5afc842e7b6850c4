//! Default identifier generation for entity primary keys.
//!
//! # Invariants
//! - Generated identifiers are hyphenated, lowercase UUID v4 strings.
//! - Every call returns a fresh value.

use uuid::Uuid;

/// Returns a new UUID v4 rendered as a string.
pub fn generate() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::generate;
    use uuid::Uuid;

    #[test]
    fn generate_returns_parseable_v4_uuid() {
        let id = generate();
        let parsed = Uuid::parse_str(&id).expect("generated id should parse");
        assert_eq!(parsed.get_version_num(), 4);
        assert_eq!(id, id.to_lowercase());
    }

    #[test]
    fn generate_never_repeats() {
        assert_ne!(generate(), generate());
    }
}
