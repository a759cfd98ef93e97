// crates/core/src/question.rs
//! Question-identifier parsing.

/// Derive the numeric question index from an identifier like `"q1"`.
///
/// The non-numeric prefix is stripped and the remainder parsed as an
/// integer. Identifiers with no digits, digits followed by more text
/// (`"q1b"`), or no prefix at all yield `None` rather than a guess.
pub fn question_index(question_id: &str) -> Option<u32> {
    let first_digit = question_id.find(|c: char| c.is_ascii_digit())?;
    if first_digit == 0 {
        return None;
    }
    let rest = &question_id[first_digit..];
    if !rest.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    rest.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_standard_identifiers() {
        assert_eq!(question_index("q1"), Some(1));
        assert_eq!(question_index("q2"), Some(2));
        assert_eq!(question_index("q3"), Some(3));
        assert_eq!(question_index("question12"), Some(12));
    }

    #[test]
    fn rejects_malformed_identifiers() {
        assert_eq!(question_index("q"), None);
        assert_eq!(question_index(""), None);
        assert_eq!(question_index("1"), None);
        assert_eq!(question_index("q1b"), None);
        assert_eq!(question_index("intro"), None);
    }
}
