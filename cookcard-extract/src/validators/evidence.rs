//! Evidence validation
//!
//! The primary hallucination defense for the LLM tiers: a candidate
//! ingredient is accepted only if its evidence phrase occurs literally in
//! the harvested source text, after both sides are fraction-normalized so
//! that "½ cup" and "1/2 cup" compare equal.
//!
//! An empty source text is an explicit rejection (`EmptySourceText`), never
//! silently treated as valid.

/// Unicode vulgar fractions and their ASCII forms
const FRACTION_MAP: &[(char, &str)] = &[
    ('¼', "1/4"),
    ('½', "1/2"),
    ('¾', "3/4"),
    ('⅐', "1/7"),
    ('⅑', "1/9"),
    ('⅒', "1/10"),
    ('⅓', "1/3"),
    ('⅔', "2/3"),
    ('⅕', "1/5"),
    ('⅖', "2/5"),
    ('⅗', "3/5"),
    ('⅘', "4/5"),
    ('⅙', "1/6"),
    ('⅚', "5/6"),
    ('⅛', "1/8"),
    ('⅜', "3/8"),
    ('⅝', "5/8"),
    ('⅞', "7/8"),
];

/// Verdict for one candidate ingredient
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EvidenceVerdict {
    Valid,
    Rejected(RejectReason),
}

/// Why a candidate ingredient was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Source text was empty; nothing can be validated against it
    EmptySourceText,
    /// The candidate carried no evidence phrase at all
    MissingEvidence,
    /// The evidence phrase does not occur in the source text
    NotInSource,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::EmptySourceText => "empty_source_text",
            RejectReason::MissingEvidence => "missing_evidence",
            RejectReason::NotInSource => "not_in_source",
        }
    }
}

/// Normalize text for evidence comparison
///
/// Lowercases, maps unicode vulgar fractions to `n/m` form, and collapses
/// whitespace runs to single spaces.
pub fn normalize_fractions(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if let Some((_, ascii)) = FRACTION_MAP.iter().find(|(u, _)| *u == c) {
            // Keep the fraction separated from an adjacent whole number
            if out
                .chars()
                .last()
                .map(|p| p.is_ascii_digit())
                .unwrap_or(false)
            {
                out.push(' ');
            }
            out.push_str(ascii);
        } else {
            for lc in c.to_lowercase() {
                out.push(lc);
            }
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Check one candidate evidence phrase against the source text
pub fn check_evidence(evidence_phrase: Option<&str>, source_text: &str) -> EvidenceVerdict {
    let normalized_source = normalize_fractions(source_text);
    if normalized_source.is_empty() {
        return EvidenceVerdict::Rejected(RejectReason::EmptySourceText);
    }

    let phrase = match evidence_phrase {
        Some(p) if !p.trim().is_empty() => p,
        _ => return EvidenceVerdict::Rejected(RejectReason::MissingEvidence),
    };

    let normalized_phrase = normalize_fractions(phrase);
    if normalized_source.contains(&normalized_phrase) {
        EvidenceVerdict::Valid
    } else {
        EvidenceVerdict::Rejected(RejectReason::NotInSource)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_substring_is_valid() {
        let source = "Ingredients:\n- 2 cups flour\n- 1 tsp vanilla extract";
        assert_eq!(
            check_evidence(Some("2 cups flour"), source),
            EvidenceVerdict::Valid
        );
    }

    #[test]
    fn test_unicode_and_ascii_fractions_compare_equal() {
        let source = "You will need ½ cup sugar and 1½ sticks of butter";
        assert_eq!(
            check_evidence(Some("1/2 cup sugar"), source),
            EvidenceVerdict::Valid
        );
        assert_eq!(
            check_evidence(Some("1 1/2 sticks of butter"), source),
            EvidenceVerdict::Valid
        );
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        let source = "Add  2   CUPS    Heavy Cream slowly";
        assert_eq!(
            check_evidence(Some("2 cups heavy cream"), source),
            EvidenceVerdict::Valid
        );
    }

    #[test]
    fn test_hallucinated_ingredient_rejected() {
        let source = "- 2 cups flour\n- 1 cup sugar";
        assert_eq!(
            check_evidence(Some("3 tbsp truffle oil"), source),
            EvidenceVerdict::Rejected(RejectReason::NotInSource)
        );
    }

    #[test]
    fn test_empty_source_always_fails_never_panics() {
        assert_eq!(
            check_evidence(Some("2 cups flour"), ""),
            EvidenceVerdict::Rejected(RejectReason::EmptySourceText)
        );
        assert_eq!(
            check_evidence(None, "   "),
            EvidenceVerdict::Rejected(RejectReason::EmptySourceText)
        );
    }

    #[test]
    fn test_missing_evidence_rejected() {
        let source = "- 2 cups flour";
        assert_eq!(
            check_evidence(None, source),
            EvidenceVerdict::Rejected(RejectReason::MissingEvidence)
        );
        assert_eq!(
            check_evidence(Some("  "), source),
            EvidenceVerdict::Rejected(RejectReason::MissingEvidence)
        );
    }

    #[test]
    fn test_normalize_fractions_forms() {
        assert_eq!(normalize_fractions("½ cup"), "1/2 cup");
        assert_eq!(normalize_fractions("1½ cups"), "1 1/2 cups");
        assert_eq!(normalize_fractions("  Mixed   Case "), "mixed case");
    }
}
