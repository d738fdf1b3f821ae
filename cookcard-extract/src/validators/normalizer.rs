//! Ingredient normalizer
//!
//! Runs after evidence validation for both the text-LLM and video-vision
//! tiers. Both paths get identical treatment: normalized name, optional
//! canonical-catalog reference, parsed amount/unit, section labels, and a
//! dense zero-based position re-index. Downstream consumers rely on every
//! non-lite ingredient carrying all of these fields regardless of which
//! tier produced it.

use crate::models::Ingredient;
use crate::validators::evidence::normalize_fractions;
use once_cell::sync::Lazy;
use strsim::jaro_winkler;
use tracing::{debug, warn};

/// Minimum Jaro-Winkler similarity for a canonical-catalog link
const CANONICAL_MATCH_THRESHOLD: f64 = 0.92;

/// Compact canonical-ingredient catalog (id, display name)
///
/// Catalog maintenance is out of scope; this seed list covers the common
/// pantry staples well enough to exercise the linkage path.
static CANONICAL_CATALOG: Lazy<Vec<(&'static str, &'static str)>> = Lazy::new(|| {
    vec![
        ("ing_flour", "flour"),
        ("ing_sugar", "sugar"),
        ("ing_brown_sugar", "brown sugar"),
        ("ing_butter", "butter"),
        ("ing_egg", "egg"),
        ("ing_milk", "milk"),
        ("ing_heavy_cream", "heavy cream"),
        ("ing_olive_oil", "olive oil"),
        ("ing_garlic", "garlic"),
        ("ing_onion", "onion"),
        ("ing_salt", "salt"),
        ("ing_black_pepper", "black pepper"),
        ("ing_chicken_thigh", "chicken thigh"),
        ("ing_chicken_breast", "chicken breast"),
        ("ing_soy_sauce", "soy sauce"),
        ("ing_vinegar", "vinegar"),
        ("ing_tomato", "tomato"),
        ("ing_basil", "basil"),
        ("ing_parmesan", "parmesan"),
        ("ing_pasta", "pasta"),
        ("ing_rice", "rice"),
        ("ing_salsa", "salsa"),
        ("ing_pesto", "pesto"),
        ("ing_lemon", "lemon"),
        ("ing_lime", "lime"),
        ("ing_ginger", "ginger"),
        ("ing_honey", "honey"),
        ("ing_vanilla_extract", "vanilla extract"),
        ("ing_baking_powder", "baking powder"),
        ("ing_baking_soda", "baking soda"),
    ]
});

/// Units recognized when parsing a leading quantity
const UNITS: &[&str] = &[
    "cups", "cup", "tablespoons", "tablespoon", "tbsp", "teaspoons", "teaspoon", "tsp", "ounces",
    "ounce", "oz", "pounds", "pound", "lbs", "lb", "grams", "gram", "g", "kilograms", "kg",
    "milliliters", "ml", "liters", "liter", "l", "cloves", "clove", "sticks", "stick", "pinch",
    "cans", "can", "bunch", "slices", "slice", "head",
];

/// Normalize validated candidates into final card ingredients
///
/// - section-header lines become section labels on the ingredients that
///   follow them and are removed from the list
/// - every ingredient gets a normalized name, optional canonical link, and
///   parsed amount/unit when the extractor left them unset
/// - position indices are re-assigned densely from zero
pub fn normalize_ingredients(candidates: Vec<Ingredient>) -> Vec<Ingredient> {
    let mut out = Vec::with_capacity(candidates.len());
    let mut current_section: Option<String> = None;

    for mut ingredient in candidates {
        let trimmed = ingredient.name.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }

        if looks_like_section_header(&trimmed) {
            let label = trimmed.trim_end_matches(':').trim().to_string();
            // A generic sauce name ("salsa", "pesto") can collide with the
            // section-header heuristic. Keep it as an ingredient and log the
            // collision so its frequency can be monitored.
            if let Some((id, name)) = canonical_match(&normalize_name(&label)) {
                warn!(
                    label = %label,
                    canonical = name,
                    "Section-header candidate matches canonical ingredient; keeping as ingredient"
                );
                ingredient.name = label.clone();
                ingredient.normalized_name = normalize_name(&label);
                ingredient.canonical_id = Some(id.to_string());
                ingredient.section = current_section.clone();
                ingredient.confidence = ingredient.confidence.clamp(0.0, 1.0);
                out.push(ingredient);
            } else {
                debug!(section = %label, "Section header");
                current_section = Some(label);
            }
            continue;
        }

        let normalized = normalize_name(&trimmed);
        if normalized.is_empty() {
            continue;
        }

        if ingredient.amount.is_none() {
            let (amount, unit) = parse_leading_quantity(&trimmed);
            ingredient.amount = amount;
            if ingredient.unit.is_none() {
                ingredient.unit = unit;
            }
        }

        ingredient.canonical_id = canonical_match(&normalized).map(|(id, _)| id.to_string());
        ingredient.normalized_name = normalized;
        ingredient.confidence = ingredient.confidence.clamp(0.0, 1.0);
        if ingredient.section.is_none() {
            ingredient.section = current_section.clone();
        }
        out.push(ingredient);
    }

    // Dense zero-based re-index after drops and section removal
    for (i, ingredient) in out.iter_mut().enumerate() {
        ingredient.position = i;
    }
    out
}

/// Normalize an ingredient name: lowercase, fraction-normalize, strip any
/// leading quantity/unit and trailing preparation clause
pub fn normalize_name(raw: &str) -> String {
    let lowered = normalize_fractions(raw);
    // Drop a trailing ", chopped"-style preparation clause
    let base = lowered.split(',').next().unwrap_or(&lowered);
    // Drop parentheticals
    let base = base.split('(').next().unwrap_or(base).trim();

    let mut tokens: Vec<&str> = base.split_whitespace().collect();
    // Strip leading quantity tokens ("2", "1/2", "1.5") and a unit after them
    let mut stripped_amount = false;
    while let Some(first) = tokens.first() {
        if is_numeric_token(first) {
            tokens.remove(0);
            stripped_amount = true;
        } else {
            break;
        }
    }
    if stripped_amount {
        if let Some(first) = tokens.first() {
            if UNITS.contains(first) {
                tokens.remove(0);
            }
        }
        if tokens.first() == Some(&"of") {
            tokens.remove(0);
        }
    }

    tokens
        .join(" ")
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

/// Parse a leading "2 1/2 cups" style quantity from a raw ingredient line
fn parse_leading_quantity(raw: &str) -> (Option<f64>, Option<String>) {
    let normalized = normalize_fractions(raw);
    let mut tokens = normalized.split_whitespace().peekable();

    let mut amount: Option<f64> = None;
    while let Some(&tok) = tokens.peek() {
        match numeric_value(tok) {
            Some(v) => {
                amount = Some(amount.unwrap_or(0.0) + v);
                tokens.next();
            }
            None => break,
        }
    }

    let unit = match (amount, tokens.peek()) {
        (Some(_), Some(&tok)) if UNITS.contains(&tok) => Some(tok.to_string()),
        _ => None,
    };

    (amount, unit)
}

/// Closest canonical-catalog entry at or above the similarity threshold
fn canonical_match(normalized_name: &str) -> Option<(&'static str, &'static str)> {
    if normalized_name.is_empty() {
        return None;
    }
    CANONICAL_CATALOG
        .iter()
        .map(|(id, name)| (*id, *name, jaro_winkler(normalized_name, name)))
        .filter(|(_, _, score)| *score >= CANONICAL_MATCH_THRESHOLD)
        .max_by(|a, b| a.2.total_cmp(&b.2))
        .map(|(id, name, _)| (id, name))
}

/// Section-header heuristic: trailing colon, or a short all-caps line
fn looks_like_section_header(line: &str) -> bool {
    let trimmed = line.trim();
    if trimmed.ends_with(':') && !trimmed.chars().any(|c| c.is_ascii_digit()) {
        return true;
    }
    let words: Vec<&str> = trimmed.split_whitespace().collect();
    !words.is_empty()
        && words.len() <= 4
        && trimmed.chars().filter(|c| c.is_alphabetic()).count() >= 3
        && trimmed
            .chars()
            .filter(|c| c.is_alphabetic())
            .all(|c| c.is_uppercase())
}

fn is_numeric_token(tok: &str) -> bool {
    numeric_value(tok).is_some()
}

/// Numeric value of "2", "1.5", or "1/2"; None otherwise
fn numeric_value(tok: &str) -> Option<f64> {
    if let Some((num, den)) = tok.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    tok.parse::<f64>().ok()
}

// ============================================================================
// Tests
// ============================================================================
