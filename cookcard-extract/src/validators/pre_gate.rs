//! Pre-gate density heuristic
//!
//! Decides whether harvested source text is dense enough to justify a paid
//! text-LLM call. This is a pure cost-avoidance filter, not a correctness
//! filter: a false "sparse" costs recall, a false "dense" costs money.
//!
//! # Heuristics
//! 1. Minimum text length and token count
//! 2. Hashtag ratio: text that is mostly hashtags carries no ingredient list
//! 3. List structure: bullet markers or `N. ` numbering strongly suggest an
//!    ingredient list
//!
//! All checks are defensive against empty input: an empty token list is
//! itself "sparse", never a division by zero.

use cookcard_common::config::PreGateConfig;
use tracing::debug;

/// Density verdict for a block of harvested text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DensityVerdict {
    /// Worth a paid model call
    Dense,
    /// Too thin or too hashtag-heavy to succeed
    Sparse,
}

impl DensityVerdict {
    pub fn is_dense(&self) -> bool {
        matches!(self, DensityVerdict::Dense)
    }
}

/// Pre-gate heuristic evaluator
#[derive(Debug, Clone)]
pub struct PreGate {
    min_chars: usize,
    min_tokens: usize,
    max_hashtag_ratio: f32,
}

impl PreGate {
    pub fn new(config: &PreGateConfig) -> Self {
        Self {
            min_chars: config.min_chars,
            min_tokens: config.min_tokens,
            max_hashtag_ratio: config.max_hashtag_ratio,
        }
    }

    /// Assess text density
    pub fn assess(&self, text: &str) -> DensityVerdict {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return DensityVerdict::Sparse;
        }

        let tokens: Vec<&str> = trimmed.split_whitespace().collect();
        if tokens.is_empty() {
            return DensityVerdict::Sparse;
        }

        let hashtag_count = tokens.iter().filter(|t| t.starts_with('#')).count();
        let hashtag_ratio = hashtag_count as f32 / tokens.len() as f32;
        let has_list = trimmed.lines().any(is_list_line);

        debug!(
            chars = trimmed.len(),
            tokens = tokens.len(),
            hashtag_ratio,
            has_list,
            "Pre-gate assessment"
        );

        // List structure is a strong positive signal even for shortish text
        if has_list && trimmed.len() >= self.min_chars / 2 {
            return DensityVerdict::Dense;
        }

        if trimmed.len() < self.min_chars
            || tokens.len() < self.min_tokens
            || hashtag_ratio > self.max_hashtag_ratio
        {
            return DensityVerdict::Sparse;
        }

        DensityVerdict::Dense
    }
}

/// Whether a line looks like a list entry
///
/// Accepts bullet markers and `N. ` numbering. The numbering check requires
/// whitespace after the period so a bare decimal like "1.5" is not taken as
/// a list marker.
fn is_list_line(line: &str) -> bool {
    let line = line.trim_start();
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        return !rest.trim().is_empty();
    }

    let digits: String = line.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return false;
    }
    let rest = &line[digits.len()..];
    let mut chars = rest.chars();
    matches!(
        (chars.next(), chars.next()),
        (Some('.'), Some(c)) if c.is_whitespace()
    )
}

// ============================================================================
// Tests
// ============================================================================
