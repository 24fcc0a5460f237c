//! Name similarity scores for the bulk suggestion pass.

use super::naming::normalize_identifier;
use crate::config::ResolverConfig;
use crate::models::MappingCandidate;
use std::cmp::Ordering;

/// A target table or field offered as a match.
#[derive(Debug, Clone, Copy)]
pub struct NameCandidate<'a> {
    pub id: i64,
    pub name: &'a str,
    pub display_name: &'a str,
}

/// Score how well `source` names the candidate, or `None` if it does not.
pub fn score_name(source: &str, name: &str, display_name: &str) -> Option<f64> {
    if source.eq_ignore_ascii_case(name) {
        return Some(ResolverConfig::EXACT_NAME_SCORE);
    }
    if !display_name.is_empty() && source.eq_ignore_ascii_case(display_name) {
        return Some(ResolverConfig::DISPLAY_NAME_SCORE);
    }

    let source_norm = normalize_identifier(source);
    if source_norm.is_empty() {
        return None;
    }
    let name_norm = normalize_identifier(name);
    let display_norm = normalize_identifier(display_name);
    if source_norm == name_norm || (!display_norm.is_empty() && source_norm == display_norm) {
        return Some(ResolverConfig::NORMALIZED_NAME_SCORE);
    }

    let overlaps = |other: &str| {
        other.len() >= ResolverConfig::MIN_SUBSTRING_LEN
            && source_norm.len() >= ResolverConfig::MIN_SUBSTRING_LEN
            && (other.contains(source_norm.as_str()) || source_norm.contains(other))
    };
    if overlaps(&name_norm) || overlaps(&display_norm) {
        return Some(ResolverConfig::SUBSTRING_SCORE);
    }

    None
}

/// Rank candidates best-first and keep the top few.
///
/// `identical_bonus` is added for ranking when the candidate's name is
/// byte-identical to `source`; stored scores never exceed 1.0.
pub fn rank_candidates<'a>(
    source: &str,
    candidates: impl IntoIterator<Item = NameCandidate<'a>>,
    identical_bonus: f64,
) -> Vec<MappingCandidate> {
    let mut scored: Vec<(f64, NameCandidate<'a>)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let score = score_name(source, candidate.name, candidate.display_name)?;
            let bonus = if candidate.name == source {
                identical_bonus
            } else {
                0.0
            };
            Some((score + bonus, candidate))
        })
        .collect();

    scored.sort_by(|(a_score, a), (b_score, b)| {
        b_score
            .partial_cmp(a_score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });

    scored
        .into_iter()
        .take(ResolverConfig::MAX_ALTERNATIVES)
        .map(|(score, candidate)| MappingCandidate {
            target_id: candidate.id,
            target_name: candidate.name.to_string(),
            score: score.min(1.0),
        })
        .collect()
}
