//! Candidate torrents and confidence scoring.
//!
//! The score is a weighted blend of token-set (Jaccard) similarity between
//! the candidate and the requested book, adjusted by format, category, and
//! swarm health. Selection downstream trusts it as a total order, so every
//! function here is pure.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::acquisition::TARGET_FORMAT;

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Weight of the title similarity in the blend.
pub const TITLE_WEIGHT: f64 = 0.7;
/// Weight of the author similarity in the blend.
pub const AUTHOR_WEIGHT: f64 = 0.3;
/// Bonus when the candidate's declared format is [`TARGET_FORMAT`].
pub const FORMAT_BONUS: f64 = 0.1;
/// Bonus when the tracker category is an ebook category.
pub const CATEGORY_BONUS: f64 = 0.1;
/// Multiplier applied when nobody is seeding.
pub const NO_SEEDERS_PENALTY: f64 = 0.5;
/// Multiplier applied when fewer than [`FEW_SEEDERS_THRESHOLD`] are seeding.
pub const FEW_SEEDERS_PENALTY: f64 = 0.8;
pub const FEW_SEEDERS_THRESHOLD: i32 = 3;

// ---------------------------------------------------------------------------
// Candidate
// ---------------------------------------------------------------------------

/// One torrent returned by a tracker search.
///
/// Produced fresh on every search and never mutated afterwards; the
/// orchestrator keeps a serialized snapshot for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub title: String,
    pub author: String,
    /// Total size in bytes.
    pub size: i64,
    pub seeders: i32,
    pub leechers: i32,
    pub download_url: String,
    /// Lowercase declared file type, e.g. `epub`.
    pub format: String,
    /// Tracker category label, e.g. `Ebooks - Fantasy`.
    pub category: String,
    pub confidence_score: f64,
}

impl Candidate {
    /// Return a copy scored against the requested book.
    pub fn scored(mut self, query_title: &str, query_author: &str) -> Self {
        self.confidence_score = confidence_score(&self, query_title, query_author);
        self
    }
}

// ---------------------------------------------------------------------------
// Scoring
// ---------------------------------------------------------------------------

/// Split `s` into a set of lowercase alphanumeric tokens.
pub fn tokenize(s: &str) -> HashSet<String> {
    s.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Jaccard similarity of the token sets of `a` and `b`.
///
/// Two empty sets have similarity 0, not 1: an empty field carries no
/// evidence of a match.
pub fn jaccard_similarity(a: &str, b: &str) -> f64 {
    let ta = tokenize(a);
    let tb = tokenize(b);
    let union = ta.union(&tb).count();
    if union == 0 {
        return 0.0;
    }
    ta.intersection(&tb).count() as f64 / union as f64
}

fn is_ebook_category(category: &str) -> bool {
    let lower = category.to_lowercase();
    lower.contains("ebook") || lower.contains("e-book")
}

/// Confidence in [0, 1] that `candidate` is the requested book.
pub fn confidence_score(candidate: &Candidate, query_title: &str, query_author: &str) -> f64 {
    let mut score = TITLE_WEIGHT * jaccard_similarity(&candidate.title, query_title)
        + AUTHOR_WEIGHT * jaccard_similarity(&candidate.author, query_author);

    if candidate.format.trim().eq_ignore_ascii_case(TARGET_FORMAT) {
        score += FORMAT_BONUS;
    }
    if is_ebook_category(&candidate.category) {
        score += CATEGORY_BONUS;
    }

    if candidate.seeders <= 0 {
        score *= NO_SEEDERS_PENALTY;
    } else if candidate.seeders < FEW_SEEDERS_THRESHOLD {
        score *= FEW_SEEDERS_PENALTY;
    }

    score.clamp(0.0, 1.0)
}

/// Ordering used for selection: higher score first, then more seeders.
pub fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    b.confidence_score
        .total_cmp(&a.confidence_score)
        .then_with(|| b.seeders.cmp(&a.seeders))
}

/// Sort candidates best-first in place.
pub fn rank_candidates(candidates: &mut [Candidate]) {
    candidates.sort_by(compare_candidates);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(title: &str, author: &str, seeders: i32) -> Candidate {
        Candidate {
            id: "1".to_string(),
            title: title.to_string(),
            author: author.to_string(),
            size: 1024,
            seeders,
            leechers: 0,
            download_url: "https://tracker.example/tor/download.php?tid=1".to_string(),
            format: "epub".to_string(),
            category: "Ebooks - Science Fiction".to_string(),
            confidence_score: 0.0,
        }
    }

    #[test]
    fn tokenize_lowercases_and_splits_punctuation() {
        let tokens = tokenize("Dune: Messiah (Book 2)");
        let expected: HashSet<String> = ["dune", "messiah", "book", "2"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(tokens, expected);
    }

    #[test]
    fn jaccard_identical_is_one() {
        assert_eq!(jaccard_similarity("Frank Herbert", "frank herbert"), 1.0);
    }

    #[test]
    fn jaccard_partial_overlap() {
        // {dune, messiah} vs {dune} -> 1 / 2
        assert_eq!(jaccard_similarity("Dune Messiah", "Dune"), 0.5);
    }

    #[test]
    fn jaccard_empty_sets_are_zero() {
        assert_eq!(jaccard_similarity("", ""), 0.0);
        assert_eq!(jaccard_similarity("---", "Dune"), 0.0);
    }

    #[test]
    fn perfect_match_is_clamped_to_one() {
        // 0.7 + 0.3 + 0.1 + 0.1 = 1.2 before clamping.
        let c = candidate("Dune", "Frank Herbert", 10);
        assert_eq!(confidence_score(&c, "Dune", "Frank Herbert"), 1.0);
    }

    #[test]
    fn zero_seeders_halves_the_score() {
        let mut c = candidate("Dune", "Someone Else", 0);
        c.format = "pdf".to_string();
        c.category = "Audiobooks".to_string();
        // title only: 0.7 * 1.0 = 0.7, halved.
        let score = confidence_score(&c, "Dune", "Frank Herbert");
        assert!((score - 0.35).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn few_seeders_applies_reduced_penalty() {
        let mut c = candidate("Dune", "Someone Else", 2);
        c.format = "pdf".to_string();
        c.category = "Audiobooks".to_string();
        let score = confidence_score(&c, "Dune", "Frank Herbert");
        assert!((score - 0.56).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn format_and_category_bonuses() {
        let mut c = candidate("Dune Messiah", "Nobody", 5);
        // title 0.5 * 0.7 = 0.35, + 0.1 format + 0.1 category
        let with_bonus = confidence_score(&c, "Dune", "Frank Herbert");
        assert!((with_bonus - 0.55).abs() < 1e-9, "got {with_bonus}");

        c.format = "mobi".to_string();
        c.category = "Comics".to_string();
        let without = confidence_score(&c, "Dune", "Frank Herbert");
        assert!((without - 0.35).abs() < 1e-9, "got {without}");
    }

    #[test]
    fn score_is_deterministic_and_in_range() {
        let inputs = [
            candidate("Dune", "Frank Herbert", 10),
            candidate("", "", 0),
            candidate("Completely Different", "Other Person", 1),
            candidate("Dune Dune Dune", "Herbert", 100),
        ];
        for c in &inputs {
            let a = confidence_score(c, "Dune", "Frank Herbert");
            let b = confidence_score(c, "Dune", "Frank Herbert");
            assert_eq!(a, b);
            assert!((0.0..=1.0).contains(&a), "score out of range: {a}");
        }
    }

    #[test]
    fn ranking_sorts_by_score_descending() {
        let mut list = vec![
            candidate("Unrelated", "Nobody", 10).scored("Dune", "Frank Herbert"),
            candidate("Dune", "Frank Herbert", 10).scored("Dune", "Frank Herbert"),
            candidate("Dune Messiah", "Frank Herbert", 10).scored("Dune", "Frank Herbert"),
        ];
        rank_candidates(&mut list);
        let titles: Vec<_> = list.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["Dune", "Dune Messiah", "Unrelated"]);
    }

    #[test]
    fn ranking_breaks_ties_by_seeders() {
        let mut low = candidate("Dune", "Frank Herbert", 4);
        let mut high = candidate("Dune", "Frank Herbert", 40);
        low.confidence_score = 0.9;
        high.confidence_score = 0.9;
        let mut list = vec![low, high];
        rank_candidates(&mut list);
        assert_eq!(list[0].seeders, 40);
        assert_eq!(list[1].seeders, 4);
    }
}
