// similarity.rs — Near-duplicate scoring for desire deduplication.
//
// Two desires about the same goal should reinforce one record, not spawn
// a second one. We score similarity with token-set Jaccard over the
// normalized title and description. Cheap, deterministic, and good enough
// to catch "learn Italian" vs "start learning the Italian language".

use std::collections::BTreeSet;

/// Crude suffix stripping so "learning" and "learn" count as one token.
/// Not a real stemmer; just enough for duplicate detection.
fn stem(token: &str) -> &str {
    if token.len() > 5 {
        if let Some(base) = token.strip_suffix("ing") {
            return base;
        }
    }
    if token.len() > 4 {
        if let Some(base) = token.strip_suffix("ed") {
            return base;
        }
    }
    if token.len() > 3 && !token.ends_with("ss") {
        if let Some(base) = token.strip_suffix('s') {
            return base;
        }
    }
    token
}

/// Lowercase, strip punctuation, split on whitespace, drop stopwords, stem.
fn tokens(text: &str) -> BTreeSet<String> {
    const STOPWORDS: &[&str] = &[
        "a", "an", "the", "to", "of", "in", "on", "for", "and", "or", "my", "i", "want", "start",
        "some", "with",
    ];

    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty() && !STOPWORDS.contains(t))
        .map(|t| stem(t).to_string())
        .collect()
}

/// Jaccard similarity of the token sets of two texts, in [0.0, 1.0].
///
/// Empty-token inputs score 0.0 against everything, including each other,
/// so degenerate desires never reinforce anything.
pub fn similarity(a: &str, b: &str) -> f64 {
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }

    let intersection = ta.intersection(&tb).count() as f64;
    let union = ta.union(&tb).count() as f64;
    intersection / union
}

/// Combined score over title and description, weighted toward the title.
pub fn desire_similarity(
    title_a: &str,
    description_a: &str,
    title_b: &str,
    description_b: &str,
) -> f64 {
    let title_score = similarity(title_a, title_b);
    let body_score = similarity(description_a, description_b);
    0.6 * title_score + 0.4 * body_score
}
