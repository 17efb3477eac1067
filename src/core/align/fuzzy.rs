//! Classic fuzzy-string scores (ratio / partial ratio / token-sort ratio /
//! token-set ratio), built on `strsim`'s Levenshtein distance, plus the
//! "compact form" fallback surface used when all four scores miss the
//! threshold on the full string.

use std::sync::LazyLock;
use regex::Regex;

static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^[:alnum:]]").unwrap());

/// Strip every non-alphanumeric character, used as a secondary fuzzy-match
/// surface when scoring on the full string falls short of the threshold.
pub fn compact_form(s: &str) -> String {
    NON_ALNUM.replace_all(s, "").to_lowercase()
}

/// Levenshtein-distance-based similarity ratio in `[0, 100]`.
pub fn ratio(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 100.0;
    }
    let dist = strsim::levenshtein(a, b);
    (1.0 - dist as f64 / max_len as f64) * 100.0
}

/// Best ratio of `shorter` against any same-length window of `longer`;
/// order-independent (the caller may pass either argument first).
pub fn partial_ratio(a: &str, b: &str) -> f64 {
    let (shorter, longer) = if a.chars().count() <= b.chars().count() {
        (a, b)
    } else {
        (b, a)
    };
    let shorter_chars: Vec<char> = shorter.chars().collect();
    let longer_chars: Vec<char> = longer.chars().collect();
    if shorter_chars.is_empty() {
        return if longer_chars.is_empty() { 100.0 } else { 0.0 };
    }
    if longer_chars.len() <= shorter_chars.len() {
        return ratio(shorter, longer);
    }

    let window = shorter_chars.len();
    let mut best = 0.0f64;
    for start in 0..=(longer_chars.len() - window) {
        let slice: String = longer_chars[start..start + window].iter().collect();
        let score = ratio(shorter, &slice);
        if score > best {
            best = score;
        }
        if best >= 100.0 {
            break;
        }
    }
    best
}

fn sorted_tokens(s: &str) -> String {
    let mut tokens: Vec<&str> = s.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Ratio of the whitespace-sorted token sequences of both strings.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    ratio(&sorted_tokens(a), &sorted_tokens(b))
}

/// Token-set ratio: compares the intersection and symmetric differences of
/// the token sets, taking the best of three comparisons (a classic
/// fuzzy-string technique for handling word reordering plus insertions).
pub fn token_set_ratio(a: &str, b: &str) -> f64 {
    use std::collections::BTreeSet;

    let set_a: BTreeSet<&str> = a.split_whitespace().collect();
    let set_b: BTreeSet<&str> = b.split_whitespace().collect();

    let intersection: Vec<&str> = set_a.intersection(&set_b).copied().collect();
    let only_a: Vec<&str> = set_a.difference(&set_b).copied().collect();
    let only_b: Vec<&str> = set_b.difference(&set_a).copied().collect();

    let sorted_join = |tokens: &[&str]| -> String {
        let mut v: Vec<&str> = tokens.to_vec();
        v.sort_unstable();
        v.join(" ")
    };

    let t0 = sorted_join(&intersection);
    let t1 = if t0.is_empty() {
        sorted_join(&only_a)
    } else {
        format!("{} {}", t0, sorted_join(&only_a)).trim().to_string()
    };
    let t2 = if t0.is_empty() {
        sorted_join(&only_b)
    } else {
        format!("{} {}", t0, sorted_join(&only_b)).trim().to_string()
    };

    ratio(&t0, &t1).max(ratio(&t0, &t2)).max(ratio(&t1, &t2))
}

/// Maximum of the four classic fuzzy scores, with an automatic fallback to
/// the compact form (non-alphanumeric stripped) when the full-string score
/// misses `threshold`.
pub fn best_score(a: &str, b: &str, threshold: f64) -> f64 {
    let direct = ratio(a, b)
        .max(partial_ratio(a, b))
        .max(token_sort_ratio(a, b))
        .max(token_set_ratio(a, b));
    if direct >= threshold {
        return direct;
    }
    let ca = compact_form(a);
    let cb = compact_form(b);
    if ca.is_empty() || cb.is_empty() {
        return direct;
    }
    direct.max(
        ratio(&ca, &cb)
            .max(partial_ratio(&ca, &cb))
            .max(token_sort_ratio(&ca, &cb))
            .max(token_set_ratio(&ca, &cb)),
    )
}
