// Fuzzy text similarity for OCR matching, scores in [0, 1].
use similar::TextDiff;

/// Lowercase, trimmed, inner whitespace collapsed to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Character-level diff ratio: `2 * matched / (len(a) + len(b))`.
pub fn ratio(a: &str, b: &str) -> f32 {
    TextDiff::from_chars(a, b).ratio()
}

/// Best ratio of the shorter string against every equally long window of the longer one.
pub fn partial_ratio(a: &str, b: &str) -> f32 {
    let (short, long) = if a.chars().count() <= b.chars().count() { (a, b) } else { (b, a) };
    let short_len = short.chars().count();
    if short_len == 0 {
        return if long.is_empty() { 1.0 } else { 0.0 };
    }

    let long: Vec<char> = long.chars().collect();
    let mut best = 0.0f32;
    for window in long.windows(short_len) {
        let window: String = window.iter().collect();
        best = best.max(ratio(short, &window));
        if best >= 1.0 {
            break;
        }
    }
    best
}

/// Ratio after sorting whitespace-separated tokens.
pub fn token_sort_ratio(a: &str, b: &str) -> f32 {
    let sorted = |s: &str| {
        let mut tokens: Vec<&str> = s.split_whitespace().collect();
        tokens.sort_unstable();
        tokens.join(" ")
    };
    ratio(&sorted(a), &sorted(b))
}

/// Best of [`ratio`], [`partial_ratio`] and [`token_sort_ratio`] over the normalized strings.
pub fn similarity(a: &str, b: &str) -> f32 {
    let a = normalize(a);
    let b = normalize(b);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    ratio(&a, &b)
        .max(partial_ratio(&a, &b))
        .max(token_sort_ratio(&a, &b))
        .clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_case_and_space() {
        assert_eq!(normalize("  Sign   IN\t"), "sign in");
    }

    #[test]
    fn misread_character_scores_by_plain_ratio() {
        // "m" read as "rn": five of six characters survive.
        let s = similarity("Submit", "Subrnit");
        assert!((s - 10.0 / 13.0).abs() < 1e-6, "got {s}");
    }

    #[test]
    fn identical_text_scores_one() {
        assert_eq!(similarity("Sign In", "sign  in"), 1.0);
    }

    #[test]
    fn contained_text_scores_full_partial_ratio() {
        assert_eq!(similarity("Submit", "Submit Assignment Now"), 1.0);
        assert_eq!(similarity("Submit", "Submi"), 1.0);
    }

    #[test]
    fn short_target_in_long_label_keeps_partial_score() {
        let partial = partial_ratio("save", "click sav to keep all your changes");
        assert!((partial - 0.75).abs() < 1e-6, "got {partial}");
        assert_eq!(similarity("save", "click sav to keep all your changes"), partial);
    }

    #[test]
    fn reordered_tokens_match() {
        assert_eq!(token_sort_ratio("learning machine", "machine learning"), 1.0);
        assert_eq!(similarity("Learning Machine", "Machine Learning"), 1.0);
    }

    #[test]
    fn unrelated_text_scores_low() {
        assert!(similarity("Submit", "Cancel") < 0.6);
        assert_eq!(similarity("", "Cancel"), 0.0);
    }

    #[test]
    fn partial_ratio_finds_best_window() {
        assert_eq!(partial_ratio("abc", "xxabcxx"), 1.0);
        assert_eq!(partial_ratio("", "abc"), 0.0);
    }
}
