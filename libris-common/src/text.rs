//! Text normalization shared by catalog matching
//!
//! Author names and book titles are compared through a normalized key:
//! case-folded with runs of whitespace collapsed to a single space.
//! Stored values keep their original casing.

/// Trim and collapse every run of whitespace into a single space
pub fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized matching key: case-folded, whitespace collapsed
pub fn normalize_key(value: &str) -> String {
    collapse_whitespace(value).to_lowercase()
}

/// Title-case each whitespace separated word ("ursula k. le guin" -> "Ursula K. Le Guin")
///
/// Hyphenated and apostrophe parts keep the casing rule per word, so
/// "o'brien" becomes "O'brien". Good enough for matching, which case-folds anyway.
pub fn title_case(value: &str) -> String {
    collapse_whitespace(value)
        .split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first
                    .to_uppercase()
                    .chain(chars.flat_map(|c| c.to_lowercase()))
                    .collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// Matching key for an author name: title-cased, then normalized
///
/// Every path that looks up or creates an author goes through this, so the
/// run-scoped cache and the `authors.normalized_name` column always agree.
pub fn author_match_key(name: &str) -> String {
    normalize_key(&title_case(name))
}
