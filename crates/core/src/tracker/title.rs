use std::collections::HashSet;

const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "of", "in", "on", "at", "to", "for", "with", "by", "il", "la",
    "lo", "le", "gli", "i", "un", "una", "di", "da", "del", "della", "e", "serie", "season",
    "stagione", "complete", "completa",
];

fn words(title: &str) -> HashSet<String> {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .split_whitespace()
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

/// Loose series-title comparison: word overlap after dropping punctuation and
/// stop words. At least one shared word and a shared/largest ratio of 0.3.
pub fn titles_match(a: &str, b: &str) -> bool {
    let left = words(a);
    let right = words(b);
    if left.is_empty() || right.is_empty() {
        return false;
    }

    let common = left.intersection(&right).count();
    let largest = left.len().max(right.len());
    common >= 1 && common as f64 / largest as f64 >= 0.3
}
