use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::config::SeasonMatchConfig;

// "Season 2", "Stagione 2", "Stagioni 1-3"
static SEASON_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:seasons?|stagion[ei])[\s._]*0*(\d{1,2})(?:[\s._]*(?:-|to|/)[\s._]*0*(\d{1,2}))?\b")
        .unwrap()
});

// "S02", "S2", "S02E05", "S01-S03"
static SEASON_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bs0*(\d{1,2})(?:[\s._]*-[\s._]*s0*(\d{1,2}))?(?:e\d|\b)").unwrap()
});

static BARE_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b0*(\d{1,2})\b").unwrap());

static COMPLETENESS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:complete|completa|completo|integrale)\b").unwrap());

/// An inclusive span of seasons named explicitly in a title.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeasonSpan {
    pub first: u32,
    pub last: u32,
}

impl SeasonSpan {
    pub fn contains(&self, season: u32) -> bool {
        (self.first..=self.last).contains(&season)
    }
}

/// Every explicit season token ("Season N", localized forms, "SNN") in `title`.
pub fn explicit_seasons(title: &str) -> Vec<SeasonSpan> {
    SEASON_WORD
        .captures_iter(title)
        .chain(SEASON_TOKEN.captures_iter(title))
        .filter_map(|caps| {
            let first: u32 = caps.get(1)?.as_str().parse().ok()?;
            let last = caps
                .get(2)
                .and_then(|m| m.as_str().parse().ok())
                .filter(|last| *last >= first)
                .unwrap_or(first);
            Some(SeasonSpan { first, last })
        })
        .collect()
}

/// Permissive season relevance test for thread titles.
///
/// Accepts, in order: an explicit season token naming the season; an isolated
/// number equal to it (if enabled); a completeness marker when the title names
/// no season at all (if enabled). False positives are preferred to false
/// negatives because reconciliation narrows results later.
#[derive(Debug, Clone, Copy, Default)]
pub struct SeasonMatcher {
    config: SeasonMatchConfig,
}

impl SeasonMatcher {
    pub fn new(config: SeasonMatchConfig) -> Self {
        Self { config }
    }

    pub fn matches(&self, title: &str, season: u32) -> bool {
        let spans = explicit_seasons(title);
        if spans.iter().any(|span| span.contains(season)) {
            return true;
        }

        if self.config.bare_number
            && BARE_NUMBER
                .captures_iter(title)
                .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
                .any(|n| n == season)
        {
            return true;
        }

        spans.is_empty() && self.config.completeness_markers && COMPLETENESS.is_match(title)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strict() -> SeasonMatcher {
        SeasonMatcher::new(SeasonMatchConfig {
            bare_number: false,
            completeness_markers: false,
        })
    }

    #[test]
    fn test_explicit_season_words() {
        let matcher = SeasonMatcher::default();
        assert!(matcher.matches("The Expanse - Season 3 [1080p]", 3));
        assert!(matcher.matches("Gomorra Stagione 2 ITA", 2));
        assert!(matcher.matches("Il Commissario Montalbano Stagioni 1-4", 3));
        assert!(!strict().matches("The Expanse - Season 3 [1080p]", 4));
    }

    #[test]
    fn test_s_notation_with_and_without_zero() {
        let matcher = strict();
        assert!(matcher.matches("Fargo S02 720p", 2));
        assert!(matcher.matches("Fargo S2 720p", 2));
        assert!(matcher.matches("Fargo S02E05", 2));
        assert!(matcher.matches("Fargo S01-S03 Pack", 2));
        assert!(!matcher.matches("Fargo S02E05", 5));
    }

    #[test]
    fn test_bare_number_is_configurable() {
        assert!(SeasonMatcher::default().matches("Skam Italia 4 [WEBRip]", 4));
        assert!(!strict().matches("Skam Italia 4 [WEBRip]", 4));
        // 1080 is not an isolated season number
        assert!(!SeasonMatcher::default().matches("Show 1080p", 10));
    }

    #[test]
    fn test_completeness_only_without_explicit_season() {
        let matcher = SeasonMatcher::default();
        assert!(matcher.matches("Show Name Serie Completa", 7));
        // explicit token for another season suppresses the completeness fallback
        assert!(!matcher.matches("Show Name Season 1 Complete", 2));

        let no_markers = SeasonMatcher::new(SeasonMatchConfig {
            bare_number: true,
            completeness_markers: false,
        });
        assert!(!no_markers.matches("Show Name Serie Completa", 7));
    }

    #[test]
    fn test_explicit_seasons_spans() {
        assert_eq!(
            explicit_seasons("Stagioni 1-3"),
            vec![SeasonSpan { first: 1, last: 3 }]
        );
        assert_eq!(
            explicit_seasons("Show S04E01"),
            vec![SeasonSpan { first: 4, last: 4 }]
        );
        assert!(explicit_seasons("Show Name").is_empty());
    }
}
