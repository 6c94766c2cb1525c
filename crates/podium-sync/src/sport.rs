//! Discipline-code to sport resolution.

use podium_core::{RawResult, SportKey};

/// The one source code that spans several discipline families.
pub const AMBIGUOUS_SNOWBOARD_CODE: &str = "SB";

pub const DEFAULT_SPORT: SportKey = SportKey::AlpineSkiing;
pub const DEFAULT_SNOWBOARD_SPORT: SportKey = SportKey::SnowboardPark;

const ALPINE_KEYWORDS: [&str; 4] = ["parallel giant", "parallel slalom", "giant slalom", "slalom"];
const PARK_KEYWORDS: [&str; 3] = ["halfpipe", "slopestyle", "big air"];

pub fn sport_for_code(code: &str) -> Option<SportKey> {
    match code.trim().to_ascii_uppercase().as_str() {
        "AL" => Some(SportKey::AlpineSkiing),
        "SX" => Some(SportKey::SkiCross),
        "MO" => Some(SportKey::FreestyleMoguls),
        "FS" => Some(SportKey::FreestylePark),
        "SB" => Some(SportKey::SnowboardPark),
        "SBX" => Some(SportKey::SnowboardCross),
        "PSL" => Some(SportKey::SnowboardAlpine),
        "JP" => Some(SportKey::SkiJumping),
        "CC" => Some(SportKey::CrossCountry),
        _ => None,
    }
}

/// Resolve the athlete's sport. The ambiguous snowboard code is narrowed with keywords
/// from the result texts; unknown or missing codes fall back to the prior generation.
pub fn resolve_sport(
    source_code: Option<&str>,
    results: &[RawResult],
    prior: Option<SportKey>,
) -> SportKey {
    let code = source_code.map(str::trim).unwrap_or_default();
    if !code.eq_ignore_ascii_case(AMBIGUOUS_SNOWBOARD_CODE) {
        return sport_for_code(code)
            .or(prior)
            .unwrap_or(DEFAULT_SPORT);
    }

    let blob = result_text_blob(results);
    if blob.contains("snowboard cross") {
        return SportKey::SnowboardCross;
    }
    if ALPINE_KEYWORDS.iter().any(|k| blob.contains(k)) {
        return SportKey::SnowboardAlpine;
    }
    if PARK_KEYWORDS.iter().any(|k| blob.contains(k)) {
        return SportKey::SnowboardPark;
    }
    prior.unwrap_or(DEFAULT_SNOWBOARD_SPORT)
}

fn result_text_blob(results: &[RawResult]) -> String {
    results
        .iter()
        .flat_map(|r| [r.discipline.as_deref(), r.category.as_deref()])
        .flatten()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" | ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(discipline: &str, category: &str) -> RawResult {
        RawResult {
            discipline: Some(discipline.to_string()),
            category: Some(category.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn fixed_codes_use_the_lookup_table() {
        assert_eq!(resolve_sport(Some("AL"), &[], None), SportKey::AlpineSkiing);
        assert_eq!(resolve_sport(Some("sbx"), &[], None), SportKey::SnowboardCross);
        assert_eq!(
            resolve_sport(Some("JP"), &[], Some(SportKey::CrossCountry)),
            SportKey::SkiJumping
        );
    }

    #[test]
    fn unknown_codes_fall_back_to_prior_then_default() {
        assert_eq!(
            resolve_sport(Some("XX"), &[], Some(SportKey::SkiCross)),
            SportKey::SkiCross
        );
        assert_eq!(resolve_sport(Some("XX"), &[], None), DEFAULT_SPORT);
        assert_eq!(resolve_sport(None, &[], None), DEFAULT_SPORT);
    }

    #[test]
    fn snowboard_cross_phrase_wins_first() {
        let results = [
            result("Snowboard Cross", "World Cup"),
            result("Parallel Giant Slalom", "World Cup"),
        ];
        assert_eq!(resolve_sport(Some("SB"), &results, None), SportKey::SnowboardCross);
    }

    #[test]
    fn alpine_keywords_beat_park_keywords() {
        let results = [result("Halfpipe", "FIS"), result("Slalom", "Europa Cup")];
        assert_eq!(resolve_sport(Some("SB"), &results, None), SportKey::SnowboardAlpine);
    }

    #[test]
    fn park_keywords_match_case_insensitively() {
        let results = [result("BIG AIR", "World Cup")];
        assert_eq!(resolve_sport(Some("SB"), &results, None), SportKey::SnowboardPark);
    }

    #[test]
    fn ambiguous_code_without_keywords_uses_prior_then_park() {
        let results = [result("Team Event", "National Championships")];
        assert_eq!(
            resolve_sport(Some("SB"), &results, Some(SportKey::SnowboardCross)),
            SportKey::SnowboardCross
        );
        assert_eq!(resolve_sport(Some("SB"), &[], None), SportKey::SnowboardPark);
    }
}
