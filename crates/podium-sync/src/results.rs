//! Result filtering, intra-day ordering and ranking summary.

use std::cmp::Reverse;

use podium_core::{NormalizedResult, RawResult};

const FALLBACK_EVENT_LABEL: &str = "Result";

/// Ordered results plus the ranking summary derived from them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RankedResults {
    pub results: Vec<NormalizedResult>,
    pub current_rank: Option<u32>,
    pub best_rank: Option<u32>,
    pub season_starts: usize,
}

/// Qualification 0, unrecognized 1, final 2: finals sort ahead of qualifiers on a date.
pub fn stage_priority(text: &str) -> u8 {
    let t = text.trim().to_lowercase();
    if t.contains("qualif") || t == "qua" {
        0
    } else if t.contains("final") {
        2
    } else {
        1
    }
}

fn rank_score(result: &RawResult) -> i64 {
    match result.valid_rank() {
        Some(rank) => -i64::from(rank),
        None => i64::MIN,
    }
}

fn stage_text(result: &RawResult) -> &str {
    result
        .category
        .as_deref()
        .or(result.discipline.as_deref())
        .unwrap_or_default()
}

pub fn normalize_results(raw: &[RawResult]) -> RankedResults {
    let mut dated: Vec<(&str, &RawResult)> = raw
        .iter()
        .filter_map(|r| r.date.as_deref().map(|date| (date, r)))
        .collect();
    dated.sort_by_key(|(date, r)| Reverse((*date, stage_priority(stage_text(r)), rank_score(r))));

    let season_starts = dated.len();
    let results: Vec<NormalizedResult> = dated
        .into_iter()
        .filter(|(_, r)| r.valid_rank().is_some() || r.rank_status.is_some())
        .map(|(date, r)| NormalizedResult {
            date: date.to_string(),
            event: r
                .discipline
                .clone()
                .or_else(|| r.category.clone())
                .unwrap_or_else(|| FALLBACK_EVENT_LABEL.to_string()),
            rank: r.valid_rank(),
            rank_status: r.rank_status.clone(),
            points: r.points.unwrap_or(0.0),
            place: r.place.clone(),
            category: r.category.clone(),
            discipline: r.discipline.clone(),
            cup_points: r.cup_points,
        })
        .collect();

    let current_rank = results.iter().find_map(|r| r.rank);
    let best_rank = results.iter().filter_map(|r| r.rank).min();

    RankedResults {
        results,
        current_rank,
        best_rank,
        season_starts,
    }
}
