//! Dataset-wide recency statistics and per-athlete staleness.

use chrono::NaiveDate;
use podium_core::CanonicalAthlete;
use serde::{Deserialize, Serialize};

const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleAthlete {
    pub federation_code: String,
    pub name: String,
    pub latest_result_date: NaiveDate,
    pub age_days: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessReport {
    pub max_event_date: Option<NaiveDate>,
    pub min_latest_per_athlete: Option<NaiveDate>,
    pub athletes_with_results: usize,
    pub total_events: usize,
    pub stale_threshold_days: i64,
    pub stale_athletes_count: usize,
    /// Oldest first.
    pub stale_athletes: Vec<StaleAthlete>,
}

pub fn parse_event_date(text: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(text.trim(), DATE_FORMAT).ok()
}

/// Reporting only; staleness never fails a run.
pub fn summarize_freshness(
    athletes: &[CanonicalAthlete],
    stale_threshold_days: i64,
    today: NaiveDate,
) -> FreshnessReport {
    let mut max_event_date: Option<NaiveDate> = None;
    let mut min_latest: Option<NaiveDate> = None;
    let mut athletes_with_results = 0usize;
    let mut total_events = 0usize;
    let mut stale_athletes = Vec::new();

    for athlete in athletes {
        let Some(latest) = athlete
            .recent_results
            .iter()
            .filter_map(|r| parse_event_date(&r.date))
            .inspect(|_| total_events += 1)
            .max()
        else {
            continue;
        };

        athletes_with_results += 1;
        max_event_date = max_event_date.max(Some(latest));
        min_latest = Some(min_latest.map_or(latest, |current| current.min(latest)));

        let age_days = (today - latest).num_days();
        if age_days > stale_threshold_days {
            stale_athletes.push(StaleAthlete {
                federation_code: athlete.federation_code.clone(),
                name: athlete.display_name.clone(),
                latest_result_date: latest,
                age_days,
            });
        }
    }

    stale_athletes.sort_by(|a, b| b.age_days.cmp(&a.age_days));

    FreshnessReport {
        max_event_date,
        min_latest_per_athlete: min_latest,
        athletes_with_results,
        total_events,
        stale_threshold_days,
        stale_athletes_count: stale_athletes.len(),
        stale_athletes,
    }
}
