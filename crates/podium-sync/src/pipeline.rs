//! Processing run: raw batch + generations -> canonical dataset and health report.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use podium_adapters::{load_generations_from_registry, load_raw_batch, Generation};
use podium_core::{AthleteProfile, CanonicalAthlete, DatasetDocument, SportKey};
use podium_storage::write_json_atomic;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::freshness::{summarize_freshness, FreshnessReport};
use crate::merge::{is_native_script, merge_identities, MergedIdentity};
use crate::results::normalize_results;
use crate::sport::resolve_sport;

const UNKNOWN_NAME: &str = "Unknown";

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub raw_batch_path: PathBuf,
    pub vintages_path: PathBuf,
    pub output_path: PathBuf,
    pub health_output_path: PathBuf,
    pub stale_threshold_days: i64,
    pub strict_min_success_rate: f64,
    pub default_team: String,
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        Self {
            raw_batch_path: std::env::var("PODIUM_RAW_BATCH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/raw/profiles.json")),
            vintages_path: std::env::var("PODIUM_VINTAGES")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("vintages.yaml")),
            output_path: std::env::var("PODIUM_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/athletes.json")),
            health_output_path: std::env::var("PODIUM_HEALTH_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data/cache/logs/pipeline_health_latest.json")),
            stale_threshold_days: std::env::var("PODIUM_STALE_THRESHOLD_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            strict_min_success_rate: std::env::var("PODIUM_STRICT_MIN_SUCCESS_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(1.0),
            default_team: std::env::var("PODIUM_DEFAULT_TEAM")
                .unwrap_or_else(|_| "KOR".to_string()),
        }
    }
}

/// Leading four-digit year of a birth date and the age it implies in `current_year`.
pub fn birth_year_and_age(
    birth_date: Option<&str>,
    current_year: i32,
) -> (Option<i32>, Option<i32>) {
    let year = birth_date
        .filter(|d| d.len() >= 4)
        .and_then(|d| d.split('-').next())
        .and_then(|y| y.trim().parse::<i32>().ok());
    (year, year.map(|y| current_year - y))
}

fn canonical_athlete(
    identity: &MergedIdentity<'_>,
    now: DateTime<Utc>,
    default_team: &str,
) -> CanonicalAthlete {
    let profile: &AthleteProfile = identity.profile;
    let merged = &identity.merged;

    let prior_sport = identity.prior.sport.as_deref().and_then(SportKey::from_key);
    let sport = resolve_sport(profile.discipline_code.as_deref(), &profile.results, prior_sport);
    let sport_label = match (&merged.sport_label, prior_sport) {
        (Some(label), Some(prior)) if prior == sport => label.clone(),
        _ => sport.label().to_string(),
    };

    let display_name = merged
        .display_name
        .clone()
        .unwrap_or_else(|| UNKNOWN_NAME.to_string());
    // A romanized local name is no better than the display name.
    let local_name = match &merged.local_name {
        Some(name) if is_native_script(name) => name.clone(),
        other => merged
            .display_name
            .clone()
            .or_else(|| other.clone())
            .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
    };

    let (birth_year, age) = birth_year_and_age(merged.birth_date.as_deref(), now.year());
    let ranked = normalize_results(&profile.results);

    CanonicalAthlete {
        id: CanonicalAthlete::stable_id(&identity.federation_code),
        federation_code: identity.federation_code.clone(),
        local_name,
        display_name,
        birth_date: merged.birth_date.clone(),
        birth_year,
        age,
        sport,
        sport_label,
        team: merged
            .team
            .clone()
            .unwrap_or_else(|| default_team.to_string()),
        url: merged.url.clone(),
        current_rank: ranked.current_rank,
        best_rank: ranked.best_rank,
        season_starts: ranked.season_starts,
        medals: merged.medals.unwrap_or_default(),
        recent_results: ranked.results,
    }
}

/// One canonical athlete per federation code of the batch, in batch order.
pub fn build_canonical_athletes(
    profiles: &[AthleteProfile],
    generations: &[Generation],
    now: DateTime<Utc>,
    default_team: &str,
) -> Vec<CanonicalAthlete> {
    merge_identities(generations, profiles)
        .iter()
        .map(|identity| canonical_athlete(identity, now, default_team))
        .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub generated_at: DateTime<Utc>,
    pub raw_batch_path: String,
    pub input_urls: usize,
    pub scraped_profiles: usize,
    pub success_rate: f64,
    pub fetch_stats: serde_json::Value,
    pub freshness: FreshnessReport,
    pub output_path: String,
    pub strict_min_success_rate: f64,
    pub passed: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessSummary {
    pub athletes: usize,
    pub success_rate: f64,
    pub passed: bool,
    pub stale_athletes: usize,
    pub output_path: PathBuf,
    pub health_path: PathBuf,
}

/// Builds and writes the dataset and health report. A failed success-rate gate is
/// reported through `passed`; the dataset is written either way.
pub async fn run_process(config: &PipelineConfig, now: DateTime<Utc>) -> Result<ProcessSummary> {
    let batch = load_raw_batch(&config.raw_batch_path)?;
    let generations = load_generations_from_registry(&config.vintages_path);
    info!(
        profiles = batch.profiles.len(),
        input_urls = batch.input_urls,
        generations = generations.len(),
        "processing raw batch"
    );

    let athletes =
        build_canonical_athletes(&batch.profiles, &generations, now, &config.default_team);
    let document = DatasetDocument::new(athletes, now);
    write_json_atomic(&config.output_path, &document)
        .await
        .context("writing dataset document")?;
    info!(
        athletes = document.metadata.total_athletes,
        path = %config.output_path.display(),
        "dataset written"
    );

    let freshness = summarize_freshness(
        &document.athletes,
        config.stale_threshold_days,
        now.date_naive(),
    );
    let success_rate = batch.success_rate();
    let passed = success_rate >= config.strict_min_success_rate;
    let health = HealthReport {
        generated_at: now,
        raw_batch_path: display_path(&config.raw_batch_path),
        input_urls: batch.input_urls,
        scraped_profiles: batch.profiles.len(),
        success_rate,
        fetch_stats: batch.stats.clone(),
        freshness,
        output_path: display_path(&config.output_path),
        strict_min_success_rate: config.strict_min_success_rate,
        passed,
    };
    write_json_atomic(&config.health_output_path, &health)
        .await
        .context("writing health report")?;

    if !passed {
        warn!(
            success_rate,
            minimum = config.strict_min_success_rate,
            "fetch success rate below strict threshold"
        );
    }

    Ok(ProcessSummary {
        athletes: document.metadata.total_athletes,
        success_rate,
        passed,
        stale_athletes: health.freshness.stale_athletes_count,
        output_path: config.output_path.clone(),
        health_path: config.health_output_path.clone(),
    })
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
