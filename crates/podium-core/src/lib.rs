//! Core domain model for podium: raw profiles, vintage records and canonical athletes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod lenient;

pub const CRATE_NAME: &str = "podium-core";

/// A single competition result as delivered by the profile source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawResult {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub place: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub discipline: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_i64")]
    pub rank: Option<i64>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub rank_status: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub points: Option<f64>,
    #[serde(default, deserialize_with = "lenient::opt_f64")]
    pub cup_points: Option<f64>,
}

impl RawResult {
    /// Rank as a placement, if it is a positive integer.
    pub fn valid_rank(&self) -> Option<u32> {
        self.rank
            .filter(|rank| *rank > 0)
            .and_then(|rank| u32::try_from(rank).ok())
    }
}

/// Athlete profile as fetched by the external profile source. Never mutated after load.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AthleteProfile {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub federation_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub local_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub discipline_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub results: Vec<RawResult>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub url: Option<String>,
}

/// Output of one profile-source run: the fetched profiles plus counters the source keeps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawBatch {
    #[serde(default)]
    pub input_urls: usize,
    #[serde(default, deserialize_with = "lenient::seq")]
    pub profiles: Vec<AthleteProfile>,
    #[serde(default)]
    pub stats: serde_json::Value,
}

impl RawBatch {
    /// Fraction of requested profiles that were fetched; 0.0 when nothing was requested.
    pub fn success_rate(&self) -> f64 {
        if self.input_urls == 0 {
            return 0.0;
        }
        self.profiles.len() as f64 / self.input_urls as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MedalTally {
    #[serde(default)]
    pub gold: u32,
    #[serde(default)]
    pub silver: u32,
    #[serde(default)]
    pub bronze: u32,
}

/// Partially populated athlete record from one prior generation of the dataset.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VintageRecord {
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub federation_code: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub local_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub birth_date: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub sport: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub sport_label: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub team: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_string")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "lenient::opt_value")]
    pub medals: Option<MedalTally>,
}

impl From<&AthleteProfile> for VintageRecord {
    fn from(profile: &AthleteProfile) -> Self {
        Self {
            federation_code: profile.federation_code.clone(),
            local_name: profile.local_name.clone(),
            display_name: profile.display_name.clone(),
            birth_date: profile.birth_date.clone(),
            url: profile.url.clone(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SportKey {
    AlpineSkiing,
    SkiCross,
    FreestyleMoguls,
    FreestylePark,
    SnowboardPark,
    SnowboardCross,
    SnowboardAlpine,
    SkiJumping,
    CrossCountry,
}

impl SportKey {
    pub const ALL: [SportKey; 9] = [
        SportKey::AlpineSkiing,
        SportKey::SkiCross,
        SportKey::FreestyleMoguls,
        SportKey::FreestylePark,
        SportKey::SnowboardPark,
        SportKey::SnowboardCross,
        SportKey::SnowboardAlpine,
        SportKey::SkiJumping,
        SportKey::CrossCountry,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SportKey::AlpineSkiing => "alpine_skiing",
            SportKey::SkiCross => "ski_cross",
            SportKey::FreestyleMoguls => "freestyle_moguls",
            SportKey::FreestylePark => "freestyle_park",
            SportKey::SnowboardPark => "snowboard_park",
            SportKey::SnowboardCross => "snowboard_cross",
            SportKey::SnowboardAlpine => "snowboard_alpine",
            SportKey::SkiJumping => "ski_jumping",
            SportKey::CrossCountry => "cross_country",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SportKey::AlpineSkiing => "Alpine Skiing",
            SportKey::SkiCross => "Ski Cross",
            SportKey::FreestyleMoguls => "Moguls",
            SportKey::FreestylePark => "Freeski Park",
            SportKey::SnowboardPark => "Snowboard Park",
            SportKey::SnowboardCross => "Snowboard Cross",
            SportKey::SnowboardAlpine => "Snowboard Alpine",
            SportKey::SkiJumping => "Ski Jumping",
            SportKey::CrossCountry => "Cross Country",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim();
        Self::ALL.into_iter().find(|sport| sport.key() == key)
    }
}

/// A retained, ordered competition result of a canonical athlete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub date: String,
    pub event: String,
    pub rank: Option<u32>,
    pub rank_status: Option<String>,
    pub points: f64,
    pub place: Option<String>,
    pub category: Option<String>,
    pub discipline: Option<String>,
    pub cup_points: Option<f64>,
}

/// Merge output: one authoritative record per federation code for the current run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalAthlete {
    pub id: Uuid,
    pub federation_code: String,
    pub local_name: String,
    pub display_name: String,
    pub birth_date: Option<String>,
    pub birth_year: Option<i32>,
    pub age: Option<i32>,
    pub sport: SportKey,
    pub sport_label: String,
    pub team: String,
    pub url: Option<String>,
    pub current_rank: Option<u32>,
    pub best_rank: Option<u32>,
    pub season_starts: usize,
    pub medals: MedalTally,
    pub recent_results: Vec<NormalizedResult>,
}

impl CanonicalAthlete {
    /// Surrogate id derived from the federation code, so batch order never changes it.
    pub fn stable_id(federation_code: &str) -> Uuid {
        let name = format!("podium:athlete:{federation_code}");
        Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub last_updated: DateTime<Utc>,
    pub total_athletes: usize,
}

/// The produced dataset file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDocument {
    pub metadata: DatasetMetadata,
    pub athletes: Vec<CanonicalAthlete>,
}

impl DatasetDocument {
    pub fn new(athletes: Vec<CanonicalAthlete>, last_updated: DateTime<Utc>) -> Self {
        Self {
            metadata: DatasetMetadata {
                last_updated,
                total_athletes: athletes.len(),
            },
            athletes,
        }
    }
}
