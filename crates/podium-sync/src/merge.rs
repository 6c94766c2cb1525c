//! Identity merge: folds prior generations and the fresh profile into one record per athlete.

use std::collections::HashSet;

use podium_adapters::Generation;
use podium_core::{AthleteProfile, VintageRecord};
use tracing::warn;

/// Hangul compatibility jamo and precomposed syllables.
const NATIVE_SCRIPT_RANGES: [(char, char); 2] =
    [('\u{3131}', '\u{318E}'), ('\u{AC00}', '\u{D7A3}')];

pub fn is_native_script(text: &str) -> bool {
    text.chars().any(|c| {
        NATIVE_SCRIPT_RANGES
            .iter()
            .any(|(lo, hi)| (*lo..=*hi).contains(&c))
    })
}

fn fill_gap<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if slot.is_none() {
        slot.clone_from(incoming);
    }
}

fn take_present<T: Clone>(slot: &mut Option<T>, incoming: &Option<T>) {
    if incoming.is_some() {
        slot.clone_from(incoming);
    }
}

/// Merge `incoming` (lower trust) into `existing` (higher trust).
///
/// Present values are never cleared. Generic fields keep the first value seen; a
/// native-script local name outranks a romanized one regardless of trust order; sport
/// takes any non-empty incoming value.
pub fn merge_record(existing: &VintageRecord, incoming: &VintageRecord) -> VintageRecord {
    let mut out = existing.clone();

    fill_gap(&mut out.federation_code, &incoming.federation_code);
    fill_gap(&mut out.display_name, &incoming.display_name);
    fill_gap(&mut out.birth_date, &incoming.birth_date);
    fill_gap(&mut out.sport_label, &incoming.sport_label);
    fill_gap(&mut out.team, &incoming.team);
    fill_gap(&mut out.url, &incoming.url);
    fill_gap(&mut out.medals, &incoming.medals);

    if let Some(name) = &incoming.local_name {
        let upgrade = match &out.local_name {
            None => true,
            Some(current) => !is_native_script(current) && is_native_script(name),
        };
        if upgrade {
            out.local_name = Some(name.clone());
        }
    }

    if incoming.sport.is_some() {
        out.sport.clone_from(&incoming.sport);
    }

    out
}

/// Merged identity for one athlete of the current batch.
#[derive(Debug, Clone, PartialEq)]
pub struct MergedIdentity<'a> {
    pub federation_code: String,
    pub profile: &'a AthleteProfile,
    /// Generations only, before the fresh profile is folded in.
    pub prior: VintageRecord,
    pub merged: VintageRecord,
}

/// One identity per federation code of `profiles`, in batch order. Generations are
/// folded highest trust first, then the profile itself. Birth date and profile URL are
/// the exception: values fetched in this run win, generations only fill their gaps.
/// Athletes that only exist in older generations are not surfaced.
pub fn merge_identities<'a>(
    generations: &[Generation],
    profiles: &'a [AthleteProfile],
) -> Vec<MergedIdentity<'a>> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(profiles.len());

    for profile in profiles {
        let Some(code) = profile.federation_code.clone() else {
            warn!(url = ?profile.url, "profile without federation code skipped");
            continue;
        };
        if !seen.insert(code.clone()) {
            warn!(federation_code = %code, "duplicate profile in batch skipped");
            continue;
        }

        let prior = generations
            .iter()
            .filter_map(|generation| generation.get(&code))
            .fold(VintageRecord::default(), |acc, record| merge_record(&acc, record));
        let mut merged = merge_record(&prior, &VintageRecord::from(profile));
        take_present(&mut merged.birth_date, &profile.birth_date);
        take_present(&mut merged.url, &profile.url);

        out.push(MergedIdentity {
            federation_code: code,
            profile,
            prior,
            merged,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use podium_adapters::GenerationTable;
    use podium_core::MedalTally;

    fn record(code: &str) -> VintageRecord {
        VintageRecord {
            federation_code: Some(code.to_string()),
            ..Default::default()
        }
    }

    fn generation(label: &str, records: Vec<VintageRecord>) -> Generation {
        let table: GenerationTable = records
            .into_iter()
            .map(|r| (r.federation_code.clone().unwrap(), r))
            .collect();
        Generation::new(label, table)
    }

    fn profile(code: &str) -> AthleteProfile {
        AthleteProfile {
            federation_code: Some(code.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn detects_hangul() {
        assert!(is_native_script("김민지"));
        assert!(is_native_script("KIM 민지"));
        assert!(!is_native_script("KIM Minji"));
        assert!(!is_native_script(""));
    }

    #[test]
    fn lower_trust_native_name_beats_higher_trust_romanization() {
        let high = VintageRecord {
            local_name: Some("KIM Minji".into()),
            ..record("1")
        };
        let low = VintageRecord {
            local_name: Some("김민지".into()),
            ..record("1")
        };
        assert_eq!(merge_record(&high, &low).local_name.as_deref(), Some("김민지"));
    }

    #[test]
    fn equally_scripted_names_keep_first_in_trust_order() {
        let high = VintageRecord {
            local_name: Some("김민지".into()),
            ..record("1")
        };
        let low = VintageRecord {
            local_name: Some("김민자".into()),
            ..record("1")
        };
        assert_eq!(merge_record(&high, &low).local_name.as_deref(), Some("김민지"));

        let romanized_low = VintageRecord {
            local_name: Some("KIM M.".into()),
            ..record("1")
        };
        let romanized_high = VintageRecord {
            local_name: Some("KIM Minji".into()),
            ..record("1")
        };
        assert_eq!(
            merge_record(&romanized_high, &romanized_low).local_name.as_deref(),
            Some("KIM Minji")
        );
    }

    #[test]
    fn absent_incoming_fields_never_clear_present_ones() {
        let full = VintageRecord {
            local_name: Some("김민지".into()),
            display_name: Some("KIM Minji".into()),
            birth_date: Some("2004-02-11".into()),
            sport: Some("snowboard_park".into()),
            sport_label: Some("Snowboard Park".into()),
            team: Some("KOR".into()),
            url: Some("https://results.example.test/1".into()),
            medals: Some(MedalTally {
                gold: 1,
                silver: 0,
                bronze: 0,
            }),
            ..record("1")
        };
        assert_eq!(merge_record(&full, &VintageRecord::default()), full);
    }

    #[test]
    fn generic_fields_keep_first_non_empty_value() {
        let high = VintageRecord {
            team: Some("KOR".into()),
            ..record("1")
        };
        let low = VintageRecord {
            team: Some("USA".into()),
            birth_date: Some("2004-02-11".into()),
            ..record("1")
        };
        let merged = merge_record(&high, &low);
        assert_eq!(merged.team.as_deref(), Some("KOR"));
        assert_eq!(merged.birth_date.as_deref(), Some("2004-02-11"));
    }

    #[test]
    fn sport_is_overwritten_only_by_non_empty_values() {
        let high = VintageRecord {
            sport: Some("snowboard_park".into()),
            ..record("1")
        };
        let low = VintageRecord {
            sport: Some("snowboard_cross".into()),
            ..record("1")
        };
        assert_eq!(
            merge_record(&high, &low).sport.as_deref(),
            Some("snowboard_cross")
        );
        assert_eq!(
            merge_record(&high, &record("1")).sport.as_deref(),
            Some("snowboard_park")
        );
    }

    #[test]
    fn fold_surfaces_only_current_batch_athletes_in_batch_order() {
        let generations = vec![
            generation(
                "live",
                vec![VintageRecord {
                    local_name: Some("LEE Junho".into()),
                    ..record("2")
                }],
            ),
            generation(
                "previous",
                vec![
                    VintageRecord {
                        local_name: Some("이준호".into()),
                        team: Some("KOR".into()),
                        ..record("2")
                    },
                    record("9"),
                ],
            ),
        ];
        let profiles = vec![
            profile("2"),
            AthleteProfile {
                display_name: Some("New Athlete".into()),
                ..profile("3")
            },
            profile("2"),
            AthleteProfile::default(),
        ];

        let merged = merge_identities(&generations, &profiles);
        let codes: Vec<_> = merged.iter().map(|m| m.federation_code.as_str()).collect();
        assert_eq!(codes, vec!["2", "3"]);
        assert_eq!(merged[0].merged.local_name.as_deref(), Some("이준호"));
        assert_eq!(merged[0].merged.team.as_deref(), Some("KOR"));
        assert_eq!(merged[1].merged.display_name.as_deref(), Some("New Athlete"));
        assert_eq!(merged[1].prior, VintageRecord::default());
    }

    #[test]
    fn generations_win_generic_fields_over_the_fresh_profile() {
        let generations = vec![generation(
            "previous",
            vec![VintageRecord {
                display_name: Some("LEE Jun-ho".into()),
                ..record("2")
            }],
        )];
        let profiles = vec![AthleteProfile {
            display_name: Some("LEE Junho".into()),
            birth_date: Some("2001-03-04".into()),
            ..profile("2")
        }];

        let merged = merge_identities(&generations, &profiles);
        assert_eq!(merged[0].merged.display_name.as_deref(), Some("LEE Jun-ho"));
        assert_eq!(merged[0].merged.birth_date.as_deref(), Some("2001-03-04"));
    }

    #[test]
    fn fetched_birth_date_and_url_replace_generation_values() {
        let generations = vec![generation(
            "previous",
            vec![VintageRecord {
                birth_date: Some("1999-01-01".into()),
                url: Some("https://old.example/1".into()),
                team: Some("KOR".into()),
                ..record("1")
            }],
        )];
        let profiles = vec![AthleteProfile {
            birth_date: Some("2004-02-11".into()),
            url: Some("https://fresh.example/1".into()),
            ..profile("1")
        }];

        let merged = merge_identities(&generations, &profiles);
        assert_eq!(merged[0].merged.birth_date.as_deref(), Some("2004-02-11"));
        assert_eq!(merged[0].merged.url.as_deref(), Some("https://fresh.example/1"));
        assert_eq!(merged[0].prior.birth_date.as_deref(), Some("1999-01-01"));

        let sparse = vec![profile("1")];
        let merged = merge_identities(&generations, &sparse);
        assert_eq!(merged[0].merged.birth_date.as_deref(), Some("1999-01-01"));
        assert_eq!(merged[0].merged.url.as_deref(), Some("https://old.example/1"));
    }
}
