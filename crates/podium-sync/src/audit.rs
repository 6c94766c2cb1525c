//! Consistency audit of a written dataset: per-sport counts and intra-day result order.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use podium_core::{CanonicalAthlete, DatasetDocument, NormalizedResult};
use serde::{Deserialize, Serialize};

use crate::results::stage_priority;

const ISSUE_PREVIEW_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIssue {
    pub federation_code: String,
    pub name: String,
    pub sport: String,
    /// `date|place|discipline` of the offending group.
    pub key: String,
    pub first_category: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AuditReport {
    pub athletes: usize,
    pub sports: BTreeMap<String, usize>,
    pub order_issue_count: usize,
    pub order_issues_preview: Vec<OrderIssue>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.order_issue_count == 0
    }
}

fn stage_text(result: &NormalizedResult) -> &str {
    result
        .category
        .as_deref()
        .or(result.discipline.as_deref())
        .unwrap_or_default()
}

fn is_qualification(result: &NormalizedResult) -> bool {
    stage_priority(stage_text(result)) == 0
}

fn group_key(result: &NormalizedResult) -> String {
    [
        result.date.as_str(),
        result.place.as_deref().unwrap_or_default(),
        result.discipline.as_deref().unwrap_or_default(),
    ]
    .join("|")
}

/// Groups results by `date|place|discipline`, keeping first-seen order.
fn grouped(results: &[NormalizedResult]) -> Vec<(String, Vec<&NormalizedResult>)> {
    let mut groups: Vec<(String, Vec<&NormalizedResult>)> = Vec::new();
    for result in results {
        let key = group_key(result);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, rows)) => rows.push(result),
            None => groups.push((key, vec![result])),
        }
    }
    groups
}

/// Only groups mixing qualification and main rows are checked. A group is out of
/// order when it opens with a qualification row or is not sorted by stage, then rank.
fn group_in_order(rows: &[&NormalizedResult]) -> bool {
    let has_qualification = rows.iter().any(|r| is_qualification(r));
    let has_main = rows.iter().any(|r| !is_qualification(r));
    if !has_qualification || !has_main {
        return true;
    }
    if is_qualification(rows[0]) {
        return false;
    }

    let mut order: Vec<usize> = (0..rows.len()).collect();
    order.sort_by_key(|&i| {
        (
            Reverse(stage_priority(stage_text(rows[i]))),
            rows[i].rank.unwrap_or(u32::MAX),
        )
    });
    order.iter().enumerate().all(|(pos, &i)| pos == i)
}

fn athlete_issues(athlete: &CanonicalAthlete) -> impl Iterator<Item = OrderIssue> + '_ {
    grouped(&athlete.recent_results)
        .into_iter()
        .filter(|(_, rows)| !group_in_order(rows))
        .map(move |(key, rows)| OrderIssue {
            federation_code: athlete.federation_code.clone(),
            name: athlete.local_name.clone(),
            sport: athlete.sport.key().to_string(),
            key,
            first_category: rows[0].category.clone().unwrap_or_default(),
        })
}

pub fn audit_dataset(document: &DatasetDocument) -> AuditReport {
    let mut sports = BTreeMap::new();
    let mut issues = Vec::new();
    for athlete in &document.athletes {
        *sports.entry(athlete.sport.key().to_string()).or_insert(0) += 1;
        issues.extend(athlete_issues(athlete));
    }

    let order_issue_count = issues.len();
    issues.truncate(ISSUE_PREVIEW_LIMIT);
    AuditReport {
        athletes: document.athletes.len(),
        sports,
        order_issue_count,
        order_issues_preview: issues,
    }
}
