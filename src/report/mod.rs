pub mod format;
pub mod rules;

use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{Aggregate, Sample};
use chrono::{Days, Local, NaiveDate, NaiveTime, TimeZone};
use format::ReportRow;
use rules::{AliasRules, SubProgramRules};
use std::collections::HashMap;
use std::hash::Hash;

/// A raw sample or an aggregate, as far as reporting is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageRecord {
    pub timestamp_ms: i64,
    pub app_id: String,
    pub title: String,
    pub duration_ms: i64,
}

impl From<Sample> for UsageRecord {
    fn from(sample: Sample) -> Self {
        Self {
            timestamp_ms: sample.timestamp_ms,
            app_id: sample.app_id,
            title: sample.title,
            duration_ms: sample.duration_ms,
        }
    }
}

impl From<Aggregate> for UsageRecord {
    fn from(aggregate: Aggregate) -> Self {
        Self {
            timestamp_ms: aggregate.timestamp_ms,
            app_id: aggregate.app_id,
            title: aggregate.title,
            duration_ms: aggregate.duration_ms,
        }
    }
}

/// Inclusive range of epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub from_ms: i64,
    pub to_ms: i64,
}

impl TimeRange {
    /// Whole local days from `from` through `to`, each defaulting to `today`.
    pub fn from_dates(
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Self> {
        let from = from.unwrap_or(today);
        let to = to.unwrap_or(today);
        if from > to {
            return Err(AppError::InvalidInput {
                field: "from",
                reason: format!("{from} is after {to}"),
            });
        }

        let next_day = to.checked_add_days(Days::new(1)).ok_or_else(|| AppError::InvalidInput {
            field: "to",
            reason: format!("{to} is out of range"),
        })?;

        Ok(Self {
            from_ms: start_of_day(from)?,
            to_ms: start_of_day(next_day)? - 1,
        })
    }

    pub fn contains(&self, timestamp_ms: i64) -> bool {
        (self.from_ms..=self.to_ms).contains(&timestamp_ms)
    }
}

fn start_of_day(date: NaiveDate) -> Result<i64> {
    Local
        .from_local_datetime(&date.and_time(NaiveTime::MIN))
        .earliest()
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| AppError::InvalidInput {
            field: "date",
            reason: format!("midnight of {date} does not exist in the local time zone"),
        })
}

/// Raw samples followed by aggregates, both restricted to `range`.
///
/// Both tables are read in one snapshot, so a concurrent fold is seen either
/// before or after it committed, never in between.
pub fn load_usage(db: &Database, range: TimeRange) -> Result<Vec<UsageRecord>> {
    let (samples, aggregates) = db.usage_in_range(range.from_ms, range.to_ms)?;

    Ok(samples
        .into_iter()
        .map(UsageRecord::from)
        .chain(aggregates.into_iter().map(UsageRecord::from))
        .collect())
}

/// Sum durations per key.
pub fn fold_usage<K, F>(records: &[UsageRecord], mut key: F) -> HashMap<K, i64>
where
    K: Eq + Hash,
    F: FnMut(&UsageRecord) -> K,
{
    let mut totals = HashMap::new();
    for record in records {
        *totals.entry(key(record)).or_insert(0) += record.duration_ms;
    }
    totals
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    App,
    AppAndTitle,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UsageKey {
    pub app_id: String,
    /// Only set when grouping by window.
    pub title: Option<String>,
}

impl GroupBy {
    pub fn key(self, record: &UsageRecord) -> UsageKey {
        UsageKey {
            app_id: record.app_id.clone(),
            title: match self {
                Self::App => None,
                Self::AppAndTitle => Some(record.title.clone()),
            },
        }
    }
}

pub fn usage_by(records: &[UsageRecord], group: GroupBy) -> HashMap<UsageKey, i64> {
    fold_usage(records, |record| group.key(record))
}

/// Per-application rows, with sub-programs split out and aliases applied.
pub fn app_report(
    records: &[UsageRecord],
    subprograms: &SubProgramRules,
    aliases: &AliasRules,
) -> Vec<ReportRow> {
    fold_usage(records, |record| subprograms.resolve(&record.app_id, &record.title))
        .into_iter()
        .map(|(name, time_ms)| ReportRow::new(aliases.apply(&name), time_ms))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct DetailsFilter {
    pub app_id: String,
    /// Keep only titles containing this.
    pub title: Option<String>,
    /// Group titles after [`only_text`] normalization.
    pub only_text: bool,
}

/// Per-title rows for one application.
pub fn details_report(records: &[UsageRecord], filter: &DetailsFilter) -> Vec<ReportRow> {
    let matching: Vec<UsageRecord> = records
        .iter()
        .filter(|record| record.app_id == filter.app_id)
        .filter(|record| {
            filter
                .title
                .as_deref()
                .map_or(true, |part| record.title.contains(part))
        })
        .cloned()
        .collect();

    fold_usage(&matching, |record| {
        if filter.only_text {
            only_text(&record.title)
        } else {
            record.title.clone()
        }
    })
    .into_iter()
    .map(|(name, time_ms)| ReportRow::new(name, time_ms))
    .collect()
}

/// Drop digits, parentheses and dashes so counters like `(3)` or
/// `– 12 new` don't split one window into many rows.
pub fn only_text(title: &str) -> String {
    title
        .chars()
        .filter(|c| !c.is_ascii_digit() && !matches!(c, '(' | ')' | '–' | '-'))
        .collect::<String>()
        .trim_matches(' ')
        .to_string()
}
