// Mood trend summary built from recent mood entries

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::db::MoodEntry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyMood {
    pub date: String,
    pub dominant: String,
    pub entries: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MoodSummary {
    pub total_entries: usize,
    pub counts: BTreeMap<String, usize>,
    pub dominant: Option<String>,
    /// Oldest day first
    pub daily: Vec<DailyMood>,
}

// Highest count wins; ties go to the alphabetically first label
fn dominant_label(counts: &BTreeMap<String, usize>) -> Option<String> {
    counts
        .iter()
        .fold(None::<(&String, usize)>, |best, (label, n)| match best {
            Some((_, top)) if top >= *n => best,
            _ => Some((label, *n)),
        })
        .map(|(label, _)| label.clone())
}

// Stored timestamps are UTC; days are bucketed in `tz` so they line up
// with the local-date streak
fn day_of<Tz: TimeZone>(created_at: &str, tz: &Tz) -> String
where
    Tz::Offset: std::fmt::Display,
{
    match DateTime::parse_from_rfc3339(created_at) {
        Ok(ts) => ts.with_timezone(tz).format("%Y-%m-%d").to_string(),
        Err(_) => created_at.chars().take(10).collect(),
    }
}

/// Summary with days in the local time zone.
pub fn summarize(entries: &[MoodEntry]) -> MoodSummary {
    summarize_in(entries, &Local)
}

pub fn summarize_in<Tz: TimeZone>(entries: &[MoodEntry], tz: &Tz) -> MoodSummary
where
    Tz::Offset: std::fmt::Display,
{
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_day: BTreeMap<String, BTreeMap<String, usize>> = BTreeMap::new();

    for entry in entries {
        *counts.entry(entry.emotion.clone()).or_insert(0) += 1;

        let date = day_of(&entry.created_at, tz);
        *by_day
            .entry(date)
            .or_default()
            .entry(entry.emotion.clone())
            .or_insert(0) += 1;
    }

    let daily = by_day
        .into_iter()
        .filter_map(|(date, day_counts)| {
            let entries: usize = day_counts.values().sum();
            dominant_label(&day_counts).map(|dominant| DailyMood { date, dominant, entries })
        })
        .collect();

    MoodSummary {
        total_entries: entries.len(),
        dominant: dominant_label(&counts),
        counts,
        daily,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, Utc};

    fn entry(id: i64, emotion: &str, created_at: &str) -> MoodEntry {
        MoodEntry {
            id,
            user_id: 1,
            emotion: emotion.to_string(),
            created_at: created_at.to_string(),
        }
    }

    #[test]
    fn test_empty_history() {
        let summary = summarize_in(&[], &Utc);
        assert_eq!(summary, MoodSummary::default());
    }

    #[test]
    fn test_counts_and_daily_breakdown() {
        let entries = vec![
            entry(4, "Joy", "2024-05-02T09:00:00.000000Z"),
            entry(3, "Sadness", "2024-05-01T22:00:00.000000Z"),
            entry(2, "Sadness", "2024-05-01T12:00:00.000000Z"),
            entry(1, "Fear", "2024-05-01T08:00:00.000000Z"),
        ];

        let summary = summarize_in(&entries, &Utc);
        assert_eq!(summary.total_entries, 4);
        assert_eq!(summary.counts["Sadness"], 2);
        assert_eq!(summary.dominant.as_deref(), Some("Sadness"));

        assert_eq!(summary.daily.len(), 2);
        assert_eq!(summary.daily[0].date, "2024-05-01");
        assert_eq!(summary.daily[0].dominant, "Sadness");
        assert_eq!(summary.daily[0].entries, 3);
        assert_eq!(summary.daily[1].dominant, "Joy");
    }

    #[test]
    fn test_dominant_tie_is_alphabetical() {
        let entries = vec![
            entry(2, "Joy", "2024-05-01T09:00:00.000000Z"),
            entry(1, "Anger", "2024-05-01T08:00:00.000000Z"),
        ];
        assert_eq!(summarize_in(&entries, &Utc).dominant.as_deref(), Some("Anger"));
    }

    #[test]
    fn test_days_follow_given_time_zone() {
        let entries = vec![entry(1, "Joy", "2024-05-02T02:30:00.000000Z")];
        let new_york = FixedOffset::west_opt(4 * 3600).unwrap();

        assert_eq!(summarize_in(&entries, &Utc).daily[0].date, "2024-05-02");
        assert_eq!(summarize_in(&entries, &new_york).daily[0].date, "2024-05-01");
    }
}
