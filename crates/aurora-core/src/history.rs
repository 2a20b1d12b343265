//! Listening history recorded by the player.

#![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Default number of records kept.
pub const DEFAULT_HISTORY_LIMIT: usize = 1000;

/// One play of one track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayRecord {
    pub track_id: String,
    pub played_at: DateTime<Utc>,
    /// Seconds actually listened.
    pub listened_secs: f64,
    /// Whether the track reached its natural end.
    pub completed: bool,
}

/// Aggregate listening statistics.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total_plays: usize,
    pub unique_tracks: usize,
    pub completed_plays: usize,
    pub total_listened_secs: f64,
}

/// Bounded play history, newest record first.
#[derive(Debug, Clone)]
pub struct PlayHistory {
    records: Vec<PlayRecord>,
    limit: usize,
}

impl PlayHistory {
    pub const fn new(limit: usize) -> Self {
        Self {
            records: Vec::new(),
            limit,
        }
    }

    /// Record a play that happened just now.
    pub fn record(&mut self, track_id: impl Into<String>, listened_secs: f64, completed: bool) {
        self.push(PlayRecord {
            track_id: track_id.into(),
            played_at: Utc::now(),
            listened_secs: listened_secs.max(0.0),
            completed,
        });
    }

    /// Insert a prepared record at the front, dropping the oldest past the limit.
    pub fn push(&mut self, record: PlayRecord) {
        self.records.insert(0, record);
        self.records.truncate(self.limit);
    }

    /// All records, newest first.
    pub fn records(&self) -> &[PlayRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Maximum number of records kept.
    pub const fn limit(&self) -> usize {
        self.limit
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct track IDs, most recently played first.
    pub fn recently_played(&self, limit: usize) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.records
            .iter()
            .map(|r| r.track_id.as_str())
            .filter(|id| seen.insert(*id))
            .take(limit)
            .collect()
    }

    /// Track IDs by play count; ties go to the more recently played track.
    pub fn most_played(&self, limit: usize) -> Vec<&str> {
        // id -> (count, index of most recent play)
        let mut counts: HashMap<&str, (usize, usize)> = HashMap::new();
        for (index, record) in self.records.iter().enumerate() {
            counts
                .entry(record.track_id.as_str())
                .and_modify(|(count, _)| *count += 1)
                .or_insert((1, index));
        }

        let mut ranked: Vec<_> = counts.into_iter().collect();
        ranked.sort_by(|(_, (count_a, recent_a)), (_, (count_b, recent_b))| {
            count_b.cmp(count_a).then(recent_a.cmp(recent_b))
        });
        ranked.into_iter().take(limit).map(|(id, _)| id).collect()
    }

    pub fn play_count(&self, track_id: &str) -> usize {
        self.records.iter().filter(|r| r.track_id == track_id).count()
    }

    pub fn last_played(&self, track_id: &str) -> Option<DateTime<Utc>> {
        self.records
            .iter()
            .find(|r| r.track_id == track_id)
            .map(|r| r.played_at)
    }

    pub fn stats(&self) -> HistoryStats {
        let unique: HashSet<_> = self.records.iter().map(|r| r.track_id.as_str()).collect();
        HistoryStats {
            total_plays: self.records.len(),
            unique_tracks: unique.len(),
            completed_plays: self.records.iter().filter(|r| r.completed).count(),
            total_listened_secs: self.records.iter().map(|r| r.listened_secs).sum(),
        }
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Serialize the history as JSON.
    pub fn export_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.records)?)
    }

    /// Replace the history with records decoded from JSON.
    ///
    /// On a decode error the current history is kept.
    pub fn import_json(&mut self, json: &str) -> Result<()> {
        let mut records: Vec<PlayRecord> = serde_json::from_str(json)?;
        records.truncate(self.limit);
        self.records = records;
        Ok(())
    }
}

impl Default for PlayHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
