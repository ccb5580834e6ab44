//! Seven-day sliding-window mood log.
//!
//! One entry per calendar day, keyed by the short weekday label that also
//! labels the chart axis. Logging on a day whose label matches the latest
//! entry overwrites it in place; otherwise the oldest entry is evicted once
//! the window is full.

use chrono::Local;
use serde::{Deserialize, Serialize};

pub const WINDOW_SIZE: usize = 7;

const SCORE_WORDS: [&str; 5] = ["awful", "poor", "okay", "good", "great"];

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MoodEntry {
    pub date: String,
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Serializable view for the tracker screen.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MoodSnapshot {
    pub entries: Vec<MoodEntry>,
    pub average: f32,
}

#[derive(Debug, Clone)]
pub struct MoodLog {
    entries: Vec<MoodEntry>,
}

impl MoodLog {
    /// Rebuilds the log from persisted state. First run seeds a demo week so
    /// the chart is never empty; a present-but-degraded series stays as
    /// loaded.
    pub fn restore(saved: Option<Vec<MoodEntry>>) -> Self {
        Self {
            entries: saved.unwrap_or_else(seed_week),
        }
    }

    pub fn entries(&self) -> &[MoodEntry] {
        &self.entries
    }

    pub fn snapshot(&self) -> MoodSnapshot {
        MoodSnapshot {
            entries: self.entries.clone(),
            average: self.average(),
        }
    }

    /// Upserts today's entry per the sliding-window rule. `today` is injected
    /// so the rule is testable with a fixed day.
    pub fn log(&mut self, score: u8, note: Option<String>, today: &str) {
        let entry = MoodEntry {
            date: today.to_string(),
            score,
            note,
        };

        if let Some(last) = self.entries.last_mut() {
            if last.date == today {
                *last = entry;
                return;
            }
        }
        if self.entries.len() >= WINDOW_SIZE {
            self.entries.remove(0);
        }
        self.entries.push(entry);
    }

    pub fn average(&self) -> f32 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let total: u32 = self.entries.iter().map(|e| u32::from(e.score)).sum();
        total as f32 / self.entries.len() as f32
    }
}

/// Demo series shown before the user has logged anything.
fn seed_week() -> Vec<MoodEntry> {
    [
        ("Mon", 3),
        ("Tue", 2),
        ("Wed", 4),
        ("Thu", 4),
        ("Fri", 5),
        ("Sat", 4),
        ("Sun", 3),
    ]
    .into_iter()
    .map(|(date, score)| MoodEntry {
        date: date.to_string(),
        score,
        note: None,
    })
    .collect()
}

/// Short weekday label for the current local day ("Mon", "Tue", ...).
pub fn today_label() -> String {
    Local::now().format("%a").to_string()
}

/// The sentence handed to the chat view by the "discuss this" action.
pub fn summary_sentence(score: u8, note: Option<&str>) -> String {
    let word = SCORE_WORDS
        .get(usize::from(score.saturating_sub(1)))
        .unwrap_or(&"okay");
    let mut sentence = format!("I just logged that I'm feeling {word}.");
    if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
        sentence.push_str(&format!(" I noted: \"{note}\". Can we talk about this?"));
    }
    sentence
}
