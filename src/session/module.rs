use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use crate::engine::error::ScoringError;
use crate::engine::section::Section;
use crate::session::result::ModuleResult;

/// Answer sheet for a module in progress.
pub struct ModuleSheet {
    pub section: Section,
    pub module_number: u8,
    pub answers: Vec<Option<usize>>,
    pub flagged: BTreeSet<usize>,
    pub cursor: usize,
    pub time_limit: Duration,
    pub started_at: Option<Instant>,
    pub finished_at: Option<Instant>,
}

impl ModuleSheet {
    pub fn new(section: Section, module_number: u8) -> Self {
        let config = section.config();
        Self {
            section,
            module_number,
            answers: vec![None; config.module_size as usize],
            flagged: BTreeSet::new(),
            cursor: 0,
            time_limit: Duration::from_secs(config.time_limit_secs),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self, now: Instant) {
        if self.started_at.is_none() {
            self.started_at = Some(now);
        }
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }

    pub fn answer(&mut self, question: usize, choice: usize) {
        if let Some(slot) = self.answers.get_mut(question) {
            *slot = Some(choice);
        }
    }

    pub fn clear(&mut self, question: usize) {
        if let Some(slot) = self.answers.get_mut(question) {
            *slot = None;
        }
    }

    pub fn toggle_flag(&mut self, question: usize) {
        if question >= self.answers.len() {
            return;
        }
        if !self.flagged.remove(&question) {
            self.flagged.insert(question);
        }
    }

    pub fn next(&mut self) {
        if self.cursor + 1 < self.answers.len() {
            self.cursor += 1;
        }
    }

    pub fn previous(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    pub fn unanswered(&self) -> usize {
        self.answers.iter().filter(|a| a.is_none()).count()
    }

    /// Submitting with blanks or flags should go through a review step first.
    pub fn needs_review(&self) -> bool {
        self.unanswered() > 0 || !self.flagged.is_empty()
    }

    pub fn elapsed(&self, now: Instant) -> Duration {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => end.duration_since(start),
            (Some(start), None) => now.saturating_duration_since(start),
            _ => Duration::ZERO,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        self.time_limit.saturating_sub(self.elapsed(now))
    }

    pub fn is_expired(&self, now: Instant) -> bool {
        self.started_at.is_some() && self.remaining(now).is_zero()
    }

    /// Close the sheet and score it. Also used when the timer runs out, in
    /// which case whatever was answered counts.
    pub fn submit(&mut self, key: &[usize], now: Instant) -> Result<ModuleResult, ScoringError> {
        if self.finished_at.is_none() {
            self.finished_at = Some(now);
        }
        ModuleResult::from_answers(self.section, &self.answers, key)
    }
}

pub fn format_clock(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}
