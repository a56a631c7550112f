use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreakUpdate {
    SameDay,
    Extended,
    Started,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Streak {
    pub days: u32,
    pub best: u32,
    pub last_practice_date: Option<NaiveDate>,
}

impl Streak {
    /// Count a practice on `day`. Consecutive calendar days extend the
    /// streak, a gap starts over at 1. Days earlier than the last recorded
    /// one leave the streak alone.
    pub fn record(&mut self, day: NaiveDate) -> StreakUpdate {
        let update = match self.last_practice_date {
            Some(last) if day <= last => return StreakUpdate::SameDay,
            Some(last) if day.signed_duration_since(last).num_days() == 1 => {
                self.days += 1;
                StreakUpdate::Extended
            }
            _ => {
                self.days = 1;
                StreakUpdate::Started
            }
        };
        self.best = self.best.max(self.days);
        self.last_practice_date = Some(day);
        update
    }

    /// Streak as of `today`: zero once a full day has been missed.
    pub fn current(&self, today: NaiveDate) -> u32 {
        match self.last_practice_date {
            Some(last) if today.signed_duration_since(last).num_days() <= 1 => self.days,
            _ => 0,
        }
    }
}
