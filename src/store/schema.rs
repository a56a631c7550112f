use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::engine::adaptive::DifficultyPool;
use crate::engine::section::Section;
use crate::progress::streak::Streak;
use crate::progress::xp;
use crate::session::result::{ModuleResult, ScoreBreakdown, TestResult};

pub const SCHEMA_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProfileData {
    pub schema_version: u32,
    pub total_xp: u32,
    pub level: u32,
    pub badge: String,
    #[serde(default)]
    pub streak: Streak,
    #[serde(default)]
    pub total_tests: u32,
}

impl Default for ProfileData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            total_xp: 0,
            level: 1,
            badge: xp::badge_for_level(1).to_string(),
            streak: Streak::default(),
            total_tests: 0,
        }
    }
}

impl ProfileData {
    pub fn needs_reset(&self) -> bool {
        self.schema_version != SCHEMA_VERSION
    }

    /// Recompute level and badge from total XP.
    pub fn add_xp(&mut self, amount: u32) {
        self.total_xp += amount;
        self.level = xp::level_from_xp(self.total_xp);
        self.badge = xp::badge_for_level(self.level).to_string();
    }

    pub fn level_progress(&self) -> u32 {
        xp::level_progress(self.total_xp)
    }

    pub fn next_level_xp(&self) -> u32 {
        xp::next_level_xp(self.total_xp)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HistoryData {
    pub schema_version: u32,
    pub results: Vec<TestResult>,
}

impl Default for HistoryData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            results: Vec::new(),
        }
    }
}

// --- Sessions ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    Sectional,
    FullTest,
    Daily,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModuleEntry {
    pub module_number: u8,
    pub result: ModuleResult,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub kind: SessionKind,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    /// Module 2 pool chosen per section.
    #[serde(default)]
    pub module2_pools: BTreeMap<Section, DifficultyPool>,
    #[serde(default)]
    pub used_questions: Vec<String>,
    #[serde(default)]
    pub final_score: Option<ScoreBreakdown>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionRecord {
    pub fn new(id: String, kind: SessionKind) -> Self {
        Self {
            id,
            kind,
            started_at: Utc::now(),
            modules: Vec::new(),
            module2_pools: BTreeMap::new(),
            used_questions: Vec::new(),
            final_score: None,
            completed_at: None,
        }
    }

    pub fn module(&self, section: Section, module_number: u8) -> Option<&ModuleResult> {
        self.modules
            .iter()
            .find(|m| m.module_number == module_number && m.result.section() == section)
            .map(|m| &m.result)
    }

    pub fn is_complete(&self) -> bool {
        self.final_score.is_some()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionsData {
    pub schema_version: u32,
    pub sessions: BTreeMap<String, SessionRecord>,
}

impl Default for SessionsData {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            sessions: BTreeMap::new(),
        }
    }
}

pub const EXPORT_VERSION: u32 = 1;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExportData {
    pub satprep_export_version: u32,
    pub exported_at: DateTime<Utc>,
    pub config: Config,
    pub profile: ProfileData,
    pub history: HistoryData,
    pub sessions: SessionsData,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_xp_updates_level_and_badge() {
        let mut profile = ProfileData::default();
        assert_eq!(profile.badge, "SAT Rookie");
        profile.add_xp(1020);
        assert_eq!(profile.level, 3);
        assert_eq!(profile.badge, "SAT Explorer");
        assert_eq!(profile.level_progress(), 20);
        assert_eq!(profile.next_level_xp(), 1500);
    }

    #[test]
    fn test_stale_schema_needs_reset() {
        let mut profile = ProfileData::default();
        assert!(!profile.needs_reset());
        profile.schema_version = 0;
        assert!(profile.needs_reset());
    }

    #[test]
    fn test_session_record_serializes_pools_by_section_key() {
        let mut record = SessionRecord::new("s1".to_string(), SessionKind::FullTest);
        record.module2_pools.insert(Section::Math, DifficultyPool::HARD);
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"math\""));
        assert!(json.contains("\"full_test\""));
        let back: SessionRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }
}
