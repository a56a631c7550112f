use serde::{Deserialize, Serialize};

use crate::engine::error::ScoringError;
use crate::session::result::ModuleResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn to_key(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key.to_ascii_lowercase().as_str() {
            "easy" => Some(Difficulty::Easy),
            "medium" => Some(Difficulty::Medium),
            "hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }

    pub fn all() -> &'static [Difficulty] {
        &[Difficulty::Easy, Difficulty::Medium, Difficulty::Hard]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdaptiveDecision {
    pub qualifies_for_hard_module2: bool,
}

/// The two difficulty tiers Module 2 draws from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyPool {
    pub primary: Difficulty,
    pub secondary: Difficulty,
}

impl DifficultyPool {
    pub const HARD: DifficultyPool = DifficultyPool {
        primary: Difficulty::Hard,
        secondary: Difficulty::Medium,
    };

    pub const EASY: DifficultyPool = DifficultyPool {
        primary: Difficulty::Easy,
        secondary: Difficulty::Medium,
    };

    pub fn contains(&self, difficulty: Difficulty) -> bool {
        self.primary == difficulty || self.secondary == difficulty
    }

    pub fn as_vec(&self) -> Vec<Difficulty> {
        vec![self.primary, self.secondary]
    }

    pub fn is_hard(&self) -> bool {
        self.primary == Difficulty::Hard
    }

    pub fn label(&self) -> &'static str {
        if self.is_hard() { "hard" } else { "easy" }
    }
}

/// Decide the Module 2 tier from Module 1. Reading qualifies at 19 of 27,
/// math at 15 of 22.
pub fn decide(module_one: &ModuleResult) -> Result<AdaptiveDecision, ScoringError> {
    let config = module_one.section().config();
    if module_one.total_questions() != config.module_size {
        return Err(ScoringError::WrongModuleSize {
            section: module_one.section(),
            expected: config.module_size,
            actual: module_one.total_questions(),
        });
    }
    Ok(AdaptiveDecision {
        qualifies_for_hard_module2: module_one.raw_score() >= config.hard_threshold,
    })
}

pub fn select_pool(decision: AdaptiveDecision) -> DifficultyPool {
    if decision.qualifies_for_hard_module2 {
        DifficultyPool::HARD
    } else {
        DifficultyPool::EASY
    }
}
