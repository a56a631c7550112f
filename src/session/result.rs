use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::error::ScoringError;
use crate::engine::section::Section;

/// Outcome of one submitted module. Only constructible through validation,
/// so every value in circulation satisfies `raw_score <= total_questions`
/// and `total_questions == module_size` for its section.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ModuleResultRecord", into = "ModuleResultRecord")]
pub struct ModuleResult {
    section: Section,
    raw_score: u32,
    total_questions: u32,
}

impl ModuleResult {
    pub fn new(section: Section, raw_score: u32, total_questions: u32) -> Result<Self, ScoringError> {
        let expected = section.config().module_size;
        if total_questions != expected {
            return Err(ScoringError::WrongModuleSize {
                section,
                expected,
                actual: total_questions,
            });
        }
        if raw_score > total_questions {
            return Err(ScoringError::RawExceedsTotal {
                raw: raw_score,
                total: total_questions,
            });
        }
        Ok(Self {
            section,
            raw_score,
            total_questions,
        })
    }

    /// Tally an answer sheet against the answer key. Unanswered questions
    /// count as incorrect.
    pub fn from_answers(
        section: Section,
        answers: &[Option<usize>],
        key: &[usize],
    ) -> Result<Self, ScoringError> {
        if answers.len() != key.len() {
            return Err(ScoringError::KeyLengthMismatch {
                answers: answers.len(),
                key: key.len(),
            });
        }
        let total = u32::try_from(answers.len()).unwrap_or(u32::MAX);
        let correct = answers
            .iter()
            .zip(key)
            .filter(|(given, expected)| **given == Some(**expected))
            .count() as u32;
        Self::new(section, correct, total)
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn raw_score(&self) -> u32 {
        self.raw_score
    }

    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    pub fn accuracy(&self) -> f64 {
        self.raw_score as f64 / self.total_questions as f64 * 100.0
    }
}

/// Unvalidated wire form, so that persisted data goes through `new` on load.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct ModuleResultRecord {
    section: Section,
    raw_score: i64,
    total_questions: u32,
}

impl TryFrom<ModuleResultRecord> for ModuleResult {
    type Error = ScoringError;

    fn try_from(record: ModuleResultRecord) -> Result<Self, Self::Error> {
        let raw = u32::try_from(record.raw_score).map_err(|_| ScoringError::NegativeRaw(record.raw_score))?;
        ModuleResult::new(record.section, raw, record.total_questions)
    }
}

impl From<ModuleResult> for ModuleResultRecord {
    fn from(result: ModuleResult) -> Self {
        Self {
            section: result.section,
            raw_score: result.raw_score as i64,
            total_questions: result.total_questions,
        }
    }
}

// --- History records ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestKind {
    Full,
    Sectional,
    Daily,
}

impl TestKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TestKind::Full => "full",
            TestKind::Sectional => "sectional",
            TestKind::Daily => "daily",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionScope {
    Reading,
    Math,
    Both,
}

impl From<Section> for SectionScope {
    fn from(section: Section) -> Self {
        match section {
            Section::Reading => SectionScope::Reading,
            Section::Math => SectionScope::Math,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reading: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub math: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub id: String,
    pub kind: TestKind,
    pub section: SectionScope,
    #[serde(default)]
    pub domain: Option<String>,
    pub total_questions: u32,
    pub correct_answers: u32,
    #[serde(default)]
    pub score: Option<ScoreBreakdown>,
    pub time_spent_secs: u64,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub xp_earned: u32,
    /// Session the result was recorded under, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl TestResult {
    pub fn new(kind: TestKind, section: SectionScope, total_questions: u32, correct_answers: u32) -> Self {
        let completed_at = Utc::now();
        Self {
            id: format!("{}-{:08x}", completed_at.timestamp_millis(), rand::random::<u32>()),
            kind,
            section,
            domain: None,
            total_questions,
            correct_answers,
            score: None,
            time_spent_secs: 0,
            completed_at,
            xp_earned: 0,
            session_id: None,
        }
    }

    pub fn with_domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn with_score(mut self, score: ScoreBreakdown) -> Self {
        self.score = Some(score);
        self
    }

    pub fn with_time_spent(mut self, secs: u64) -> Self {
        self.time_spent_secs = secs;
        self
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.session_id = Some(session_id.to_string());
        self
    }
}
