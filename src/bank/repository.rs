use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::path::Path;

use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use thiserror::Error;
use tracing::debug;

use crate::bank::question::{Question, QuestionBankFile};
use crate::engine::adaptive::Difficulty;
use crate::engine::section::Section;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("failed to read question bank: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse question bank: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("duplicate question id {0}")]
    DuplicateId(String),

    #[error("question {id} answer index {answer} is outside its {choices} choices")]
    AnswerOutOfRange {
        id: String,
        answer: usize,
        choices: usize,
    },

    #[error("no {section:?} questions left for {difficulties:?}")]
    PoolExhausted {
        section: Section,
        difficulties: Vec<Difficulty>,
    },
}

/// Filter for a repository query. Empty `difficulties` means any.
#[derive(Clone, Debug)]
pub struct QueryFilter {
    pub section: Section,
    pub domain: Option<String>,
    pub subunit: Option<String>,
    pub difficulties: BTreeSet<Difficulty>,
    pub exclude: HashSet<String>,
}

impl QueryFilter {
    pub fn new(section: Section) -> Self {
        Self {
            section,
            domain: None,
            subunit: None,
            difficulties: BTreeSet::new(),
            exclude: HashSet::new(),
        }
    }

    pub fn domain(mut self, domain: &str) -> Self {
        self.domain = Some(domain.to_string());
        self
    }

    pub fn subunit(mut self, subunit: &str) -> Self {
        self.subunit = Some(subunit.to_string());
        self
    }

    pub fn difficulties(mut self, difficulties: &[Difficulty]) -> Self {
        self.difficulties = difficulties.iter().copied().collect();
        self
    }

    pub fn exclude<I: IntoIterator<Item = String>>(mut self, ids: I) -> Self {
        self.exclude.extend(ids);
        self
    }

    pub fn matches(&self, question: &Question) -> bool {
        question.section == self.section
            && self.domain.as_deref().is_none_or(|d| question.domain == d)
            && self.subunit.as_deref().is_none_or(|s| question.subunit == s)
            && (self.difficulties.is_empty() || self.difficulties.contains(&question.difficulty))
            && !self.exclude.contains(&question.id)
    }
}

pub trait QuestionRepository {
    /// Up to `limit` matching questions in random order. Returns fewer when
    /// the pool runs short; callers decide how to widen.
    fn fetch(&mut self, filter: &QueryFilter, limit: usize) -> Result<Vec<Question>, BankError>;
}

pub struct InMemoryRepository {
    questions: Vec<Question>,
    rng: SmallRng,
}

impl InMemoryRepository {
    pub fn new(questions: Vec<Question>) -> Result<Self, BankError> {
        Self::with_rng(questions, SmallRng::from_entropy())
    }

    pub fn with_seed(questions: Vec<Question>, seed: u64) -> Result<Self, BankError> {
        Self::with_rng(questions, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(questions: Vec<Question>, rng: SmallRng) -> Result<Self, BankError> {
        let mut seen = HashSet::new();
        for q in &questions {
            if !seen.insert(q.id.as_str()) {
                return Err(BankError::DuplicateId(q.id.clone()));
            }
            if q.answer >= q.choices.len() {
                return Err(BankError::AnswerOutOfRange {
                    id: q.id.clone(),
                    answer: q.answer,
                    choices: q.choices.len(),
                });
            }
        }
        Ok(Self { questions, rng })
    }

    pub fn load(path: &Path) -> Result<Self, BankError> {
        let content = fs::read_to_string(path)?;
        let file: QuestionBankFile = serde_json::from_str(&content)?;
        debug!(path = %path.display(), count = file.questions.len(), "loaded question bank");
        Self::new(file.questions)
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn count(&self, filter: &QueryFilter) -> usize {
        self.questions.iter().filter(|q| filter.matches(q)).count()
    }
}

impl QuestionRepository for InMemoryRepository {
    fn fetch(&mut self, filter: &QueryFilter, limit: usize) -> Result<Vec<Question>, BankError> {
        let mut matching: Vec<&Question> = self.questions.iter().filter(|q| filter.matches(q)).collect();
        matching.shuffle(&mut self.rng);
        matching.truncate(limit);
        Ok(matching.into_iter().cloned().collect())
    }
}
