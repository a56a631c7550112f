use serde::{Deserialize, Serialize};

use crate::engine::adaptive::Difficulty;
use crate::engine::section::Section;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub section: Section,
    pub domain: String,
    pub subunit: String,
    pub difficulty: Difficulty,
    pub prompt: String,
    #[serde(default)]
    pub passage: Option<String>,
    pub choices: Vec<String>,
    /// Index into `choices`.
    pub answer: usize,
    #[serde(default)]
    pub explanation: Option<String>,
}

impl Question {
    pub fn is_correct(&self, choice: usize) -> bool {
        self.answer == choice
    }
}

/// On-disk question bank.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QuestionBankFile {
    #[serde(default)]
    pub questions: Vec<Question>,
}

// --- Content domains ---

pub struct DomainDefinition {
    pub key: &'static str,
    pub name: &'static str,
    pub section: Section,
}

pub const ALL_DOMAINS: &[DomainDefinition] = &[
    DomainDefinition {
        key: "information-ideas",
        name: "Information and Ideas",
        section: Section::Reading,
    },
    DomainDefinition {
        key: "craft-structure",
        name: "Craft and Structure",
        section: Section::Reading,
    },
    DomainDefinition {
        key: "expression-ideas",
        name: "Expression of Ideas",
        section: Section::Reading,
    },
    DomainDefinition {
        key: "standard-conventions",
        name: "Standard English Conventions",
        section: Section::Reading,
    },
    DomainDefinition {
        key: "algebra",
        name: "Algebra",
        section: Section::Math,
    },
    DomainDefinition {
        key: "advanced-math",
        name: "Advanced Math",
        section: Section::Math,
    },
    DomainDefinition {
        key: "problem-solving",
        name: "Problem-Solving and Data Analysis",
        section: Section::Math,
    },
    DomainDefinition {
        key: "geometry",
        name: "Geometry and Trigonometry",
        section: Section::Math,
    },
];

pub fn find_domain(key: &str) -> Option<&'static DomainDefinition> {
    ALL_DOMAINS.iter().find(|d| d.key == key)
}

/// Readable name for a domain key, falling back to the key itself.
pub fn domain_name(key: &str) -> &str {
    find_domain(key).map_or(key, |d| d.name)
}

pub fn domains_for(section: Section) -> impl Iterator<Item = &'static DomainDefinition> {
    ALL_DOMAINS.iter().filter(move |d| d.section == section)
}
