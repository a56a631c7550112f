use serde::{Deserialize, Serialize};

// --- Section ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Section {
    Reading,
    Math,
}

impl Section {
    pub fn to_key(self) -> &'static str {
        match self {
            Section::Reading => "reading",
            Section::Math => "math",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "reading" => Some(Section::Reading),
            "math" => Some(Section::Math),
            _ => None,
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Section::Reading => "Reading and Writing",
            Section::Math => "Math",
        }
    }

    pub fn all() -> &'static [Section] {
        &[Section::Reading, Section::Math]
    }

    pub fn config(self) -> &'static SectionConfig {
        match self {
            Section::Reading => &READING,
            Section::Math => &MATH,
        }
    }
}

// --- Scoring table ---

/// Fixed per-section constants. This table is the only place the adaptive
/// threshold and the scaling rule are defined.
#[derive(Debug)]
pub struct SectionConfig {
    pub section: Section,
    pub module_size: u32,
    pub hard_threshold: u32,
    pub easy_penalty: f64,
    pub hard_ceiling: f64,
    pub time_limit_secs: u64,
}

impl SectionConfig {
    /// Raw maximum across both modules of the section.
    pub fn max_raw(&self) -> u32 {
        self.module_size * 2
    }
}

pub const MIN_SCALED: u32 = 200;
pub const MAX_SCALED: u32 = 800;
pub const SCALED_SPAN: f64 = 600.0;

/// Break between the reading and math sections of a full test.
pub const BREAK_SECS: u64 = 10 * 60;

const READING: SectionConfig = SectionConfig {
    section: Section::Reading,
    module_size: 27,
    hard_threshold: 19,
    easy_penalty: 130.0,
    hard_ceiling: 800.0,
    time_limit_secs: 32 * 60,
};

const MATH: SectionConfig = SectionConfig {
    section: Section::Math,
    module_size: 22,
    hard_threshold: 15,
    easy_penalty: 130.0,
    hard_ceiling: 800.0,
    time_limit_secs: 35 * 60,
};
