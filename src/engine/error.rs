use thiserror::Error;

use crate::engine::section::Section;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoringError {
    #[error("{section:?} module must have {expected} questions, got {actual}")]
    WrongModuleSize {
        section: Section,
        expected: u32,
        actual: u32,
    },

    #[error("answer key has {key} entries for a {answers}-question sheet")]
    KeyLengthMismatch { answers: usize, key: usize },

    #[error("raw score {0} is negative")]
    NegativeRaw(i64),

    #[error("raw score {raw} exceeds {total} questions")]
    RawExceedsTotal { raw: u32, total: u32 },

    #[error("{section:?} raw total {raw} exceeds section maximum {max}")]
    RawExceedsMax { section: Section, raw: u32, max: u32 },

    #[error("expected a {expected:?} module result, got {actual:?}")]
    SectionMismatch { expected: Section, actual: Section },

    #[error("cannot {action} while section is {state}")]
    InvalidTransition {
        action: &'static str,
        state: &'static str,
    },

    #[error("{0:?} section has not been scored yet")]
    SectionNotScored(Section),
}
