pub mod adaptive;
pub mod error;
pub mod scaling;
pub mod section;

pub use adaptive::{AdaptiveDecision, Difficulty, DifficultyPool, decide, select_pool};
pub use error::ScoringError;
pub use scaling::{CompositeScore, ScaledScore, composite, scale, scale_section};
pub use section::Section;
