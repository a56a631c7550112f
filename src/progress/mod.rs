pub mod diagnostics;
pub mod stats;
pub mod streak;
pub mod xp;
