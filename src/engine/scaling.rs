use serde::{Deserialize, Serialize};

use crate::engine::adaptive::AdaptiveDecision;
use crate::engine::error::ScoringError;
use crate::engine::section::{MAX_SCALED, MIN_SCALED, SCALED_SPAN, Section};
use crate::session::result::ModuleResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScaledScore(u32);

impl ScaledScore {
    pub fn value(self) -> u32 {
        self.0
    }

    fn clamped(value: f64) -> Self {
        let rounded = value.round().clamp(MIN_SCALED as f64, MAX_SCALED as f64);
        Self(rounded as u32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompositeScore(u32);

pub const MIN_COMPOSITE: u32 = MIN_SCALED * 2;
pub const MAX_COMPOSITE: u32 = MAX_SCALED * 2;
const RANGE_HALF_WIDTH: u32 = 100;

impl CompositeScore {
    pub fn value(self) -> u32 {
        self.0
    }

    pub fn range(self) -> (u32, u32) {
        score_band(self.0)
    }
}

/// Reporting band around a composite total, clamped to the composite scale.
pub fn score_band(total: u32) -> (u32, u32) {
    (
        total.saturating_sub(RANGE_HALF_WIDTH).max(MIN_COMPOSITE),
        (total + RANGE_HALF_WIDTH).min(MAX_COMPOSITE),
    )
}

/// Scale a section's raw total (both modules) to 200..=800.
///
/// `base = 200 + raw / max_raw * 600`. An easy Module 2 costs a fixed
/// penalty floored at 200; a hard Module 2 is capped at the section ceiling.
/// Rounds half up.
pub fn scale(raw_total: u32, is_hard_module2: bool, section: Section) -> Result<ScaledScore, ScoringError> {
    let config = section.config();
    let max = config.max_raw();
    if raw_total > max {
        return Err(ScoringError::RawExceedsMax {
            section,
            raw: raw_total,
            max,
        });
    }

    let base = MIN_SCALED as f64 + (raw_total as f64 / max as f64) * SCALED_SPAN;
    let adjusted = if is_hard_module2 {
        base.min(config.hard_ceiling)
    } else {
        (base - config.easy_penalty).max(MIN_SCALED as f64)
    };
    Ok(ScaledScore::clamped(adjusted))
}

/// Score a completed section from its two modules and the decision Module 1
/// produced.
pub fn scale_section(
    module_one: &ModuleResult,
    module_two: &ModuleResult,
    decision: AdaptiveDecision,
) -> Result<ScaledScore, ScoringError> {
    let section = module_one.section();
    if module_two.section() != section {
        return Err(ScoringError::SectionMismatch {
            expected: section,
            actual: module_two.section(),
        });
    }
    let raw_total = module_one.raw_score() + module_two.raw_score();
    scale(raw_total, decision.qualifies_for_hard_module2, section)
}

pub fn composite(reading: ScaledScore, math: ScaledScore) -> CompositeScore {
    CompositeScore(reading.value() + math.value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adaptive::decide;

    #[test]
    fn test_zero_raw_easy_floors_at_200() {
        assert_eq!(scale(0, false, Section::Reading).unwrap().value(), 200);
        assert_eq!(scale(0, false, Section::Math).unwrap().value(), 200);
    }

    #[test]
    fn test_zero_raw_hard_is_200() {
        assert_eq!(scale(0, true, Section::Math).unwrap().value(), 200);
    }

    #[test]
    fn test_full_marks_hard_is_800() {
        assert_eq!(scale(54, true, Section::Reading).unwrap().value(), 800);
        assert_eq!(scale(44, true, Section::Math).unwrap().value(), 800);
    }

    #[test]
    fn test_full_marks_easy_takes_penalty() {
        assert_eq!(scale(54, false, Section::Reading).unwrap().value(), 670);
    }

    #[test]
    fn test_easy_penalty_applied_mid_range() {
        // base = 200 + 22/44 * 600 = 500
        assert_eq!(scale(22, true, Section::Math).unwrap().value(), 500);
        assert_eq!(scale(22, false, Section::Math).unwrap().value(), 370);
    }

    #[test]
    fn test_rounds_half_up() {
        // 1/54 * 600 = 11.11 -> 211.11 -> 211
        assert_eq!(scale(1, true, Section::Reading).unwrap().value(), 211);
        // 1/44 * 600 = 13.636.. -> 213.64 -> 214
        assert_eq!(scale(1, true, Section::Math).unwrap().value(), 214);
    }

    #[test]
    fn test_rejects_raw_above_section_max() {
        assert_eq!(
            scale(45, true, Section::Math).unwrap_err(),
            ScoringError::RawExceedsMax {
                section: Section::Math,
                raw: 45,
                max: 44,
            }
        );
    }

    #[test]
    fn test_always_within_scale() {
        for &section in Section::all() {
            for raw in 0..=section.config().max_raw() {
                for hard in [true, false] {
                    let v = scale(raw, hard, section).unwrap().value();
                    assert!((200..=800).contains(&v), "{section:?} raw={raw} hard={hard} -> {v}");
                }
            }
        }
    }

    #[test]
    fn test_scale_is_idempotent() {
        let a = scale(31, false, Section::Math).unwrap();
        let b = scale(31, false, Section::Math).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_reading_hard_path_reference_value() {
        // 20/27 then 22/27 on the hard module: 42/54 -> 666.67 -> 667.
        let m1 = ModuleResult::new(Section::Reading, 20, 27).unwrap();
        let decision = decide(&m1).unwrap();
        assert!(decision.qualifies_for_hard_module2);
        let m2 = ModuleResult::new(Section::Reading, 22, 27).unwrap();
        assert_eq!(scale_section(&m1, &m2, decision).unwrap().value(), 667);
    }

    #[test]
    fn test_scale_section_rejects_mixed_sections() {
        let m1 = ModuleResult::new(Section::Reading, 20, 27).unwrap();
        let m2 = ModuleResult::new(Section::Math, 10, 22).unwrap();
        let decision = decide(&m1).unwrap();
        assert!(matches!(
            scale_section(&m1, &m2, decision),
            Err(ScoringError::SectionMismatch { .. })
        ));
    }

    #[test]
    fn test_composite_sums_sections() {
        let total = composite(ScaledScore(600), ScaledScore(700));
        assert_eq!(total.value(), 1300);
    }

    #[test]
    fn test_composite_range_is_clamped() {
        assert_eq!(composite(ScaledScore(200), ScaledScore(200)).range(), (400, 500));
        assert_eq!(composite(ScaledScore(800), ScaledScore(780)).range(), (1480, 1600));
        assert_eq!(composite(ScaledScore(600), ScaledScore(700)).range(), (1200, 1400));
    }
}
