use serde::{Deserialize, Serialize};

use crate::engine::adaptive::{AdaptiveDecision, DifficultyPool, decide, select_pool};
use crate::engine::error::ScoringError;
use crate::engine::scaling::{CompositeScore, ScaledScore, composite, scale_section};
use crate::engine::section::Section;
use crate::session::result::ModuleResult;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SectionState {
    NotStarted,
    Module1InProgress,
    Module1Submitted,
    Module2InProgress,
    Module2Submitted,
    Scored,
}

impl SectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SectionState::NotStarted => "not started",
            SectionState::Module1InProgress => "in module 1",
            SectionState::Module1Submitted => "module 1 submitted",
            SectionState::Module2InProgress => "in module 2",
            SectionState::Module2Submitted => "module 2 submitted",
            SectionState::Scored => "scored",
        }
    }
}

/// One attempt at one section. Moves strictly forward; once `Scored` the
/// attempt is frozen and a retry needs a fresh `SectionAttempt`.
#[derive(Clone, Debug)]
pub struct SectionAttempt {
    section: Section,
    state: SectionState,
    module_one: Option<ModuleResult>,
    decision: Option<AdaptiveDecision>,
    module_two: Option<ModuleResult>,
    score: Option<ScaledScore>,
}

impl SectionAttempt {
    pub fn new(section: Section) -> Self {
        Self {
            section,
            state: SectionState::NotStarted,
            module_one: None,
            decision: None,
            module_two: None,
            score: None,
        }
    }

    pub fn section(&self) -> Section {
        self.section
    }

    pub fn state(&self) -> SectionState {
        self.state
    }

    pub fn module_one(&self) -> Option<&ModuleResult> {
        self.module_one.as_ref()
    }

    pub fn module_two(&self) -> Option<&ModuleResult> {
        self.module_two.as_ref()
    }

    pub fn decision(&self) -> Option<AdaptiveDecision> {
        self.decision
    }

    pub fn pool(&self) -> Option<DifficultyPool> {
        self.decision.map(select_pool)
    }

    pub fn scaled(&self) -> Option<ScaledScore> {
        self.score
    }

    pub fn raw_total(&self) -> u32 {
        self.module_one.map_or(0, |m| m.raw_score()) + self.module_two.map_or(0, |m| m.raw_score())
    }

    fn expect_state(&self, expected: SectionState, action: &'static str) -> Result<(), ScoringError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(ScoringError::InvalidTransition {
                action,
                state: self.state.as_str(),
            })
        }
    }

    fn expect_section(&self, result: &ModuleResult) -> Result<(), ScoringError> {
        if result.section() == self.section {
            Ok(())
        } else {
            Err(ScoringError::SectionMismatch {
                expected: self.section,
                actual: result.section(),
            })
        }
    }

    pub fn start_module1(&mut self) -> Result<(), ScoringError> {
        self.expect_state(SectionState::NotStarted, "start module 1")?;
        self.state = SectionState::Module1InProgress;
        Ok(())
    }

    /// Record Module 1 and fix the adaptive decision for this attempt.
    pub fn submit_module1(&mut self, result: ModuleResult) -> Result<AdaptiveDecision, ScoringError> {
        self.expect_state(SectionState::Module1InProgress, "submit module 1")?;
        self.expect_section(&result)?;
        let decision = decide(&result)?;
        self.module_one = Some(result);
        self.decision = Some(decision);
        self.state = SectionState::Module1Submitted;
        Ok(decision)
    }

    pub fn start_module2(&mut self) -> Result<DifficultyPool, ScoringError> {
        self.expect_state(SectionState::Module1Submitted, "start module 2")?;
        let decision = self.decision.ok_or(ScoringError::InvalidTransition {
            action: "start module 2",
            state: self.state.as_str(),
        })?;
        self.state = SectionState::Module2InProgress;
        Ok(select_pool(decision))
    }

    pub fn submit_module2(&mut self, result: ModuleResult) -> Result<(), ScoringError> {
        self.expect_state(SectionState::Module2InProgress, "submit module 2")?;
        self.expect_section(&result)?;
        self.module_two = Some(result);
        self.state = SectionState::Module2Submitted;
        Ok(())
    }

    pub fn score(&mut self) -> Result<ScaledScore, ScoringError> {
        self.expect_state(SectionState::Module2Submitted, "score section")?;
        let (Some(one), Some(two), Some(decision)) = (self.module_one, self.module_two, self.decision) else {
            return Err(ScoringError::InvalidTransition {
                action: "score section",
                state: self.state.as_str(),
            });
        };
        let scaled = scale_section(&one, &two, decision)?;
        self.score = Some(scaled);
        self.state = SectionState::Scored;
        Ok(scaled)
    }

    /// Drive the attempt through every transition from raw module counts.
    pub fn run(section: Section, module_one_raw: u32, module_two_raw: u32) -> Result<Self, ScoringError> {
        let size = section.config().module_size;
        let mut attempt = Self::new(section);
        attempt.start_module1()?;
        attempt.submit_module1(ModuleResult::new(section, module_one_raw, size)?)?;
        attempt.start_module2()?;
        attempt.submit_module2(ModuleResult::new(section, module_two_raw, size)?)?;
        attempt.score()?;
        Ok(attempt)
    }
}

// --- Full test ---

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FullTestPhase {
    Reading,
    Break,
    Math,
    Complete,
}

/// Reading then math, with a break in between.
#[derive(Clone, Debug)]
pub struct FullTestAttempt {
    reading: SectionAttempt,
    math: SectionAttempt,
    break_taken: bool,
}

impl Default for FullTestAttempt {
    fn default() -> Self {
        Self::new()
    }
}

impl FullTestAttempt {
    pub fn new() -> Self {
        Self {
            reading: SectionAttempt::new(Section::Reading),
            math: SectionAttempt::new(Section::Math),
            break_taken: false,
        }
    }

    /// Score a whole test from `(module 1, module 2)` raw counts per section.
    pub fn run(reading: (u32, u32), math: (u32, u32)) -> Result<Self, ScoringError> {
        Ok(Self {
            reading: SectionAttempt::run(Section::Reading, reading.0, reading.1)?,
            math: SectionAttempt::run(Section::Math, math.0, math.1)?,
            break_taken: true,
        })
    }

    pub fn reading(&self) -> &SectionAttempt {
        &self.reading
    }

    pub fn math(&self) -> &SectionAttempt {
        &self.math
    }

    pub fn phase(&self) -> FullTestPhase {
        match (self.reading.state(), self.math.state()) {
            (SectionState::Scored, SectionState::Scored) => FullTestPhase::Complete,
            (SectionState::Scored, SectionState::NotStarted) if !self.break_taken => FullTestPhase::Break,
            (SectionState::Scored, _) => FullTestPhase::Math,
            _ => FullTestPhase::Reading,
        }
    }

    /// End the break early (or on timeout) and move on to math.
    pub fn end_break(&mut self) {
        if self.phase() == FullTestPhase::Break {
            self.break_taken = true;
        }
    }

    pub fn current_mut(&mut self) -> Option<&mut SectionAttempt> {
        match self.phase() {
            FullTestPhase::Reading => Some(&mut self.reading),
            FullTestPhase::Math => Some(&mut self.math),
            FullTestPhase::Break | FullTestPhase::Complete => None,
        }
    }

    pub fn section(&self, section: Section) -> &SectionAttempt {
        match section {
            Section::Reading => &self.reading,
            Section::Math => &self.math,
        }
    }

    pub fn composite(&self) -> Result<CompositeScore, ScoringError> {
        let reading = self
            .reading
            .scaled()
            .ok_or(ScoringError::SectionNotScored(Section::Reading))?;
        let math = self.math.scaled().ok_or(ScoringError::SectionNotScored(Section::Math))?;
        Ok(composite(reading, math))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::adaptive::Difficulty;

    fn reading(raw: u32) -> ModuleResult {
        ModuleResult::new(Section::Reading, raw, 27).unwrap()
    }

    fn math(raw: u32) -> ModuleResult {
        ModuleResult::new(Section::Math, raw, 22).unwrap()
    }

    #[test]
    fn test_walks_every_state() {
        let mut attempt = SectionAttempt::new(Section::Reading);
        assert_eq!(attempt.state(), SectionState::NotStarted);
        attempt.start_module1().unwrap();
        assert_eq!(attempt.state(), SectionState::Module1InProgress);
        let decision = attempt.submit_module1(reading(20)).unwrap();
        assert!(decision.qualifies_for_hard_module2);
        assert_eq!(attempt.state(), SectionState::Module1Submitted);
        let pool = attempt.start_module2().unwrap();
        assert_eq!(pool.primary, Difficulty::Hard);
        assert_eq!(attempt.state(), SectionState::Module2InProgress);
        attempt.submit_module2(reading(22)).unwrap();
        assert_eq!(attempt.state(), SectionState::Module2Submitted);
        assert_eq!(attempt.score().unwrap().value(), 667);
        assert_eq!(attempt.state(), SectionState::Scored);
        assert_eq!(attempt.raw_total(), 42);
    }

    #[test]
    fn test_scored_is_terminal() {
        let mut attempt = SectionAttempt::run(Section::Math, 10, 10).unwrap();
        assert!(matches!(attempt.score(), Err(ScoringError::InvalidTransition { .. })));
        assert!(matches!(attempt.start_module1(), Err(ScoringError::InvalidTransition { .. })));
        assert!(attempt.submit_module2(math(22)).is_err());
    }

    #[test]
    fn test_decision_is_not_recomputed() {
        let mut attempt = SectionAttempt::new(Section::Math);
        attempt.start_module1().unwrap();
        attempt.submit_module1(math(10)).unwrap();
        assert!(attempt.submit_module1(math(22)).is_err());
        assert_eq!(attempt.decision().map(|d| d.qualifies_for_hard_module2), Some(false));
    }

    #[test]
    fn test_out_of_order_calls_rejected() {
        let mut attempt = SectionAttempt::new(Section::Reading);
        assert!(attempt.submit_module1(reading(10)).is_err());
        assert!(attempt.start_module2().is_err());
        assert_eq!(attempt.state(), SectionState::NotStarted);
    }

    #[test]
    fn test_wrong_section_module_rejected() {
        let mut attempt = SectionAttempt::new(Section::Reading);
        attempt.start_module1().unwrap();
        assert!(matches!(
            attempt.submit_module1(math(20)),
            Err(ScoringError::SectionMismatch { .. })
        ));
        assert_eq!(attempt.state(), SectionState::Module1InProgress);
    }

    #[test]
    fn test_easy_path_scores_with_penalty() {
        let attempt = SectionAttempt::run(Section::Math, 14, 22).unwrap();
        assert_eq!(attempt.pool(), Some(DifficultyPool::EASY));
        // base = 200 + 36/44 * 600 = 690.9 -> 560.9 -> 561
        assert_eq!(attempt.scaled().map(|s| s.value()), Some(561));
    }

    #[test]
    fn test_full_test_phases_and_composite() {
        let mut test = FullTestAttempt::new();
        assert_eq!(test.phase(), FullTestPhase::Reading);
        assert!(matches!(
            test.composite(),
            Err(ScoringError::SectionNotScored(Section::Reading))
        ));

        let reading_attempt = test.current_mut().unwrap();
        assert_eq!(reading_attempt.section(), Section::Reading);
        reading_attempt.start_module1().unwrap();
        reading_attempt.submit_module1(reading(20)).unwrap();
        reading_attempt.start_module2().unwrap();
        reading_attempt.submit_module2(reading(22)).unwrap();
        reading_attempt.score().unwrap();
        assert_eq!(test.phase(), FullTestPhase::Break);
        assert!(test.current_mut().is_none());
        test.end_break();
        assert_eq!(test.phase(), FullTestPhase::Math);

        let math = test.current_mut().unwrap();
        math.start_module1().unwrap();
        math.submit_module1(ModuleResult::new(Section::Math, 15, 22).unwrap()).unwrap();
        math.start_module2().unwrap();
        math.submit_module2(ModuleResult::new(Section::Math, 18, 22).unwrap()).unwrap();
        assert!(matches!(
            test.composite(),
            Err(ScoringError::SectionNotScored(Section::Math))
        ));
        test.current_mut().unwrap().score().unwrap();

        assert_eq!(test.phase(), FullTestPhase::Complete);
        // reading 667; math 33/44 -> 650
        assert_eq!(test.composite().unwrap().value(), 667 + 650);
    }

    #[test]
    fn test_math_is_unreachable_before_reading_and_break() {
        let mut test = FullTestAttempt::new();
        assert_eq!(test.current_mut().map(|a| a.section()), Some(Section::Reading));
        test.end_break();
        assert_eq!(test.phase(), FullTestPhase::Reading);
        assert_eq!(test.math().state(), SectionState::NotStarted);
    }

    #[test]
    fn test_full_test_run_matches_stepwise() {
        let test = FullTestAttempt::run((20, 22), (15, 18)).unwrap();
        assert_eq!(test.phase(), FullTestPhase::Complete);
        assert_eq!(test.composite().unwrap().value(), 1317);
    }

    #[test]
    fn test_full_test_run_rejects_invalid_raw() {
        assert!(matches!(
            FullTestAttempt::run((20, 28), (15, 18)),
            Err(ScoringError::RawExceedsTotal { raw: 28, total: 27 })
        ));
    }
}
