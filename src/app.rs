use std::collections::HashSet;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::bank::question::Question;
use crate::bank::repository::QuestionRepository;
use crate::bank::selection::{DAILY_QUESTIONS, PracticeRequest, daily_questions, practice_questions};
use crate::config::Config;
use crate::engine::scaling::CompositeScore;
use crate::engine::section::Section;
use crate::progress::diagnostics::DiagnosticReport;
use crate::progress::streak::StreakUpdate;
use crate::progress::xp;
use crate::session::attempt::FullTestAttempt;
use crate::session::full_test::FullTestRun;
use crate::session::result::{ScoreBreakdown, SectionScope, TestKind, TestResult};
use crate::store::json_store::JsonStore;
use crate::store::schema::{ExportData, HistoryData, ProfileData, SessionKind};
use crate::store::session_store::SessionStore;

pub struct FullTestReport {
    pub session_id: String,
    pub attempt: FullTestAttempt,
    pub composite: CompositeScore,
    pub xp_earned: u32,
}

/// Questions handed out for practice or the daily challenge, tied to the
/// session that records their use.
pub struct PracticeSet {
    pub session_id: String,
    pub kind: TestKind,
    pub scope: SectionScope,
    pub domain: Option<String>,
    pub questions: Vec<Question>,
}

pub struct App {
    pub config: Config,
    pub store: JsonStore,
    pub profile: ProfileData,
    pub history: Vec<TestResult>,
}

impl App {
    pub fn open(config: Config) -> Result<Self> {
        let store = JsonStore::new(config.data_path())
            .with_context(|| format!("cannot open data directory {}", config.data_dir))?;
        if store.check_interrupted_import() {
            warn!("previous import was interrupted; leftover backups removed");
        }
        let (profile, history) = Self::load_progress(&store);

        Ok(Self {
            config,
            store,
            profile,
            history,
        })
    }

    fn load_progress(store: &JsonStore) -> (ProfileData, Vec<TestResult>) {
        match store.load_profile() {
            Some(profile) if !profile.needs_reset() => (profile, store.load_history().results),
            _ => {
                warn!("profile missing or from an older schema, starting fresh");
                (ProfileData::default(), Vec::new())
            }
        }
    }

    pub fn save_data(&self) -> Result<()> {
        self.store.save_profile(&self.profile)?;
        self.store.save_history(&HistoryData {
            results: self.history.clone(),
            ..HistoryData::default()
        })?;
        Ok(())
    }

    /// Award XP (including any streak bonus) and update level, badge and
    /// streak. Returns the XP earned.
    fn apply_result(profile: &mut ProfileData, result: &mut TestResult) -> u32 {
        let update = profile.streak.record(result.completed_at.date_naive());
        let bonus = if update == StreakUpdate::Extended {
            xp::streak_bonus(profile.streak.days)
        } else {
            0
        };
        let earned = xp::xp_for_result(result.total_questions, result.correct_answers, result.kind) + bonus;
        result.xp_earned = earned;
        profile.add_xp(earned);
        profile.total_tests += 1;
        earned
    }

    /// Sessions belong to history entries; once an entry is gone so is its
    /// session.
    fn prune_sessions<'a>(&mut self, removed: impl IntoIterator<Item = &'a TestResult>) -> Result<()> {
        let ids: Vec<String> = removed.into_iter().filter_map(|r| r.session_id.clone()).collect();
        let pruned = self.store.remove_sessions(&ids)?;
        if pruned > 0 {
            debug!(pruned, "removed sessions of dropped results");
        }
        Ok(())
    }

    pub fn record_result(&mut self, mut result: TestResult) -> Result<u32> {
        let earned = Self::apply_result(&mut self.profile, &mut result);
        info!(
            kind = result.kind.as_str(),
            correct = result.correct_answers,
            total = result.total_questions,
            xp = earned,
            "recorded result"
        );
        self.history.push(result);
        let mut trimmed = Vec::new();
        if self.history.len() > self.config.history_limit {
            let excess = self.history.len() - self.config.history_limit;
            trimmed.extend(self.history.drain(..excess));
        }
        self.save_data()?;
        self.prune_sessions(&trimmed)?;
        Ok(earned)
    }

    /// Recompute the profile by replaying history oldest to newest.
    pub fn rebuild_from_history(&mut self) {
        self.history.sort_by_key(|r| r.completed_at);
        let mut profile = ProfileData::default();
        for result in &mut self.history {
            Self::apply_result(&mut profile, result);
        }
        self.profile = profile;
    }

    pub fn delete_result(&mut self, id: &str) -> Result<bool> {
        let Some(pos) = self.history.iter().position(|r| r.id == id) else {
            return Ok(false);
        };
        let removed = self.history.remove(pos);
        self.rebuild_from_history();
        self.save_data()?;
        self.prune_sessions([&removed])?;
        Ok(true)
    }

    /// Write a scored attempt as a full-test session and a history entry.
    fn record_attempt(
        &mut self,
        attempt: FullTestAttempt,
        used_questions: &[String],
        time_spent_secs: u64,
    ) -> Result<FullTestReport> {
        let composite = attempt.composite()?;

        let session_id = self.store.create_session(SessionKind::FullTest)?;
        for &section in Section::all() {
            let sa = attempt.section(section);
            let (Some(one), Some(two), Some(pool)) = (sa.module_one(), sa.module_two(), sa.pool()) else {
                continue;
            };
            self.store.record_module_result(&session_id, 1, one)?;
            self.store.record_module2_pool(&session_id, section, pool)?;
            self.store.record_module_result(&session_id, 2, two)?;
        }
        if !used_questions.is_empty() {
            self.store.record_question_usage(&session_id, used_questions)?;
        }

        let breakdown = ScoreBreakdown {
            reading: attempt.reading().scaled().map(|s| s.value()),
            math: attempt.math().scaled().map(|s| s.value()),
            total: Some(composite.value()),
        };
        self.store.record_final_score(&session_id, breakdown)?;

        let total_questions: u32 = Section::all().iter().map(|s| s.config().max_raw()).sum();
        let correct = attempt.reading().raw_total() + attempt.math().raw_total();
        let result = TestResult::new(TestKind::Full, SectionScope::Both, total_questions, correct)
            .with_score(breakdown)
            .with_time_spent(time_spent_secs)
            .with_session(&session_id);
        let xp_earned = self.record_result(result)?;

        Ok(FullTestReport {
            session_id,
            attempt,
            composite,
            xp_earned,
        })
    }

    /// Score and record a full test given `(module 1, module 2)` raw counts
    /// per section. Nothing is written unless every module validates.
    pub fn record_full_test(&mut self, reading: (u32, u32), math: (u32, u32)) -> Result<FullTestReport> {
        let attempt = FullTestAttempt::run(reading, math)?;
        self.record_attempt(attempt, &[], 0)
    }

    /// Record a test taken from the question bank. An unfinished run is an
    /// error and writes nothing.
    pub fn record_adaptive_test(&mut self, run: FullTestRun, now: Instant) -> Result<FullTestReport> {
        let time_spent = run.elapsed(now).as_secs();
        let (attempt, used) = run.finish()?;
        self.record_attempt(attempt, &used, time_spent)
    }

    fn open_set(
        &mut self,
        session_kind: SessionKind,
        kind: TestKind,
        scope: SectionScope,
        domain: Option<String>,
        questions: Vec<Question>,
    ) -> Result<PracticeSet> {
        let session_id = self.store.create_session(session_kind)?;
        let ids: Vec<String> = questions.iter().map(|q| q.id.clone()).collect();
        self.store.record_question_usage(&session_id, &ids)?;
        Ok(PracticeSet {
            session_id,
            kind,
            scope,
            domain,
            questions,
        })
    }

    /// Draw a practice set. The session is created only once questions are
    /// in hand.
    pub fn start_practice<R: QuestionRepository + ?Sized>(
        &mut self,
        repo: &mut R,
        request: &PracticeRequest<'_>,
    ) -> Result<PracticeSet> {
        if request.count == 0 {
            bail!("a practice set needs at least one question");
        }
        let questions = practice_questions(repo, request, &HashSet::new())?;
        if questions.is_empty() {
            bail!("no {} questions match the request", request.section.to_key());
        }
        self.open_set(
            SessionKind::Sectional,
            TestKind::Sectional,
            request.section.into(),
            request.domain.map(str::to_string),
            questions,
        )
    }

    pub fn daily_done(&self, today: NaiveDate) -> bool {
        self.history
            .iter()
            .any(|r| r.kind == TestKind::Daily && r.completed_at.date_naive() == today)
    }

    /// The daily challenge: a short mixed set, once per calendar day.
    pub fn start_daily<R: QuestionRepository + ?Sized>(&mut self, repo: &mut R, today: NaiveDate) -> Result<PracticeSet> {
        if self.daily_done(today) {
            bail!("today's daily challenge is already complete");
        }
        let questions = daily_questions(repo, DAILY_QUESTIONS, &HashSet::new())?;
        self.open_set(SessionKind::Daily, TestKind::Daily, SectionScope::Both, None, questions)
    }

    /// A new sectional set of the questions `report` marks incorrect, or
    /// None when everything was right.
    pub fn retry_incorrect(&mut self, set: &PracticeSet, report: &DiagnosticReport) -> Result<Option<PracticeSet>> {
        let questions: Vec<Question> = report
            .incorrect
            .iter()
            .filter_map(|&i| set.questions.get(i).cloned())
            .collect();
        if questions.is_empty() {
            return Ok(None);
        }
        let retry = self.open_set(
            SessionKind::Sectional,
            TestKind::Sectional,
            set.scope,
            set.domain.clone(),
            questions,
        )?;
        Ok(Some(retry))
    }

    /// Grade a practice set. `answers` lines up with `set.questions`;
    /// missing or skipped answers count as wrong.
    pub fn finish_practice(
        &mut self,
        set: &PracticeSet,
        answers: &[Option<usize>],
        time_spent_secs: u64,
    ) -> Result<TestResult> {
        if set.questions.is_empty() {
            bail!("cannot grade an empty question set");
        }
        let correct = set
            .questions
            .iter()
            .enumerate()
            .filter(|(i, q)| answers.get(*i).copied().flatten().is_some_and(|a| q.is_correct(a)))
            .count() as u32;
        let total = set.questions.len() as u32;

        self.store.record_final_score(&set.session_id, ScoreBreakdown::default())?;

        let mut result = TestResult::new(set.kind, set.scope, total, correct)
            .with_time_spent(time_spent_secs)
            .with_session(&set.session_id);
        if let Some(domain) = &set.domain {
            result = result.with_domain(domain);
        }
        result.xp_earned = self.record_result(result.clone())?;
        Ok(result)
    }

    /// Replace saved data with an export and take on its settings, keeping
    /// this machine's data directory.
    pub fn import_data(&mut self, data: &ExportData) -> Result<()> {
        self.store.import_all(data)?;
        let (profile, history) = Self::load_progress(&self.store);
        self.profile = profile;
        self.history = history;
        self.config.apply_imported(&data.config);
        info!(results = self.history.len(), "imported data");
        Ok(())
    }
}
