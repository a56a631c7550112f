use chrono::Utc;
use rand::Rng;
use thiserror::Error;

use crate::engine::adaptive::DifficultyPool;
use crate::engine::section::Section;
use crate::session::result::{ModuleResult, ScoreBreakdown};
use crate::store::schema::{ModuleEntry, SessionKind, SessionRecord, SessionsData};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("unknown session {0}")]
    UnknownSession(String),

    #[error("module number must be 1 or 2, got {0}")]
    InvalidModuleNumber(u8),

    #[error("{section:?} module {module_number} already recorded")]
    DuplicateModule { section: Section, module_number: u8 },

    #[error("session {0} already has a final score")]
    AlreadyScored(String),

    #[error("session storage failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("session data is malformed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Persistence for practice and test sessions. Implementations own
/// ordering and durability; the scoring engine never touches this.
pub trait SessionStore {
    fn create_session(&mut self, kind: SessionKind) -> Result<String, SessionError>;

    fn record_module_result(
        &mut self,
        session_id: &str,
        module_number: u8,
        result: &ModuleResult,
    ) -> Result<(), SessionError>;

    fn record_module2_pool(
        &mut self,
        session_id: &str,
        section: Section,
        pool: DifficultyPool,
    ) -> Result<(), SessionError>;

    fn record_question_usage(&mut self, session_id: &str, question_ids: &[String]) -> Result<(), SessionError>;

    fn record_final_score(&mut self, session_id: &str, score: ScoreBreakdown) -> Result<(), SessionError>;

    fn session(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError>;

    /// Drop the given sessions; unknown ids are ignored. Returns how many
    /// were removed.
    fn remove_sessions(&mut self, session_ids: &[String]) -> Result<usize, SessionError>;

    fn used_questions(&self, session_id: &str) -> Result<Vec<String>, SessionError> {
        self.session(session_id)?
            .map(|record| record.used_questions)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))
    }
}

/// `session_<unix millis>_<9 base36 chars>`
pub fn generate_session_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("session_{}_{suffix}", Utc::now().timestamp_millis())
}

impl SessionsData {
    fn get_mut(&mut self, session_id: &str) -> Result<&mut SessionRecord, SessionError> {
        self.sessions
            .get_mut(session_id)
            .ok_or_else(|| SessionError::UnknownSession(session_id.to_string()))
    }

    pub fn create(&mut self, kind: SessionKind) -> String {
        let mut id = generate_session_id();
        while self.sessions.contains_key(&id) {
            id = generate_session_id();
        }
        self.sessions.insert(id.clone(), SessionRecord::new(id.clone(), kind));
        id
    }

    pub fn add_module(
        &mut self,
        session_id: &str,
        module_number: u8,
        result: &ModuleResult,
    ) -> Result<(), SessionError> {
        if !(1..=2).contains(&module_number) {
            return Err(SessionError::InvalidModuleNumber(module_number));
        }
        let record = self.get_mut(session_id)?;
        if record.module(result.section(), module_number).is_some() {
            return Err(SessionError::DuplicateModule {
                section: result.section(),
                module_number,
            });
        }
        record.modules.push(ModuleEntry {
            module_number,
            result: *result,
            recorded_at: Utc::now(),
        });
        Ok(())
    }

    pub fn set_pool(&mut self, session_id: &str, section: Section, pool: DifficultyPool) -> Result<(), SessionError> {
        self.get_mut(session_id)?.module2_pools.insert(section, pool);
        Ok(())
    }

    pub fn add_usage(&mut self, session_id: &str, question_ids: &[String]) -> Result<(), SessionError> {
        let record = self.get_mut(session_id)?;
        for id in question_ids {
            if !record.used_questions.contains(id) {
                record.used_questions.push(id.clone());
            }
        }
        Ok(())
    }

    pub fn finish(&mut self, session_id: &str, score: ScoreBreakdown) -> Result<(), SessionError> {
        let record = self.get_mut(session_id)?;
        if record.is_complete() {
            return Err(SessionError::AlreadyScored(session_id.to_string()));
        }
        record.final_score = Some(score);
        record.completed_at = Some(Utc::now());
        Ok(())
    }

    pub fn remove(&mut self, session_ids: &[String]) -> usize {
        session_ids
            .iter()
            .filter(|id| self.sessions.remove(id.as_str()).is_some())
            .count()
    }
}

#[derive(Default)]
pub struct InMemorySessionStore {
    data: SessionsData,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create_session(&mut self, kind: SessionKind) -> Result<String, SessionError> {
        Ok(self.data.create(kind))
    }

    fn record_module_result(
        &mut self,
        session_id: &str,
        module_number: u8,
        result: &ModuleResult,
    ) -> Result<(), SessionError> {
        self.data.add_module(session_id, module_number, result)
    }

    fn record_module2_pool(
        &mut self,
        session_id: &str,
        section: Section,
        pool: DifficultyPool,
    ) -> Result<(), SessionError> {
        self.data.set_pool(session_id, section, pool)
    }

    fn record_question_usage(&mut self, session_id: &str, question_ids: &[String]) -> Result<(), SessionError> {
        self.data.add_usage(session_id, question_ids)
    }

    fn record_final_score(&mut self, session_id: &str, score: ScoreBreakdown) -> Result<(), SessionError> {
        self.data.finish(session_id, score)
    }

    fn session(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.data.sessions.get(session_id).cloned())
    }

    fn remove_sessions(&mut self, session_ids: &[String]) -> Result<usize, SessionError> {
        Ok(self.data.remove(session_ids))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(raw: u32) -> ModuleResult {
        ModuleResult::new(Section::Reading, raw, 27).unwrap()
    }

    #[test]
    fn test_session_id_format() {
        let id = generate_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2].chars().all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }

    #[test]
    fn test_records_modules_and_score() {
        let mut store = InMemorySessionStore::new();
        let id = store.create_session(SessionKind::FullTest).unwrap();
        store.record_module_result(&id, 1, &reading(20)).unwrap();
        store.record_module2_pool(&id, Section::Reading, DifficultyPool::HARD).unwrap();
        store.record_module_result(&id, 2, &reading(22)).unwrap();
        store
            .record_final_score(
                &id,
                ScoreBreakdown {
                    reading: Some(667),
                    ..Default::default()
                },
            )
            .unwrap();

        let record = store.session(&id).unwrap().unwrap();
        assert_eq!(record.modules.len(), 2);
        assert_eq!(record.module(Section::Reading, 2).map(|m| m.raw_score()), Some(22));
        assert_eq!(record.module2_pools.get(&Section::Reading), Some(&DifficultyPool::HARD));
        assert!(record.is_complete());
        assert!(record.completed_at.is_some());
    }

    #[test]
    fn test_rejects_bad_module_number_and_duplicates() {
        let mut store = InMemorySessionStore::new();
        let id = store.create_session(SessionKind::Sectional).unwrap();
        assert!(matches!(
            store.record_module_result(&id, 3, &reading(1)),
            Err(SessionError::InvalidModuleNumber(3))
        ));
        store.record_module_result(&id, 1, &reading(1)).unwrap();
        assert!(matches!(
            store.record_module_result(&id, 1, &reading(2)),
            Err(SessionError::DuplicateModule { .. })
        ));
    }

    #[test]
    fn test_final_score_is_written_once() {
        let mut store = InMemorySessionStore::new();
        let id = store.create_session(SessionKind::Sectional).unwrap();
        store.record_final_score(&id, ScoreBreakdown::default()).unwrap();
        assert!(matches!(
            store.record_final_score(&id, ScoreBreakdown::default()),
            Err(SessionError::AlreadyScored(_))
        ));
    }

    #[test]
    fn test_question_usage_accumulates() {
        let mut store = InMemorySessionStore::new();
        let id = store.create_session(SessionKind::Sectional).unwrap();
        store.record_question_usage(&id, &["q1".to_string(), "q2".to_string()]).unwrap();
        store.record_question_usage(&id, &["q3".to_string()]).unwrap();
        assert_eq!(store.used_questions(&id).unwrap(), vec!["q1", "q2", "q3"]);
        assert!(matches!(
            store.used_questions("nope"),
            Err(SessionError::UnknownSession(_))
        ));
    }

    #[test]
    fn test_unknown_session_is_an_error() {
        let mut store = InMemorySessionStore::new();
        assert!(matches!(
            store.record_question_usage("nope", &["q1".to_string()]),
            Err(SessionError::UnknownSession(_))
        ));
        assert!(store.session("nope").unwrap().is_none());
    }

    #[test]
    fn test_usage_is_deduplicated() {
        let mut store = InMemorySessionStore::new();
        let id = store.create_session(SessionKind::Sectional).unwrap();
        store
            .record_question_usage(&id, &["a".to_string(), "b".to_string()])
            .unwrap();
        store.record_question_usage(&id, &["b".to_string(), "c".to_string()]).unwrap();
        let record = store.session(&id).unwrap().unwrap();
        assert_eq!(record.used_questions, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_remove_sessions_ignores_unknown_ids() {
        let mut store = InMemorySessionStore::new();
        let keep = store.create_session(SessionKind::Sectional).unwrap();
        let drop = store.create_session(SessionKind::Daily).unwrap();
        let removed = store.remove_sessions(&[drop.clone(), "nope".to_string()]).unwrap();
        assert_eq!(removed, 1);
        assert!(store.session(&drop).unwrap().is_none());
        assert!(store.session(&keep).unwrap().is_some());
        assert_eq!(store.remove_sessions(&[]).unwrap(), 0);
    }
}
