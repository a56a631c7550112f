use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use chrono::Utc;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::config::Config;
use crate::engine::adaptive::DifficultyPool;
use crate::engine::section::Section;
use crate::session::result::{ModuleResult, ScoreBreakdown};
use crate::store::schema::{
    EXPORT_VERSION, ExportData, HistoryData, ProfileData, SessionKind, SessionRecord, SessionsData,
};
use crate::store::session_store::{SessionError, SessionStore};

const PROFILE_FILE: &str = "profile.json";
const HISTORY_FILE: &str = "history.json";
const SESSIONS_FILE: &str = "sessions.json";
const DATA_FILES: [&str; 3] = [PROFILE_FILE, HISTORY_FILE, SESSIONS_FILE];

pub struct JsonStore {
    base_dir: PathBuf,
}

impl JsonStore {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&base_dir)?;
        debug!(dir = %base_dir.display(), "opened data store");
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Missing or unreadable files fall back to defaults.
    fn load<T: DeserializeOwned + Default>(&self, name: &str) -> T {
        let path = self.file_path(name);
        if !path.exists() {
            return T::default();
        }
        match fs::read_to_string(&path).map(|content| serde_json::from_str(&content)) {
            Ok(Ok(data)) => data,
            Ok(Err(e)) => {
                warn!(file = name, error = %e, "discarding unparseable data file");
                T::default()
            }
            Err(e) => {
                warn!(file = name, error = %e, "failed to read data file");
                T::default()
            }
        }
    }

    fn write_atomic(&self, name: &str, json: &str) -> io::Result<()> {
        let path = self.file_path(name);
        let tmp_path = path.with_extension("tmp");
        let mut file = fs::File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, &path)
    }

    fn save<T: Serialize>(&self, name: &str, data: &T) -> Result<()> {
        let json = serde_json::to_string_pretty(data)?;
        self.write_atomic(name, &json)?;
        Ok(())
    }

    /// Returns None if the file exists but cannot be parsed.
    pub fn load_profile(&self) -> Option<ProfileData> {
        let path = self.file_path(PROFILE_FILE);
        if path.exists() {
            let content = fs::read_to_string(&path).ok()?;
            serde_json::from_str(&content).ok()
        } else {
            Some(ProfileData::default())
        }
    }

    pub fn save_profile(&self, data: &ProfileData) -> Result<()> {
        self.save(PROFILE_FILE, data)
    }

    pub fn load_history(&self) -> HistoryData {
        self.load(HISTORY_FILE)
    }

    pub fn save_history(&self, data: &HistoryData) -> Result<()> {
        self.save(HISTORY_FILE, data)
    }

    pub fn load_sessions(&self) -> SessionsData {
        self.load(SESSIONS_FILE)
    }

    /// Strict variant for session writes: a corrupt file is an error rather
    /// than silently replaced.
    fn read_sessions(&self) -> Result<SessionsData, SessionError> {
        let path = self.file_path(SESSIONS_FILE);
        if !path.exists() {
            return Ok(SessionsData::default());
        }
        let content = fs::read_to_string(&path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn update_sessions<T>(
        &self,
        f: impl FnOnce(&mut SessionsData) -> Result<T, SessionError>,
    ) -> Result<T, SessionError> {
        let mut data = self.read_sessions()?;
        let out = f(&mut data)?;
        let json = serde_json::to_string_pretty(&data)?;
        self.write_atomic(SESSIONS_FILE, &json)?;
        Ok(out)
    }

    pub fn export_all(&self, config: &Config) -> ExportData {
        ExportData {
            satprep_export_version: EXPORT_VERSION,
            exported_at: Utc::now(),
            config: config.clone(),
            profile: self.load_profile().unwrap_or_default(),
            history: self.load_history(),
            sessions: self.load_sessions(),
        }
    }

    /// Stage every file as `.tmp`, then swap each into place keeping a
    /// `.bak` of the original. Any failure restores what was there before.
    pub fn import_all(&self, data: &ExportData) -> Result<()> {
        if data.satprep_export_version != EXPORT_VERSION {
            bail!(
                "Unsupported export version: {} (expected {})",
                data.satprep_export_version,
                EXPORT_VERSION
            );
        }

        let files = [
            (PROFILE_FILE, serde_json::to_string_pretty(&data.profile)?),
            (HISTORY_FILE, serde_json::to_string_pretty(&data.history)?),
            (SESSIONS_FILE, serde_json::to_string_pretty(&data.sessions)?),
        ];

        let mut staged: Vec<PathBuf> = Vec::new();
        for (name, json) in &files {
            let tmp_path = self.file_path(name).with_extension("json.tmp");
            let written = fs::File::create(&tmp_path).and_then(|mut file| {
                file.write_all(json.as_bytes())?;
                file.sync_all()
            });
            if let Err(e) = written {
                for tmp in &staged {
                    let _ = fs::remove_file(tmp);
                }
                bail!("Import failed during staging: {e}");
            }
            staged.push(tmp_path);
        }

        // (final, bak, had_original)
        let mut committed: Vec<(PathBuf, PathBuf, bool)> = Vec::new();
        let rollback = |committed: &[(PathBuf, PathBuf, bool)], leftover: &[PathBuf]| {
            for (final_path, bak_path, had_original) in committed {
                if *had_original {
                    let _ = fs::rename(bak_path, final_path);
                } else {
                    let _ = fs::remove_file(final_path);
                }
            }
            for tmp in leftover {
                let _ = fs::remove_file(tmp);
            }
        };

        for (i, (name, _)) in files.iter().enumerate() {
            let final_path = self.file_path(name);
            let bak_path = final_path.with_extension("json.bak");
            let had_original = final_path.exists();

            if had_original && let Err(e) = fs::rename(&final_path, &bak_path) {
                rollback(&committed, &staged);
                bail!("Import failed during commit (backup): {e}");
            }

            if let Err(e) = fs::rename(&staged[i], &final_path) {
                if had_original {
                    let _ = fs::rename(&bak_path, &final_path);
                }
                rollback(&committed, &staged[i..]);
                bail!("Import failed during commit (rename): {e}");
            }

            committed.push((final_path, bak_path, had_original));
        }

        for (_, bak_path, had_original) in &committed {
            if *had_original {
                let _ = fs::remove_file(bak_path);
            }
        }
        debug!(results = data.history.results.len(), "import committed");
        Ok(())
    }

    /// Clean up `.bak` files left by an interrupted import. Returns true if
    /// any were found.
    pub fn check_interrupted_import(&self) -> bool {
        let mut found = false;
        for name in DATA_FILES {
            let bak_path = self.file_path(name).with_extension("json.bak");
            if bak_path.exists() {
                found = true;
                warn!(file = %bak_path.display(), "removing leftover import backup");
                let _ = fs::remove_file(&bak_path);
            }
        }
        found
    }
}

impl SessionStore for JsonStore {
    fn create_session(&mut self, kind: SessionKind) -> Result<String, SessionError> {
        self.update_sessions(|data| Ok(data.create(kind)))
    }

    fn record_module_result(
        &mut self,
        session_id: &str,
        module_number: u8,
        result: &ModuleResult,
    ) -> Result<(), SessionError> {
        self.update_sessions(|data| data.add_module(session_id, module_number, result))
    }

    fn record_module2_pool(
        &mut self,
        session_id: &str,
        section: Section,
        pool: DifficultyPool,
    ) -> Result<(), SessionError> {
        self.update_sessions(|data| data.set_pool(session_id, section, pool))
    }

    fn record_question_usage(&mut self, session_id: &str, question_ids: &[String]) -> Result<(), SessionError> {
        self.update_sessions(|data| data.add_usage(session_id, question_ids))
    }

    fn record_final_score(&mut self, session_id: &str, score: ScoreBreakdown) -> Result<(), SessionError> {
        self.update_sessions(|data| data.finish(session_id, score))
    }

    fn session(&self, session_id: &str) -> Result<Option<SessionRecord>, SessionError> {
        Ok(self.read_sessions()?.sessions.get(session_id).cloned())
    }

    fn remove_sessions(&mut self, session_ids: &[String]) -> Result<usize, SessionError> {
        if session_ids.is_empty() {
            return Ok(0);
        }
        let removed = self.update_sessions(|data| Ok(data.remove(session_ids)))?;
        debug!(removed, "pruned sessions");
        Ok(removed)
    }
}
