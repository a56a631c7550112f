use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::engine::adaptive::Difficulty;

pub const MAX_PRACTICE_QUESTIONS: usize = 50;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_user_name")]
    pub user_name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default)]
    pub question_bank: Option<String>,
    #[serde(default = "default_practice_question_count")]
    pub practice_question_count: usize,
    #[serde(default = "default_practice_difficulty")]
    pub practice_difficulty: Difficulty,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_user_name() -> String {
    "Student".to_string()
}
fn default_data_dir() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("satprep")
        .to_string_lossy()
        .to_string()
}
fn default_practice_question_count() -> usize {
    10
}
fn default_practice_difficulty() -> Difficulty {
    Difficulty::Medium
}
fn default_history_limit() -> usize {
    500
}

impl Default for Config {
    fn default() -> Self {
        Self {
            user_name: default_user_name(),
            data_dir: default_data_dir(),
            question_bank: None,
            practice_question_count: default_practice_question_count(),
            practice_difficulty: default_practice_difficulty(),
            history_limit: default_history_limit(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            let mut config: Config = toml::from_str(&content)?;
            config.normalize();
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("satprep")
            .join("config.toml")
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir)
    }

    /// Pull out-of-range values from hand-edited files back into range.
    pub fn normalize(&mut self) {
        self.practice_question_count = self.practice_question_count.clamp(1, MAX_PRACTICE_QUESTIONS);
        self.history_limit = self.history_limit.max(1);
    }

    /// Take the settings of an imported export, keeping this machine's data
    /// directory.
    pub fn apply_imported(&mut self, imported: &Config) {
        let data_dir = std::mem::take(&mut self.data_dir);
        *self = imported.clone();
        self.data_dir = data_dir;
        self.normalize();
    }
}
