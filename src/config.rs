use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables for the progression, grading and remediation algorithms. Always
/// passed explicitly into the components that use them; the algorithms carry
/// no ambient defaults of their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Minimum overall score (0..100) to pass a quiz or exam.
    pub pass_threshold: f64,
    /// Quiz failures before a remedial submodule is generated.
    pub submodule_fail_threshold: u32,
    /// Exam attempts before a remedial module is generated.
    pub exam_remediation_threshold: u32,
    /// Score fraction deducted per hint used (0.10 = 10% per hint).
    pub hint_penalty_rate: f64,
    /// Mean best-score below which a module is flagged as a remediation
    /// candidate by the advisory health check.
    pub module_health_threshold: f64,
    /// Whether the health check may ever act on its own. The current
    /// decision point is a no-op either way; this only gates the log level.
    pub auto_remediate_weak_modules: bool,
    /// Upper bound on a single content-generation call.
    pub generation_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 70.0,
            submodule_fail_threshold: 1,
            exam_remediation_threshold: 2,
            hint_penalty_rate: 0.10,
            module_health_threshold: 50.0,
            auto_remediate_weak_modules: false,
            generation_timeout_secs: 60,
        }
    }
}

impl EngineConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Load from a TOML file; absent keys fall back to defaults.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Credentials and model selection for the AI content generator, read from
/// the environment (`.env` friendly).
#[derive(Clone, Serialize, Deserialize)]
pub struct AiConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
}

impl AiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let _ = dotenvy::dotenv();
        Ok(Self {
            api_key: dotenvy::var("OPENAI_API_KEY")?,
            base_url: dotenvy::var("OPENAI_BASE_URL")?,
            model: dotenvy::var("AI_MODEL")?,
        })
    }
}
