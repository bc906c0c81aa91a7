use anyhow::{bail, Context, Result};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tvtime_common::config::{GeneralConfig, LedgerConfig};
use tvtime_common::{CreditPolicy, ExerciseKind};

#[derive(Debug, Deserialize, Serialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub anti_cheat: AntiCheatConfig,

    #[serde(default)]
    pub rates: RatesConfig,

    #[serde(default)]
    pub credit_policy: CreditPolicy,

    #[serde(default)]
    pub ledger: LedgerConfig,

    #[serde(default)]
    pub approval: ApprovalConfig,

    #[serde(default)]
    pub voice: VoiceConfig,

    #[serde(default)]
    pub coach: CoachConfig,
}

fn data_dir() -> PathBuf {
    dirs::data_dir().unwrap_or_else(|| PathBuf::from("/tmp")).join("tvtime")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: data_dir().join("tvtime.db").to_string_lossy().to_string() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AntiCheatConfig {
    pub min_face_visibility: f32,
    pub window_size: usize,
    pub variance_threshold: f64,
    /// Minimum visibility of the left shoulder and hip for a frame to drive a rep.
    pub min_core_visibility: f32,
}

impl Default for AntiCheatConfig {
    fn default() -> Self {
        Self {
            min_face_visibility: 0.8,
            window_size: 50,
            variance_threshold: 5e-6,
            min_core_visibility: 0.5,
        }
    }
}

/// Reps needed per earned minute.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RatesConfig {
    pub pushups: u32,
    pub squats: u32,
    pub jumpingjacks: u32,
    pub bodysawplank: u32,
}

impl Default for RatesConfig {
    fn default() -> Self {
        Self {
            pushups: ExerciseKind::Pushups.default_rate(),
            squats: ExerciseKind::Squats.default_rate(),
            jumpingjacks: ExerciseKind::JumpingJacks.default_rate(),
            bodysawplank: ExerciseKind::BodySawPlank.default_rate(),
        }
    }
}

impl RatesConfig {
    pub fn rate_for(&self, kind: ExerciseKind) -> u32 {
        match kind {
            ExerciseKind::Pushups => self.pushups,
            ExerciseKind::Squats => self.squats,
            ExerciseKind::JumpingJacks => self.jumpingjacks,
            ExerciseKind::BodySawPlank => self.bodysawplank,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Sheet,
    Webapp,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ApprovalConfig {
    pub backend: BackendKind,
    /// SQLite file holding approval rows when `backend = "sheet"`.
    pub sheet_path: String,
    pub webapp_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_token: Option<SecretString>,
    pub decision_base_url: String,
    pub poll_interval_secs: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sheet,
            sheet_path: data_dir().join("sheet.db").to_string_lossy().to_string(),
            webapp_url: None,
            api_token: None,
            decision_base_url: "http://127.0.0.1:8787".to_string(),
            poll_interval_secs: 5,
        }
    }
}

impl ApprovalConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VoiceConfig {
    pub wake_word: String,
    pub command_timeout_secs: u64,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self { wake_word: "buddy".to_string(), command_timeout_secs: 6 }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CoachConfig {
    pub cooldown_secs: u64,
}

impl Default for CoachConfig {
    fn default() -> Self {
        Self { cooldown_secs: 3 }
    }
}

impl EngineConfig {
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir().unwrap_or_else(|| PathBuf::from("/tmp")).join("tvtime").join("engine.toml")
    }

    /// Load configuration from file, creating default if it doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::default_config_path())
    }

    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        debug!("Loading engine configuration from {:?}", config_path);

        if !config_path.exists() {
            info!(
                "Configuration file not found at {:?}, creating default configuration",
                config_path
            );
            let default_config = Self::default();
            default_config.save_to_path(config_path)?;
            return Ok(default_config);
        }

        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        let config: EngineConfig = toml::from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {:?}", config_path))?;

        info!("Loaded engine configuration from {:?}", config_path);
        Ok(config)
    }

    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        debug!("Saving engine configuration to {:?}", config_path);

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let config_content = toml::to_string_pretty(self)
            .with_context(|| "Failed to serialize configuration to TOML")?;

        fs::write(config_path, config_content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;

        info!("Saved engine configuration to {:?}", config_path);
        Ok(())
    }

    /// Reject settings the engine cannot run with and warn about risky ones.
    pub fn validate(&self) -> Result<()> {
        for kind in ExerciseKind::ALL {
            if self.rates.rate_for(kind) == 0 {
                bail!("Rate for {} must be at least 1 rep per minute", kind);
            }
        }

        if self.anti_cheat.window_size == 0 {
            bail!("anti_cheat.window_size must be greater than zero");
        }

        if self.ledger.daily_cap_minutes <= 0.0 {
            bail!("ledger.daily_cap_minutes must be positive");
        }

        if self.credit_policy.cutoff_hour > 23 {
            bail!("credit_policy.cutoff_hour must be between 0 and 23");
        }

        if self.approval.poll_interval_secs == 0 {
            bail!("approval.poll_interval_secs must be greater than zero");
        }

        if self.voice.wake_word.trim().is_empty() {
            bail!("voice.wake_word must not be empty");
        }

        if self.approval.backend == BackendKind::Webapp {
            if self.approval.webapp_url.is_none() {
                bail!("approval.webapp_url is required for the webapp backend");
            }
            if self.approval.api_token.is_none() {
                warn!("No approval API token configured - the collaborator will refuse requests");
            }
            if self
                .approval
                .webapp_url
                .as_deref()
                .is_some_and(|url| url.starts_with("http://") && !url.contains("127.0.0.1"))
            {
                warn!("Approval endpoint is not using TLS - the API token is sent in plaintext");
            }
        }

        debug!("Configuration validation passed");
        Ok(())
    }
}
