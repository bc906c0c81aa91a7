use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    pub child_name: String,
    pub data_dir: Option<String>,
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { child_name: "Child".to_string(), data_dir: None, log_level: "info".to_string() }
    }
}

/// Daily earning limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    pub daily_cap_minutes: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self { daily_cap_minutes: 10.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_general_config_default() {
        let config = GeneralConfig::default();
        assert_eq!(config.log_level, "info");
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_ledger_config_default() {
        assert_eq!(LedgerConfig::default().daily_cap_minutes, 10.0);
    }
}
