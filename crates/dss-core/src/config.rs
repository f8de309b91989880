#![forbid(unsafe_code)]

//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! timestamp_max_offset_ms = 300000
//! max_grace_period_hours = 168
//! digest_algorithm = "sha256"
//! role = "Director"
//! ```
//!
//! Every key is optional; missing keys take the defaults below.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Default maximum distance between claimed signing time and timestamp time.
pub const DEFAULT_TIMESTAMP_MAX_OFFSET_MS: u64 = 5 * 60 * 1000;

/// Default grace period after which embedded revocation data is used.
pub const DEFAULT_MAX_GRACE_PERIOD_HOURS: u64 = 24 * 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DssConfig {
    /// Maximum allowed offset (ms) between SigningTime and the timestamp.
    pub timestamp_max_offset_ms: u64,
    /// Hours after signing during which the signing-time revocation status
    /// is assumed to still be obtainable online.
    pub max_grace_period_hours: u64,
    /// Default digest for new signatures (`sha1`, `sha256`, `sha512`).
    pub digest_algorithm: String,
    /// Digest used for timestamp message imprints.
    pub timestamp_digest_algorithm: String,
    /// Claimed role added to new signatures when the request has none.
    pub role: Option<String>,
}

impl Default for DssConfig {
    fn default() -> Self {
        Self {
            timestamp_max_offset_ms: DEFAULT_TIMESTAMP_MAX_OFFSET_MS,
            max_grace_period_hours: DEFAULT_MAX_GRACE_PERIOD_HOURS,
            digest_algorithm: "sha256".into(),
            timestamp_digest_algorithm: "sha256".into(),
            role: None,
        }
    }
}

impl DssConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let cfg: DssConfig = toml::from_str(s).map_err(|e| Error::Config(e.to_string()))?;
        cfg.check()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let cfg = Self::from_toml_str(&text)?;
        log::debug!("loaded configuration from {}", path.display());
        Ok(cfg)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    /// Grace period in milliseconds.
    pub fn max_grace_period_ms(&self) -> u64 {
        self.max_grace_period_hours.saturating_mul(60 * 60 * 1000)
    }

    fn check(&self) -> Result<()> {
        if self.timestamp_max_offset_ms == 0 {
            return Err(Error::Config(
                "timestamp_max_offset_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = DssConfig::default();
        assert_eq!(cfg.timestamp_max_offset_ms, 300_000);
        assert_eq!(cfg.max_grace_period_hours, 168);
        assert_eq!(cfg.max_grace_period_ms(), 168 * 3_600_000);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg = DssConfig::from_toml_str("role = \"CEO\"\n").unwrap();
        assert_eq!(cfg.role.as_deref(), Some("CEO"));
        assert_eq!(cfg.digest_algorithm, "sha256");
    }

    #[test]
    fn rejects_zero_offset() {
        let err = DssConfig::from_toml_str("timestamp_max_offset_ms = 0").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn rejects_bad_toml() {
        assert!(DssConfig::from_toml_str("timestamp_max_offset_ms = \"x\"").is_err());
    }

    #[test]
    fn load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dss.toml");
        let cfg = DssConfig {
            max_grace_period_hours: 2,
            ..Default::default()
        };
        std::fs::write(&path, cfg.to_toml_string().unwrap()).unwrap();
        assert_eq!(DssConfig::load(&path).unwrap(), cfg);
    }
}
