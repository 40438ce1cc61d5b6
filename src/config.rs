use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SpectralError};
use crate::remote::retry::RetryPolicy;

/// Environment variable naming a JSON settings file.
pub const CONFIG_ENV_VAR: &str = "RUSTY_SPECTRA_CONFIG";

// ---------------------------------------------------------------------------
// Settings – every tunable of the remote layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub archive: ArchiveSettings,
    pub lines: LineSettings,
    pub retry: RetrySettings,
    /// Where downloaded archive products are written.
    pub download_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveSettings {
    pub invoke_url: String,
    pub download_url: String,
    pub collection: String,
    pub cone_radius_arcsec: f64,
    pub page_size: usize,
    pub request_timeout_secs: u64,
    /// Upper bound for a whole discovery call, retries included.
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineSettings {
    pub catalog_url: String,
    /// Skip the remote catalog and always use the bundled table.
    pub offline: bool,
    pub request_timeout_secs: u64,
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            archive: ArchiveSettings::default(),
            lines: LineSettings::default(),
            retry: RetrySettings::default(),
            download_dir: PathBuf::from("downloads"),
        }
    }
}

impl Default for ArchiveSettings {
    fn default() -> Self {
        Self {
            invoke_url: "https://mast.stsci.edu/api/v0/invoke".to_string(),
            download_url: "https://mast.stsci.edu/api/v0.1/Download/file".to_string(),
            collection: "JWST".to_string(),
            cone_radius_arcsec: 30.0,
            page_size: 500,
            request_timeout_secs: 30,
            call_timeout_secs: 120,
        }
    }
}

impl Default for LineSettings {
    fn default() -> Self {
        Self {
            catalog_url: "https://physics.nist.gov/cgi-bin/ASD/lines1.pl".to_string(),
            offline: false,
            request_timeout_secs: 20,
            call_timeout_secs: 45,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 500,
            max_backoff_ms: 4_000,
        }
    }
}

impl Settings {
    /// Settings from the file named by [`CONFIG_ENV_VAR`], or defaults when
    /// the variable is unset.
    pub fn load() -> Result<Settings> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => Self::from_path(Path::new(&path)),
            None => Ok(Settings::default()),
        }
    }

    /// Missing keys fall back to their defaults.
    pub fn from_path(path: &Path) -> Result<Settings> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SpectralError::Config(format!("reading {}: {e}", path.display())))?;
        let settings: Settings = serde_json::from_str(&text)
            .map_err(|e| SpectralError::Config(format!("parsing {}: {e}", path.display())))?;
        settings.validate()?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.retry.max_attempts == 0 {
            return Err(SpectralError::Config("retry.max_attempts must be at least 1".into()));
        }
        if !(self.archive.cone_radius_arcsec > 0.0) {
            return Err(SpectralError::Config("archive.cone_radius_arcsec must be positive".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.retry.max_attempts,
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }
}
