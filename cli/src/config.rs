use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use gluco_core::Session;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const DEFAULT_BASE_URL: &str = "https://api.studio.nebius.com/v1/";
pub const DEFAULT_MODEL: &str = "microsoft/phi-4";
pub const DEFAULT_TEMPERATURE: f32 = 0.3;

/// Environment variables holding the text-generation API key, in lookup order.
pub const API_KEY_VARS: [&str; 2] = ["GLUCO_API_KEY", "NEBIUS_API_KEY"];

pub struct Config {
    pub session_path: PathBuf,
    pub data_dir: PathBuf,
}

impl Config {
    pub fn load() -> Result<Self> {
        let proj_dirs =
            ProjectDirs::from("", "", "gluco").context("Could not determine home directory")?;
        Self::at(proj_dirs.data_dir())
    }

    pub fn at(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)
            .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;

        Ok(Config {
            session_path: data_dir.join("session.json"),
            data_dir: data_dir.to_path_buf(),
        })
    }

    /// The saved session, or a fresh one on first run.
    pub fn load_session(&self) -> Result<Session> {
        if !self.session_path.exists() {
            debug!(path = %self.session_path.display(), "no saved session, starting fresh");
            return Ok(Session::new());
        }
        let raw = std::fs::read_to_string(&self.session_path).with_context(|| {
            format!("Failed to read session file: {}", self.session_path.display())
        })?;
        serde_json::from_str(&raw).with_context(|| {
            format!("Session file is corrupt: {}", self.session_path.display())
        })
    }

    pub fn save_session(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string_pretty(session)?;
        let tmp = self.session_path.with_extension("json.tmp");
        std::fs::write(&tmp, json).context("Failed to write session file")?;
        std::fs::rename(&tmp, &self.session_path).context("Failed to replace session file")?;
        debug!(path = %self.session_path.display(), revision = session.revision(), "session saved");
        Ok(())
    }

    /// Load the API key from disk, or generate a new one.
    ///
    /// Returns `(key, newly_created)` where `newly_created` is true when a
    /// fresh key was just generated (first run).
    pub fn load_or_create_api_key(&self) -> Result<(String, bool)> {
        use rand::Rng;
        use std::fmt::Write;

        let path = self.data_dir.join("api_key");

        if path.exists() {
            let key = std::fs::read_to_string(&path).context("Failed to read API key file")?;
            let key = key.trim().to_string();
            if !key.is_empty() {
                return Ok((key, false));
            }
        }

        let bytes: [u8; 32] = rand::rng().random();
        let key = bytes
            .iter()
            .fold(String::with_capacity(64), |mut acc: String, b| {
                let _ = write!(acc, "{b:02x}");
                acc
            });
        std::fs::write(&path, &key).context("Failed to write API key file")?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))
                .context("Failed to set API key file permissions")?;
        }
        eprintln!("Generated new API key: {key}");
        eprintln!("Include in requests: Authorization: Bearer {key}");
        Ok((key, true))
    }
}

/// Settings for the OpenAI-compatible chat endpoint.
#[derive(Clone, Debug)]
pub struct LlmConfig {
    /// Absent keys only fail the recommendation path.
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_env_with(|k| std::env::var(k).ok())
    }

    pub fn from_env_with<F>(mut get: F) -> Result<Self>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut non_empty = |k: &str| {
            get(k)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let api_key = API_KEY_VARS
            .iter()
            .find_map(|k| non_empty(k))
            .map(|k| SecretString::new(k.into()));
        let base_url = non_empty("GLUCO_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.into());
        let model = non_empty("GLUCO_MODEL").unwrap_or_else(|| DEFAULT_MODEL.into());
        let temperature = match non_empty("GLUCO_TEMPERATURE") {
            None => DEFAULT_TEMPERATURE,
            Some(raw) => {
                let t: f32 = raw
                    .parse()
                    .with_context(|| format!("Invalid GLUCO_TEMPERATURE '{raw}'"))?;
                if !(0.0..=2.0).contains(&t) {
                    bail!("GLUCO_TEMPERATURE must be between 0 and 2 (got {t})");
                }
                t
            }
        };

        Ok(Self {
            api_key,
            base_url,
            model,
            temperature,
        })
    }
}
