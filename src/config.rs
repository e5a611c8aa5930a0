//! Configuration for the voicewire client
//!
//! Layered: built-in defaults, then an optional TOML file at
//! `~/.config/voicewire/config.toml` (partial overlay), then environment
//! variables. The credential is env-only.

use std::path::PathBuf;

use serde::Deserialize;
use url::Url;

use crate::audio::{DEFAULT_BLOCK_SIZE, DEFAULT_NOISE_GATE};
use crate::session::DEFAULT_LOG_CAPACITY;
use crate::{Error, Result};

/// Default realtime endpoint (bidirectional WebSocket)
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Default realtime model identifier
pub const DEFAULT_MODEL: &str = "models/gemini-2.0-flash-exp";

/// Default synthesized voice
pub const DEFAULT_VOICE: &str = "Aoede";

/// Resolved client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Credential for the endpoint; absence fails connect() fast
    pub api_key: Option<String>,

    /// WebSocket endpoint the session is opened against
    pub endpoint: String,

    /// Model identifier passed through in the setup message
    pub model: String,

    /// Target voice identifier
    pub voice: String,

    /// System-instruction text blob, passed through unmodified
    pub system_instruction: Option<String>,

    /// Declare the web-search tool in session setup
    pub web_search: bool,

    /// Peak-amplitude noise gate for capture blocks (0.0 disables)
    pub noise_gate: f32,

    /// Capture block size in samples
    pub block_size: usize,

    /// Rolling session log capacity
    pub log_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            system_instruction: None,
            web_search: false,
            noise_gate: DEFAULT_NOISE_GATE,
            block_size: DEFAULT_BLOCK_SIZE,
            log_capacity: DEFAULT_LOG_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from file overlay and environment
    ///
    /// # Errors
    ///
    /// Returns error only for a present-but-invalid config file; a missing
    /// file falls back to defaults.
    pub fn load() -> Result<Self> {
        let file = load_config_file()?;
        Ok(Self::from_overlay(file))
    }

    /// Apply a file overlay on top of defaults, then environment variables
    #[must_use]
    pub fn from_overlay(file: ConfigFile) -> Self {
        let mut config = Self::default();

        if let Some(endpoint) = file.session.endpoint {
            config.endpoint = endpoint;
        }
        if let Some(model) = file.session.model {
            config.model = model;
        }
        if let Some(voice) = file.session.voice {
            config.voice = voice;
        }
        if let Some(instruction) = file.session.system_instruction {
            config.system_instruction = Some(instruction);
        }
        if let Some(web_search) = file.session.web_search {
            config.web_search = web_search;
        }
        if let Some(gate) = file.audio.noise_gate {
            config.noise_gate = gate;
        }
        if let Some(block) = file.audio.block_size {
            config.block_size = block;
        }
        if let Some(capacity) = file.log_capacity {
            config.log_capacity = capacity;
        }

        config.api_key = std::env::var("VOICEWIRE_API_KEY")
            .or_else(|_| std::env::var("GEMINI_API_KEY"))
            .ok()
            .filter(|k| !k.is_empty());

        if let Ok(model) = std::env::var("VOICEWIRE_MODEL") {
            config.model = model;
        }
        if let Ok(endpoint) = std::env::var("VOICEWIRE_ENDPOINT") {
            config.endpoint = endpoint;
        }
        if let Ok(voice) = std::env::var("VOICEWIRE_VOICE") {
            config.voice = voice;
        }

        config
    }

    /// Build the session URL with the credential attached
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the endpoint is not a valid URL.
    pub fn session_url(&self, api_key: &str) -> Result<String> {
        let mut url = Url::parse(&self.endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint: {e}")))?;
        url.query_pairs_mut().append_pair("key", api_key);
        Ok(url.into())
    }
}

/// Top-level TOML configuration file schema.
///
/// All fields are optional; the file is a partial overlay on top of
/// defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub session: SessionFileConfig,

    #[serde(default)]
    pub audio: AudioFileConfig,

    /// Rolling log capacity
    pub log_capacity: Option<usize>,
}

/// Session/endpoint configuration
#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    pub endpoint: Option<String>,
    pub model: Option<String>,
    pub voice: Option<String>,
    pub system_instruction: Option<String>,
    pub web_search: Option<bool>,
}

/// Audio pipeline configuration
#[derive(Debug, Default, Deserialize)]
pub struct AudioFileConfig {
    /// Peak-amplitude noise gate (policy value, 0.0 disables)
    pub noise_gate: Option<f32>,

    /// Capture block size in samples
    pub block_size: Option<usize>,
}

/// Load the TOML config file from the standard path.
///
/// A missing file yields `ConfigFile::default()`.
///
/// # Errors
///
/// Returns error if the file exists but cannot be read or parsed.
fn load_config_file() -> Result<ConfigFile> {
    let Some(path) = config_file_path() else {
        return Ok(ConfigFile::default());
    };

    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = std::fs::read_to_string(&path)?;
    let file = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(file)
}

/// Return the config file path: `~/.config/voicewire/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("voicewire").join("config.toml"))
}
