use log::{error, info, warn, LevelFilter};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::offsets;
use crate::sanitise::SanitiseFlags;
use crate::signature::Signature;

pub const CONFIG_FILE: &str = "xiv-chat-sender.toml";

// ─── Persisted config ────────────────────────────────────────────────

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SenderConfig {
    /// Overrides the built-in chat box signature after a game patch.
    pub signature: String,
    pub sanitise_flags: u32,
    pub payload_alloc_size: usize,
    pub log_level: String,
    pub record_history: bool,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            signature: offsets::SEND_CHAT.into(),
            sanitise_flags: offsets::CHAT_SANITISE_FLAGS,
            payload_alloc_size: offsets::PAYLOAD_ALLOC_SIZE,
            log_level: "info".into(),
            record_history: false,
        }
    }
}

pub fn config_dir() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|p| p.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

impl SenderConfig {
    pub fn load() -> Self {
        let path = config_dir().join(CONFIG_FILE);
        if path.exists() {
            Self::load_from(&path)
        } else {
            info!("No config file found, creating default config");
            let config = Self::default();
            config.save_to(&path);
            config
        }
    }

    /// Like `load`, but never writes a file. For tools that only inspect the setup.
    pub fn load_existing() -> Self {
        Self::load_if_present(&config_dir().join(CONFIG_FILE))
    }

    pub fn load_if_present(path: &Path) -> Self {
        if path.exists() {
            Self::load_from(path)
        } else {
            info!("No config file at {}, using defaults", path.display());
            Self::default()
        }
    }

    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    error!("Failed to parse {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    pub fn save(&self) {
        self.save_to(&config_dir().join(CONFIG_FILE));
    }

    pub fn save_to(&self, path: &Path) {
        match toml::to_string_pretty(self) {
            Ok(content) => {
                if let Err(e) = std::fs::write(path, content) {
                    error!("Failed to save config: {}", e);
                }
            }
            Err(e) => error!("Failed to serialize config: {}", e),
        }
    }

    /// Configured signature, or the built-in one if the override doesn't parse.
    pub fn signature(&self) -> Signature {
        match Signature::parse(&self.signature) {
            Ok(sig) => sig,
            Err(e) => {
                warn!("Ignoring configured signature: {}", e);
                Signature::chat_box()
            }
        }
    }

    pub fn sanitise_flags(&self) -> SanitiseFlags {
        SanitiseFlags(self.sanitise_flags)
    }

    pub fn payload_alloc_size(&self) -> usize {
        self.payload_alloc_size.max(offsets::PAYLOAD_SIZE)
    }

    pub fn log_level(&self) -> LevelFilter {
        self.log_level.parse().unwrap_or(LevelFilter::Info)
    }
}
