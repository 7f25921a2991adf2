use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant integrated with the user's notes. \
Use the provided context to give relevant and accurate responses.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAi,
    Anthropic,
    /// OpenAI-compatible endpoint at `custom_endpoint`.
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub provider: ProviderKind,
    pub openai_api_key: String,
    pub anthropic_api_key: String,
    pub custom_endpoint: String,
    pub custom_api_key: String,
    pub openai_model: String,
    pub anthropic_model: String,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Token budget for context gathered from connected nodes.
    pub context_limit: usize,
    /// Storage folder saved canvases live in.
    pub storage_folder: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::OpenAi,
            openai_api_key: String::new(),
            anthropic_api_key: String::new(),
            custom_endpoint: String::new(),
            custom_api_key: String::new(),
            openai_model: "gpt-3.5-turbo".to_string(),
            anthropic_model: "claude-3-sonnet-20240229".to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            max_tokens: 2000,
            context_limit: 4000,
            storage_folder: "flows".to_string(),
        }
    }
}

impl Settings {
    pub fn load() -> Option<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Option<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Option<Self> {
        let contents = fs::read_to_string(path).ok()?;
        serde_json::from_str(&contents).ok()
    }

    pub fn save_to(&self, path: &Path) -> Option<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok()?;
        }
        let contents = serde_json::to_string_pretty(self).ok()?;
        fs::write(path, &contents).ok()
    }

    fn config_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", "", "flowcanvas")?;
        Some(dirs.config_dir().join("settings.json"))
    }
}
