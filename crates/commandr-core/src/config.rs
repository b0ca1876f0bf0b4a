use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::ai::cohere::DEFAULT_MODEL;
use crate::calendar::{AppleScriptSink, CalendarSink, IcsFileSink};
use crate::intent::CALENDAR_KEYWORDS;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const API_KEY_VARS: [&str; 2] = ["CO_API_KEY", "COHERE_API_KEY"];

/// What happens when a prompt arrives while the same conversation is
/// still waiting on an earlier one
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum OverlapPolicy {
    #[default]
    Queue,
    Reject,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Ics,
    AppleScript,
}

/// Runtime knobs the controller reads for every request
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSettings {
    pub model: String,
    pub temperature: f32,
    pub streaming: bool,
    pub overlap_policy: OverlapPolicy,
    pub keywords: Vec<String>,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            streaming: true,
            overlap_policy: OverlapPolicy::Queue,
            keywords: CALENDAR_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }
}

impl ChatSettings {
    pub fn set_temperature(&mut self, temperature: f32) {
        self.temperature = clamp_temperature(temperature);
    }
}

pub fn clamp_temperature(temperature: f32) -> f32 {
    if temperature.is_nan() {
        DEFAULT_TEMPERATURE
    } else {
        temperature.clamp(0.0, 1.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct Config {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: Option<f32>,
    pub streaming: Option<bool>,
    pub overlap_policy: Option<OverlapPolicy>,
    pub calendar_sink: Option<SinkKind>,
    pub calendar_dir: Option<PathBuf>,
    pub calendar_keywords: Option<Vec<String>>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::get_config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::get_config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(path, config_content)?;
        Ok(())
    }

    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("commandr").join("config.json"))
    }

    /// Environment first, then the config file. Blank values count as unset.
    pub fn api_key(&self) -> Option<String> {
        self.api_key_with(|name| std::env::var(name).ok())
    }

    pub fn api_key_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        API_KEY_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .chain(self.api_key.clone())
            .map(|key| key.trim().to_string())
            .find(|key| !key.is_empty())
    }

    /// Where the credential came from, for the status bar
    pub fn key_source(&self) -> Option<&'static str> {
        self.key_source_with(|name| std::env::var(name).ok())
    }

    pub fn key_source_with(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<&'static str> {
        let from_env = API_KEY_VARS
            .iter()
            .filter_map(|name| lookup(name))
            .any(|key| !key.trim().is_empty());
        if from_env {
            Some("env")
        } else if self
            .api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
        {
            Some("config")
        } else {
            None
        }
    }

    pub fn chat_settings(&self) -> ChatSettings {
        let defaults = ChatSettings::default();
        ChatSettings {
            model: self
                .model
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .map(str::to_string)
                .unwrap_or(defaults.model),
            temperature: self
                .temperature
                .map(clamp_temperature)
                .unwrap_or(defaults.temperature),
            streaming: self.streaming.unwrap_or(defaults.streaming),
            overlap_policy: self.overlap_policy.unwrap_or_default(),
            keywords: self
                .calendar_keywords
                .clone()
                .filter(|k| k.iter().any(|w| !w.trim().is_empty()))
                .unwrap_or(defaults.keywords),
        }
    }

    pub fn calendar_dir(&self) -> PathBuf {
        self.calendar_dir
            .clone()
            .unwrap_or_else(IcsFileSink::default_dir)
    }

    pub fn calendar_sink(&self) -> Arc<dyn CalendarSink> {
        match self.calendar_sink.unwrap_or_default() {
            SinkKind::Ics => Arc::new(IcsFileSink::new(self.calendar_dir())),
            SinkKind::AppleScript => Arc::new(AppleScriptSink::default()),
        }
    }
}
