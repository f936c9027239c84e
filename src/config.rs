use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use ratatui::style::Color;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: Config,
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store_path: Option<PathBuf>,
    #[serde(default, deserialize_with = "deserialize_shell")]
    pub shell: ShellConfig,
    #[serde(default = "default_max_output_lines")]
    pub max_output_lines: usize,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub theme: ThemeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            shell: ShellConfig::default(),
            max_output_lines: default_max_output_lines(),
            log_level: default_log_level(),
            theme: ThemeConfig::default(),
        }
    }
}

fn default_max_output_lines() -> usize {
    2_000
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Program and leading arguments used to run a command line.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ShellConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for ShellConfig {
    #[cfg(target_os = "windows")]
    fn default() -> Self {
        Self {
            program: "cmd".to_string(),
            args: vec!["/C".to_string()],
        }
    }

    #[cfg(not(target_os = "windows"))]
    fn default() -> Self {
        Self {
            program: "sh".to_string(),
            args: vec!["-c".to_string()],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ShellOrTable {
    Program(String),
    Table(ShellConfig),
}

/// Accepts `shell = "bash"` (implies `-c`) or a full table.
fn deserialize_shell<'de, D>(deserializer: D) -> std::result::Result<ShellConfig, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match ShellOrTable::deserialize(deserializer)? {
        ShellOrTable::Program(program) => ShellConfig {
            program,
            args: vec!["-c".to_string()],
        },
        ShellOrTable::Table(shell) => shell,
    })
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    pub primary: String,
    pub secondary: String,
    pub accent: String,
    pub danger: String,
    pub warning: String,
    pub muted: String,
    pub text: String,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            primary: "99".to_string(),
            secondary: "240".to_string(),
            accent: "86".to_string(),
            danger: "196".to_string(),
            warning: "214".to_string(),
            muted: "245".to_string(),
            text: "252".to_string(),
        }
    }
}

/// Immutable palette handed to the renderer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Theme {
    pub primary: Color,
    pub secondary: Color,
    pub accent: Color,
    pub danger: Color,
    pub warning: Color,
    pub muted: Color,
    pub text: Color,
}

impl ThemeConfig {
    pub fn build(&self) -> Result<Theme> {
        Ok(Theme {
            primary: parse_color("primary", &self.primary)?,
            secondary: parse_color("secondary", &self.secondary)?,
            accent: parse_color("accent", &self.accent)?,
            danger: parse_color("danger", &self.danger)?,
            warning: parse_color("warning", &self.warning)?,
            muted: parse_color("muted", &self.muted)?,
            text: parse_color("text", &self.text)?,
        })
    }
}

fn parse_color(key: &str, raw: &str) -> Result<Color> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        bail!("theme color '{key}' cannot be empty");
    }
    Color::from_str(trimmed).map_err(|_| anyhow::anyhow!("invalid theme color for '{key}': {raw}"))
}

pub fn load(explicit_path: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit_path {
        return Ok(LoadedConfig {
            config: load_from_path(path)?,
            path: Some(path.to_path_buf()),
        });
    }

    let global_path = global_config_path()?;
    if global_path.exists() {
        return Ok(LoadedConfig {
            config: load_from_path(&global_path)?,
            path: Some(global_path),
        });
    }

    Ok(LoadedConfig {
        config: Config::default(),
        path: None,
    })
}

pub fn global_config_path() -> Result<PathBuf> {
    let config_root = dirs::config_dir().context("unable to resolve OS config directory")?;
    Ok(config_root.join("cmdbox").join("config.toml"))
}

/// Directory holding the store and the log file.
pub fn data_dir() -> Result<PathBuf> {
    let data_root = dirs::data_dir().context("unable to resolve OS data directory")?;
    Ok(data_root.join("cmdbox"))
}

fn load_from_path(path: &Path) -> Result<Config> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    toml::from_str(&content).with_context(|| format!("invalid TOML in {}", path.display()))
}
