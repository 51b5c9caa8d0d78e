use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use deskhand_core::apps::BrowserKind;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeskhandConfig {
    #[serde(default)]
    pub bridge: BridgeConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
    #[serde(default)]
    pub mail: MailConfig,
    #[serde(default)]
    pub notes: NotesConfig,
    #[serde(default)]
    pub reminders: RemindersConfig,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

// ── Bridge Config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Script interpreter, looked up on PATH unless absolute
    #[serde(default = "default_interpreter")]
    pub interpreter: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_interpreter() -> String {
    "osascript".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl BridgeConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ── Calendar Config ─────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Calendar for new events; first writable calendar when empty
    #[serde(default)]
    pub default_calendar: String,
    /// Window used by `calendar events` when no `--to` is given
    #[serde(default = "default_days_ahead")]
    pub days_ahead: i64,
}

/// Ten years
const MAX_DAYS_AHEAD: i64 = 3650;

fn default_days_ahead() -> i64 {
    7
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            default_calendar: String::new(),
            days_ahead: default_days_ahead(),
        }
    }
}

// ── Mail Config ─────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    #[serde(default = "default_mailbox")]
    pub default_mailbox: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_mailbox() -> String {
    deskhand_core::apps::mail::DEFAULT_MAILBOX.to_string()
}
fn default_limit() -> usize {
    20
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            default_mailbox: default_mailbox(),
            limit: default_limit(),
        }
    }
}

// ── Notes Config ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesConfig {
    #[serde(default)]
    pub default_folder: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            default_folder: String::new(),
            limit: default_limit(),
        }
    }
}

// ── Reminders Config ────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemindersConfig {
    #[serde(default)]
    pub default_list: String,
}

// ── Browser Config ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserConfig {
    /// "safari" or "chrome"
    #[serde(default = "default_browser_name")]
    pub default: String,
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

fn default_browser_name() -> String {
    "safari".to_string()
}
fn default_history_limit() -> usize {
    50
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            default: default_browser_name(),
            history_limit: default_history_limit(),
        }
    }
}

impl BrowserConfig {
    pub fn kind(&self) -> Result<BrowserKind> {
        self.default
            .parse()
            .with_context(|| format!("Invalid browser.default '{}' in config", self.default))
    }
}

// ── Output Config ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_pretty")]
    pub pretty: bool,
}

fn default_pretty() -> bool {
    true
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            pretty: default_pretty(),
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".deskhand")
}

impl DeskhandConfig {
    /// Load the config file. A missing default file yields the built-in
    /// defaults; a missing `--config` path is an error.
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = match custom_path {
            Some(p) => p.clone(),
            None => {
                let default_path = config_dir().join("config.toml");
                if !default_path.exists() {
                    debug!(
                        "No config at {}, using defaults",
                        default_path.display()
                    );
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config at {}", path.display()))?;

        let expanded = expand_env_vars(&content);

        let config: Self = toml::from_str(&expanded)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.bridge.interpreter.trim().is_empty() {
            bail!("bridge.interpreter must not be empty");
        }
        if self.bridge.timeout_secs == 0 {
            bail!("bridge.timeout_secs must be at least 1");
        }
        if !(0..=MAX_DAYS_AHEAD).contains(&self.calendar.days_ahead) {
            bail!(
                "calendar.days_ahead must be between 0 and {}, got {}",
                MAX_DAYS_AHEAD,
                self.calendar.days_ahead
            );
        }
        self.browser.kind()?;
        Ok(())
    }
}

/// Allowlist of environment variable names that may be expanded in config files.
const ALLOWED_ENV_VARS: &[&str] = &["HOME", "USER", "DESKHAND_INTERPRETER"];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value.len();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_default_template_parses() {
        let cfg: DeskhandConfig =
            toml::from_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(cfg.bridge.interpreter, "osascript");
        assert_eq!(cfg.bridge.timeout_secs, 30);
        assert_eq!(cfg.mail.default_mailbox, "INBOX");
        assert_eq!(cfg.browser.history_limit, 50);
        assert!(cfg.output.pretty);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let file = write_config("[bridge]\ntimeout_secs = 5\n");
        let cfg = DeskhandConfig::load(&Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.bridge.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.bridge.interpreter, "osascript");
        assert_eq!(cfg.calendar.days_ahead, 7);
        assert_eq!(cfg.notes.limit, 20);
        assert_eq!(cfg.browser.kind().unwrap(), BrowserKind::Safari);
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        let err = DeskhandConfig::load(&Some(missing)).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let file = write_config("[bridge]\ntimeout_secs = 0\n");
        assert!(DeskhandConfig::load(&Some(file.path().to_path_buf())).is_err());

        let file = write_config("[calendar]\ndays_ahead = 1000000000000000\n");
        let err = DeskhandConfig::load(&Some(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("calendar.days_ahead"));

        let file = write_config("[browser]\ndefault = \"netscape\"\n");
        let err = DeskhandConfig::load(&Some(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("browser.default"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let file = write_config("[bridge\n");
        let err = DeskhandConfig::load(&Some(file.path().to_path_buf())).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_expand_env_vars_allowlist() {
        let home = std::env::var("HOME").unwrap_or_default();
        assert_eq!(expand_env_vars("dir = \"${HOME}/x\""), format!("dir = \"{}/x\"", home));
        assert_eq!(expand_env_vars("key = \"${SECRET_TOKEN}\""), "key = \"${SECRET_TOKEN}\"");
        assert_eq!(expand_env_vars("open ${HOME"), "open ${HOME");
    }
}
