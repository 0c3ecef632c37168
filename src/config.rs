use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sync::{Rule, SyncSettings, UriRule};
use crate::trello::action::action_selection;
use crate::trello::attachment::attachment_registry;
use crate::trello::client::DEFAULT_BASE_URL;
use crate::trello::fields::{AttachmentFields, MemberFields, Selections, StickerFields};
use crate::trello::member::member_registry;
use crate::trello::sticker::sticker_registry;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub trello: TrelloConfig,
  #[serde(default)]
  pub sync: SyncConfig,
  /// Properties to download per entity type (defaults to all)
  #[serde(default)]
  pub fields: FieldsConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrelloConfig {
  /// API base URL, including the version segment
  #[serde(default = "default_url")]
  pub url: String,
}

fn default_url() -> String {
  DEFAULT_BASE_URL.to_string()
}

impl Default for TrelloConfig {
  fn default() -> Self {
    Self { url: default_url() }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// How long writes are collected before one update is sent
  #[serde(default = "default_submit_delay_ms")]
  pub submit_delay_ms: u64,
  /// How long fetched data is used before it is fetched again
  #[serde(default = "default_refresh_throttle_secs")]
  pub refresh_throttle_secs: i64,
}

fn default_submit_delay_ms() -> u64 {
  100
}

fn default_refresh_throttle_secs() -> i64 {
  300
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      submit_delay_ms: default_submit_delay_ms(),
      refresh_throttle_secs: default_refresh_throttle_secs(),
    }
  }
}

impl SyncConfig {
  pub fn settings(&self) -> SyncSettings {
    SyncSettings {
      submit_delay: Duration::from_millis(self.submit_delay_ms),
      refresh_throttle: chrono::Duration::seconds(self.refresh_throttle_secs),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FieldsConfig {
  #[serde(default, deserialize_with = "deserialize_lowercase_list")]
  pub member: Option<Vec<String>>,
  #[serde(default, deserialize_with = "deserialize_lowercase_list")]
  pub action: Option<Vec<String>>,
  #[serde(default, deserialize_with = "deserialize_lowercase_list")]
  pub attachment: Option<Vec<String>>,
  #[serde(default, deserialize_with = "deserialize_lowercase_list")]
  pub sticker: Option<Vec<String>>,
}

fn deserialize_lowercase_list<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
  D: serde::Deserializer<'de>,
{
  let v: Option<Vec<String>> = Option::deserialize(deserializer)?;
  Ok(v.map(|names| names.into_iter().map(|s| s.trim().to_lowercase()).collect()))
}

fn names(list: &[String]) -> Vec<&str> {
  list.iter().map(String::as_str).collect()
}

fn unknown_fields(kind: &str, unknown: Vec<String>) -> color_eyre::Report {
  eyre!("Unknown {} field(s) in config: {}", kind, unknown.join(", "))
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./trellis.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/trellis/config.yaml
  ///
  /// Without a file the defaults apply; credentials always come from the
  /// environment.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::debug!("no config file found, using defaults");
        Config::default()
      }
    };
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("trellis.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("trellis").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  pub fn parse(contents: &str) -> Result<Self> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
  }

  fn validate(&self) -> Result<()> {
    UriRule
      .check(&Some(self.trello.url.clone()))
      .map_err(|fault| eyre!("Invalid trello.url: {}", fault))?;
    if self.sync.refresh_throttle_secs < 0 {
      return Err(eyre!("sync.refresh_throttle_secs must not be negative"));
    }
    self.selections()?;
    Ok(())
  }

  /// Field selections derived from the configured property names.
  pub fn selections(&self) -> Result<Selections> {
    let mut selections = Selections::default();

    if let Some(list) = &self.fields.member {
      let bits = member_registry()
        .selection_bits(names(list))
        .map_err(|u| unknown_fields("member", u))?;
      selections.member = MemberFields::from_bits_truncate(bits);
    }
    if let Some(list) = &self.fields.action {
      selections.action = action_selection(names(list)).map_err(|u| unknown_fields("action", u))?;
    }
    if let Some(list) = &self.fields.attachment {
      let bits = attachment_registry()
        .selection_bits(names(list))
        .map_err(|u| unknown_fields("attachment", u))?;
      selections.attachment = AttachmentFields::from_bits_truncate(bits);
    }
    if let Some(list) = &self.fields.sticker {
      let bits = sticker_registry()
        .selection_bits(names(list))
        .map_err(|u| unknown_fields("sticker", u))?;
      selections.sticker = StickerFields::from_bits_truncate(bits);
    }

    Ok(selections)
  }

  /// Get the Trello API key from environment variables.
  ///
  /// Checks TRELLIS_API_KEY first, then TRELLO_API_KEY as fallback.
  pub fn get_api_key() -> Result<String> {
    std::env::var("TRELLIS_API_KEY")
      .or_else(|_| std::env::var("TRELLO_API_KEY"))
      .map_err(|_| {
        eyre!("Trello API key not found. Set TRELLIS_API_KEY or TRELLO_API_KEY environment variable.")
      })
  }

  /// Get the Trello API token from environment variables.
  ///
  /// Checks TRELLIS_TOKEN first, then TRELLO_TOKEN as fallback.
  pub fn get_token() -> Result<String> {
    std::env::var("TRELLIS_TOKEN")
      .or_else(|_| std::env::var("TRELLO_TOKEN"))
      .map_err(|_| {
        eyre!("Trello token not found. Set TRELLIS_TOKEN or TRELLO_TOKEN environment variable.")
      })
  }
}
