use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::ValueEnum;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::SettingsError;

const DEFAULT_CONFIG_FILE: &str = "optcg";

/// Catalog site variants. Each one is a separate deployment of the card list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Region {
    /// 日本語
    Ja,
    /// 简体中文
    Cn,
    /// 繁體中文 (HK)
    Hk,
    /// 繁體中文 (TW)
    Tw,
    /// ไทย
    Th,
    /// English (Asia)
    #[value(name = "asia-en")]
    AsiaEn,
    /// English (US/Europe/LatAm/Oceania)
    En,
    /// Français
    Fr,
}

impl Region {
    pub const ALL: [Region; 8] = [
        Region::Ja,
        Region::Cn,
        Region::Hk,
        Region::Tw,
        Region::Th,
        Region::AsiaEn,
        Region::En,
        Region::Fr,
    ];

    pub fn code(self) -> &'static str {
        match self {
            Region::Ja => "ja",
            Region::Cn => "cn",
            Region::Hk => "hk",
            Region::Tw => "tw",
            Region::Th => "th",
            Region::AsiaEn => "asia-en",
            Region::En => "en",
            Region::Fr => "fr",
        }
    }

    pub fn base_url(self) -> &'static str {
        match self {
            Region::Ja => "https://www.onepiece-cardgame.com",
            Region::Cn => "https://www.onepiece-cardgame.cn",
            Region::Hk => "https://asia-hk.onepiece-cardgame.com",
            Region::Tw => "https://asia-tw.onepiece-cardgame.com",
            Region::Th => "https://asia-th.onepiece-cardgame.com",
            Region::AsiaEn => "https://asia-en.onepiece-cardgame.com",
            Region::En => "https://en.onepiece-cardgame.com",
            Region::Fr => "https://fr.onepiece-cardgame.com",
        }
    }
}

/// What to do with a series when some of its card containers fail to parse.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Persist the rows that parsed, log the ones that didn't.
    #[default]
    KeepValidRows,
    /// Drop the whole series on the first bad row.
    DiscardSeries,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default)]
    pub region: Option<Region>,
    /// Overrides the region's catalog URL (no trailing slash).
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// Wipe `DB/` and `Image/` before a full run.
    #[serde(default = "default_fresh")]
    pub fresh: bool,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_settle_secs() -> u64 {
    5
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_fresh() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            root: default_root(),
            region: None,
            base_url: None,
            settle_secs: default_settle_secs(),
            timeout_secs: default_timeout_secs(),
            failure_policy: FailurePolicy::default(),
            fresh: default_fresh(),
        }
    }
}

impl Settings {
    /// Layer an optional TOML file and `OPTCG_*` environment variables over the defaults.
    pub fn load(file: Option<&Path>) -> Result<Settings, SettingsError> {
        let file_source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file_source)
            .add_source(Environment::with_prefix("OPTCG"))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    /// Catalog root URL, from `base_url` when set, otherwise from the region.
    pub fn site_url(&self) -> Result<String, SettingsError> {
        if let Some(url) = &self.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }
        match self.region {
            Some(region) => Ok(region.base_url().to_string()),
            None => Err(SettingsError::MissingRegion(
                Region::ALL.map(Region::code).join(", "),
            )),
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn db_dir(&self) -> PathBuf {
        self.root.join("DB")
    }

    pub fn image_dir(&self) -> PathBuf {
        self.root.join("Image")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.root.join("log")
    }
}

// ── Tests ──
