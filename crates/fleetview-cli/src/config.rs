// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use fleetview_app::Role;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_TIMEOUT: &str = "5s";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            storage: Storage::default(),
            ui: Ui::default(),
            api: Api::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ui {
    pub page_size: Option<i64>,
    pub role: Option<String>,
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            page_size: Some(fleetview_tui::DEFAULT_PAGE_SIZE as i64),
            role: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Api {
    pub enabled: Option<bool>,
    pub base_url: Option<String>,
    pub timeout: Option<String>,
    pub token_path: Option<String>,
}

impl Default for Api {
    fn default() -> Self {
        Self {
            enabled: Some(false),
            base_url: Some(fleetview_api::DEFAULT_BASE_URL.to_owned()),
            timeout: Some(DEFAULT_TIMEOUT.to_owned()),
            token_path: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Default for Log {
    fn default() -> Self {
        Self {
            level: Some(DEFAULT_LOG_LEVEL.to_owned()),
            file: None,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("FLEETVIEW_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!(
                "cannot resolve config directory; set FLEETVIEW_CONFIG_PATH to the config file"
            )
        })?;

        let app_dir = config_root.join(fleetview_db::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and keep values under [storage], [ui], [api] and [log]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1. Regenerate a template with `fleetview --print-example-config` and copy your values over",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            fleetview_db::validate_db_path(db_path)?;
        }

        if let Some(page_size) = self.ui.page_size
            && page_size < 1
        {
            bail!(
                "ui.page_size in {} must be at least 1, got {}",
                path.display(),
                page_size
            );
        }

        if let Some(role) = &self.ui.role
            && Role::parse(role).is_none()
        {
            bail!(
                "ui.role in {} must be one of admin, personal, service; got {:?}",
                path.display(),
                role
            );
        }

        if let Some(timeout) = &self.api.timeout {
            let parsed = parse_duration(timeout)?;
            if parsed <= Duration::ZERO {
                bail!(
                    "api.timeout in {} must be positive, got {}",
                    path.display(),
                    timeout
                );
            }
        }

        if let Some(base_url) = &self.api.base_url
            && base_url.trim().is_empty()
        {
            bail!(
                "api.base_url in {} must not be empty; remove it to use {}",
                path.display(),
                fleetview_api::DEFAULT_BASE_URL
            );
        }

        if let Some(level) = &self.log.level {
            tracing_subscriber::EnvFilter::try_new(level).with_context(|| {
                format!(
                    "log.level in {} is not a valid filter ({level:?}); use error, warn, info, debug or trace",
                    path.display()
                )
            })?;
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => fleetview_db::default_db_path(),
        }
    }

    pub fn page_size(&self) -> usize {
        self.ui
            .page_size
            .and_then(|size| usize::try_from(size).ok())
            .filter(|size| *size > 0)
            .unwrap_or(fleetview_tui::DEFAULT_PAGE_SIZE)
    }

    /// Role used when no session is stored.
    pub fn role(&self) -> Option<Role> {
        self.ui.role.as_deref().and_then(Role::parse)
    }

    pub fn api_enabled(&self) -> bool {
        self.api.enabled.unwrap_or(false)
    }

    pub fn api_base_url(&self) -> &str {
        self.api
            .base_url
            .as_deref()
            .unwrap_or(fleetview_api::DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn api_timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_TIMEOUT))
    }

    pub fn token_path(&self) -> Result<PathBuf> {
        match &self.api.token_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => data_file("session.json"),
        }
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_path(&self) -> Result<PathBuf> {
        match &self.log.file {
            Some(path) => Ok(PathBuf::from(path)),
            None => data_file("fleetview.log"),
        }
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# fleetview config\n# Place this file at: {}\n\nversion = 1\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/fleetview/fleetview.db)\n# db_path = \"/absolute/path/to/fleetview.db\"\n\n[ui]\npage_size = {}\n# Optional. Used when no session is stored: admin, personal or service\n# role = \"service\"\n\n[api]\nenabled = false\nbase_url = \"{}\"\ntimeout = \"{}\"\n# token_path = \"/absolute/path/to/session.json\"\n\n[log]\nlevel = \"{}\"\n# file = \"/absolute/path/to/fleetview.log\"\n",
            path.display(),
            fleetview_tui::DEFAULT_PAGE_SIZE,
            fleetview_api::DEFAULT_BASE_URL,
            DEFAULT_TIMEOUT,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn data_file(name: &str) -> Result<PathBuf> {
    let data_root = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("cannot resolve data directory; set the path in the config"))?;
    let app_dir = data_root.join(fleetview_db::APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join(name))
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid timeout duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}
