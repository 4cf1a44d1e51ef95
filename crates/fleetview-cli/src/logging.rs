// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use crate::config::Config;
use anyhow::{Context, Result, anyhow};
use std::env;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs the global subscriber. The terminal belongs to the TUI, so
/// events go to the log file. Returns the file path.
pub fn init(config: &Config) -> Result<PathBuf> {
    let path = config.log_path()?;
    let rust_log = env::var("RUST_LOG").ok();
    let filter = build_filter(config.log_level(), rust_log.as_deref())?;
    let file = open_log_file(&path)?;

    file_subscriber(filter, file)
        .try_init()
        .map_err(|error| anyhow!("install log subscriber: {error}"))?;
    Ok(path)
}

/// `RUST_LOG` wins over the configured level when it is set and non-empty.
pub fn build_filter(configured: &str, rust_log: Option<&str>) -> Result<EnvFilter> {
    match rust_log.map(str::trim).filter(|value| !value.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives).with_context(|| {
            format!("RUST_LOG={directives:?} is not a valid filter -- fix or unset it and retry")
        }),
        None => EnvFilter::try_new(configured)
            .with_context(|| format!("log level {configured:?} is not a valid filter")),
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| {
            format!(
                "open log file {} -- set [log].file to a writable path",
                path.display()
            )
        })
}

fn file_subscriber(filter: EnvFilter, file: File) -> impl Subscriber + Send + Sync + 'static {
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(true)
        .compact();

    tracing_subscriber::registry().with(filter).with(fmt_layer)
}
