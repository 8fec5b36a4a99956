// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging setup shared by the bridge binaries.
//!
//! ```no_run
//! let (_guard, _filter_handle) = telemetry_subscribers::TelemetryConfig::new()
//!     .with_env()
//!     .init();
//! tracing::info!("logging is up");
//! ```
//!
//! Environment variables read by [`TelemetryConfig::with_env`]:
//! - `RUST_LOG`: filter directives, default `info`
//! - `RUST_LOG_JSON`: emit one JSON object per line when set
//! - `NO_COLOR`: disable ANSI colors when set

use std::env;
use std::sync::OnceLock;
use tracing::metadata::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Default, Clone, Debug)]
pub struct TelemetryConfig {
    /// Filter directives in `RUST_LOG` syntax.
    pub log_string: Option<String>,
    pub json_log_output: bool,
    pub disable_ansi: bool,
}

/// Keeps the non-blocking log writer alive. Dropping it flushes pending logs.
#[must_use]
pub struct TelemetryGuards {
    _worker_guard: WorkerGuard,
}

/// Changes the active filter at runtime.
#[derive(Clone)]
pub struct FilterHandle(reload::Handle<EnvFilter, Registry>);

impl FilterHandle {
    pub fn update<S: AsRef<str>>(&self, directives: S) -> Result<(), String> {
        let filter = EnvFilter::try_new(directives.as_ref()).map_err(|e| e.to_string())?;
        self.0.reload(filter).map_err(|e| e.to_string())
    }

    pub fn get(&self) -> Result<String, String> {
        self.0
            .with_current(|filter| filter.to_string())
            .map_err(|e| e.to_string())
    }
}

impl TelemetryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_log_level(mut self, directives: &str) -> Self {
        self.log_string = Some(directives.to_owned());
        self
    }

    pub fn with_json(mut self) -> Self {
        self.json_log_output = true;
        self
    }

    pub fn with_env(mut self) -> Self {
        if let Ok(directives) = env::var("RUST_LOG") {
            self.log_string = Some(directives);
        }
        if env::var("RUST_LOG_JSON").is_ok() {
            self.json_log_output = true;
        }
        if env::var("NO_COLOR").is_ok() {
            self.disable_ansi = true;
        }
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let directives = self.log_string.as_deref().unwrap_or(DEFAULT_LOG_LEVEL);
        EnvFilter::builder()
            .with_default_directive(LevelFilter::INFO.into())
            .parse(directives)
            .unwrap_or_else(|e| {
                eprintln!("Ignoring invalid log filter {directives:?}: {e}");
                EnvFilter::new(DEFAULT_LOG_LEVEL)
            })
    }

    pub fn init(self) -> (TelemetryGuards, FilterHandle) {
        let (writer, worker_guard) = tracing_appender::non_blocking(std::io::stderr());
        let (filter, reload_handle) = reload::Layer::new(self.env_filter());

        let fmt_layer = if self.json_log_output {
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_writer(writer)
                .boxed()
        } else {
            fmt::layer()
                .with_ansi(!self.disable_ansi)
                .with_target(true)
                .with_writer(writer)
                .boxed()
        };

        // A global subscriber may already be installed (e.g. by another test),
        // in which case the new one is dropped.
        if let Err(e) = tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
        {
            eprintln!("Global tracing subscriber already set: {e}");
        }

        (
            TelemetryGuards {
                _worker_guard: worker_guard,
            },
            FilterHandle(reload_handle),
        )
    }
}

/// Installs a subscriber writing through the test harness capture, once per
/// process. Filter comes from `RUST_LOG`.
pub fn init_for_testing() {
    static LOGGER: OnceLock<()> = OnceLock::new();
    LOGGER.get_or_init(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
