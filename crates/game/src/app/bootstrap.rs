use std::env;
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use twinloop::{DiagnosticsSink, LoopConfig};

const CONFIG_ENV_VAR: &str = "TWINLOOP_CONFIG";
const HEADLESS_ENV_VAR: &str = "TWINLOOP_HEADLESS_SECS";
const SUMMARY_ENV_VAR: &str = "TWINLOOP_SUMMARY_FILE";

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    /// Run without a window for this long instead of opening one.
    pub(crate) headless_for: Option<Duration>,
    pub(crate) summary_path: Option<PathBuf>,
}

pub(crate) fn build_app() -> Option<AppWiring> {
    let config = match resolve_config(env::var_os(CONFIG_ENV_VAR).map(PathBuf::from)) {
        Ok(config) => config,
        Err(error) => {
            let _ = init_tracing(&DiagnosticsSink::Stderr);
            error!(error = %error, "config_load_failed");
            return None;
        }
    };

    if let Err(error) = init_tracing(&config.diagnostics) {
        let _ = init_tracing(&DiagnosticsSink::Stderr);
        warn!(error = %error, "diagnostics_fallback_to_stderr");
    }
    info!(
        title = %config.window_title,
        tick_rate = config.tick_rate,
        render_rate = ?config.render_rate,
        "twinloop_demo_startup"
    );

    let headless_for = match env::var(HEADLESS_ENV_VAR) {
        Ok(raw) => match parse_headless_secs(&raw) {
            Ok(duration) => Some(duration),
            Err(error) => {
                error!(error = %error, var = HEADLESS_ENV_VAR, "headless_duration_invalid");
                return None;
            }
        },
        Err(_) => None,
    };

    Some(AppWiring {
        config,
        headless_for,
        summary_path: env::var_os(SUMMARY_ENV_VAR).map(PathBuf::from),
    })
}

fn demo_defaults() -> LoopConfig {
    LoopConfig {
        window_title: "twinloop demo".to_string(),
        window_width: 640,
        window_height: 360,
        ..LoopConfig::default()
    }
}

fn resolve_config(path: Option<PathBuf>) -> Result<LoopConfig, String> {
    let config = match path {
        Some(path) => load_config_file(&path)?,
        None => demo_defaults(),
    };
    config
        .validate()
        .map_err(|error| format!("invalid config: {error}"))?;
    Ok(config)
}

fn load_config_file(path: &Path) -> Result<LoopConfig, String> {
    let raw = fs::read_to_string(path)
        .map_err(|error| format!("read config '{}': {error}", path.display()))?;
    parse_config_json(&raw)
}

fn parse_config_json(raw: &str) -> Result<LoopConfig, String> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    match serde_path_to_error::deserialize::<_, LoopConfig>(&mut deserializer) {
        Ok(config) => Ok(config),
        Err(error) => {
            let path = error.path().to_string();
            let source = error.into_inner();
            if path.is_empty() || path == "." {
                Err(format!("parse config json: {source}"))
            } else {
                Err(format!("parse config json at {path}: {source}"))
            }
        }
    }
}

fn parse_headless_secs(raw: &str) -> Result<Duration, String> {
    let seconds: f64 = raw
        .trim()
        .parse()
        .map_err(|error| format!("'{raw}' is not a number of seconds: {error}"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("headless duration must be positive, got {seconds}"));
    }
    Ok(Duration::from_secs_f64(seconds))
}

fn init_tracing(sink: &DiagnosticsSink) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact();

    let installed = match sink {
        DiagnosticsSink::Stdout => builder.try_init(),
        DiagnosticsSink::Stderr => builder.with_writer(io::stderr).try_init(),
        DiagnosticsSink::File(path) => {
            let file = open_log_file(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        DiagnosticsSink::Disabled => return Ok(()),
    };
    installed.map_err(|error| format!("install tracing subscriber: {error}"))
}

fn open_log_file(path: &Path) -> Result<File, String> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|error| format!("create log dir '{}': {error}", parent.display()))?;
    }
    File::create(path).map_err(|error| format!("open log file '{}': {error}", path.display()))
}
