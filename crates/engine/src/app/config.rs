use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::display::RenderRate;
use super::handler::DEFAULT_REMOVE_QUEUE_CAPACITY;
use super::rendering::Color;

/// Where engine diagnostics go. Installing the matching subscriber is up to
/// the binary; `Disabled` means none is installed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticsSink {
    #[default]
    Stdout,
    Stderr,
    File(PathBuf),
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Simulation ticks per second.
    pub tick_rate: f64,
    pub render_rate: RenderRate,
    /// Most ticks run back-to-back after a stall; the rest of the backlog is
    /// dropped. `None` catches up fully.
    pub max_catch_up_ticks: Option<u32>,
    pub metrics_log_interval_ms: u64,
    pub remove_queue_capacity: usize,
    /// Log render failures with full detail instead of a one-line summary.
    pub show_render_errors: bool,
    pub clear_color: Color,
    pub diagnostics: DiagnosticsSink,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "twinloop".to_string(),
            window_width: 960,
            window_height: 540,
            tick_rate: 60.0,
            render_rate: RenderRate::Monitor,
            max_catch_up_ticks: None,
            metrics_log_interval_ms: 1000,
            remove_queue_capacity: DEFAULT_REMOVE_QUEUE_CAPACITY,
            show_render_errors: false,
            clear_color: Color::rgb(20, 22, 28),
            diagnostics: DiagnosticsSink::Stdout,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("window size must be positive, got {width}x{height}")]
    WindowSize { width: u32, height: u32 },
    #[error("tick rate must be a positive number, got {0}")]
    TickRate(f64),
    #[error("fixed render rate must be a positive number, got {0}")]
    RenderRate(f64),
    #[error("max catch-up ticks must be at least 1")]
    CatchUpTicks,
    #[error("remove queue capacity must be at least 1")]
    RemoveQueueCapacity,
}

impl LoopConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(ConfigError::WindowSize {
                width: self.window_width,
                height: self.window_height,
            });
        }
        if !self.tick_rate.is_finite() || self.tick_rate <= 0.0 {
            return Err(ConfigError::TickRate(self.tick_rate));
        }
        if let RenderRate::Fixed(hz) = self.render_rate {
            if !hz.is_finite() || hz <= 0.0 {
                return Err(ConfigError::RenderRate(hz));
            }
        }
        if self.max_catch_up_ticks == Some(0) {
            return Err(ConfigError::CatchUpTicks);
        }
        if self.remove_queue_capacity == 0 {
            return Err(ConfigError::RemoveQueueCapacity);
        }
        Ok(())
    }

    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate)
    }

    pub fn metrics_log_interval(&self) -> Duration {
        normalize_non_zero_duration(
            Duration::from_millis(self.metrics_log_interval_ms),
            Duration::from_secs(1),
        )
    }
}

fn normalize_non_zero_duration(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = LoopConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.remove_queue_capacity, 65_536);
        assert_eq!(config.max_catch_up_ticks, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let zero_width = LoopConfig {
            window_width: 0,
            ..LoopConfig::default()
        };
        assert!(matches!(
            zero_width.validate(),
            Err(ConfigError::WindowSize { width: 0, .. })
        ));

        let nan_rate = LoopConfig {
            tick_rate: f64::NAN,
            ..LoopConfig::default()
        };
        assert!(matches!(nan_rate.validate(), Err(ConfigError::TickRate(_))));

        let negative_render = LoopConfig {
            render_rate: RenderRate::Fixed(-5.0),
            ..LoopConfig::default()
        };
        assert_eq!(negative_render.validate(), Err(ConfigError::RenderRate(-5.0)));

        let no_catch_up = LoopConfig {
            max_catch_up_ticks: Some(0),
            ..LoopConfig::default()
        };
        assert_eq!(no_catch_up.validate(), Err(ConfigError::CatchUpTicks));

        let no_queue = LoopConfig {
            remove_queue_capacity: 0,
            ..LoopConfig::default()
        };
        assert_eq!(no_queue.validate(), Err(ConfigError::RemoveQueueCapacity));
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let config: LoopConfig = serde_json::from_str(
            r#"{
                "window_title": "demo",
                "tick_rate": 30.0,
                "render_rate": { "fixed": 144.0 },
                "diagnostics": { "file": "engine.log" }
            }"#,
        )
        .expect("config");

        assert_eq!(config.window_title, "demo");
        assert_eq!(config.tick_rate, 30.0);
        assert_eq!(config.render_rate, RenderRate::Fixed(144.0));
        assert_eq!(config.diagnostics, DiagnosticsSink::File("engine.log".into()));
        assert_eq!(config.window_width, LoopConfig::default().window_width);
    }

    #[test]
    fn unit_variants_are_plain_strings() {
        let config: LoopConfig =
            serde_json::from_str(r#"{ "render_rate": "unlimited", "diagnostics": "disabled" }"#)
                .expect("config");
        assert_eq!(config.render_rate, RenderRate::Unlimited);
        assert_eq!(config.diagnostics, DiagnosticsSink::Disabled);
    }

    #[test]
    fn zero_metrics_interval_falls_back_to_one_second() {
        let config = LoopConfig {
            metrics_log_interval_ms: 0,
            ..LoopConfig::default()
        };
        assert_eq!(config.metrics_log_interval(), Duration::from_secs(1));
    }

    #[test]
    fn tick_period_matches_rate() {
        let config = LoopConfig {
            tick_rate: 50.0,
            ..LoopConfig::default()
        };
        assert_eq!(config.tick_period(), Duration::from_millis(20));
    }
}
