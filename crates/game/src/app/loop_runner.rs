use std::path::Path;
use std::process::ExitCode;

use tracing::{error, info};
use twinloop::{run_app, run_headless, write_rows, LoopSummary, TextFileError};

use super::bootstrap::AppWiring;
use super::gameplay;

pub(crate) fn run(app: AppWiring) -> ExitCode {
    let result = match app.headless_for {
        Some(duration) => run_headless(&app.config, gameplay::build_scene, duration),
        None => run_app(app.config, gameplay::build_scene),
    };

    let summary = match result {
        Ok(summary) => summary,
        Err(err) => {
            error!(error = %err, "startup_failed");
            return ExitCode::FAILURE;
        }
    };
    info!(
        ticks = summary.ticks,
        frames = summary.frames,
        render_failures = summary.render_failures,
        "demo_finished"
    );

    if let Some(path) = &app.summary_path {
        if let Err(err) = write_summary(path, &summary) {
            error!(error = %err, "summary_write_failed");
            return ExitCode::FAILURE;
        }
        info!(path = %path.display(), "summary_written");
    }

    ExitCode::SUCCESS
}

fn summary_rows(summary: &LoopSummary) -> [[String; 2]; 3] {
    [
        ["ticks".to_string(), summary.ticks.to_string()],
        ["frames".to_string(), summary.frames.to_string()],
        [
            "render_failures".to_string(),
            summary.render_failures.to_string(),
        ],
    ]
}

fn write_summary(path: &Path, summary: &LoopSummary) -> Result<(), TextFileError> {
    write_rows(path, summary_rows(summary))
}

#[cfg(test)]
mod tests {
    use twinloop::read_tokens;

    use super::*;

    #[test]
    fn summary_is_written_as_name_value_rows() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.txt");
        let summary = LoopSummary {
            ticks: 120,
            frames: 58,
            render_failures: 2,
        };

        write_summary(&path, &summary).expect("write summary");

        assert_eq!(
            read_tokens(&path).expect("read summary"),
            vec!["ticks", "120", "frames", "58", "render_failures", "2"]
        );
    }
}
