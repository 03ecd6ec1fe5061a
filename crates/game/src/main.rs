use std::process::ExitCode;

mod app;

fn main() -> ExitCode {
    match app::bootstrap::build_app() {
        Some(app) => app::loop_runner::run(app),
        None => ExitCode::FAILURE,
    }
}
