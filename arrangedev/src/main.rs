mod application;
mod logging;

mod presentation {
    pub mod cli;
}

use std::process::ExitCode;

fn main() -> ExitCode {
    let _ = logging::init_logger();
    match application::run() {
        Ok(summary) if summary.success() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
