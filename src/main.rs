use std::process::ExitCode;

use dvc_data::cli::{self, Exit};
use dvc_data::ui::output;

fn main() -> ExitCode {
    match cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if let Some(Exit(code)) = err.downcast_ref::<Exit>() {
                return ExitCode::from(*code);
            }
            output::error(format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}
