use std::process::ExitCode;

fn main() -> ExitCode {
    match salescope_cli::run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("salescope: {error:#}");
            ExitCode::FAILURE
        }
    }
}
