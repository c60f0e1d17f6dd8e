use std::process::ExitCode;

fn main() -> ExitCode {
    medportal_cli::run()
}
