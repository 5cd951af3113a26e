use std::process::ExitCode;

fn main() -> ExitCode {
    fleetquote_cli::run()
}
