use std::process::ExitCode;

fn main() -> ExitCode {
    timebank_cli::run()
}
