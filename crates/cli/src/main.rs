use std::process::ExitCode;

fn main() -> ExitCode {
    costgate_cli::run()
}
