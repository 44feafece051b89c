use std::process::ExitCode;

fn main() -> ExitCode {
    netops_cli::run()
}
