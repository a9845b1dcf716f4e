use std::process::ExitCode;

fn main() -> ExitCode {
    haulquote_cli::run()
}
