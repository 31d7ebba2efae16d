use std::process::ExitCode;

fn main() -> ExitCode {
    closetmind_cli::run()
}
