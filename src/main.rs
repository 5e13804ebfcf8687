//! Binary entrypoint that serves the conversation API.

use std::process::ExitCode;

use chatvault::start_chatvault;

fn main() -> ExitCode {
    start_chatvault::run()
}
