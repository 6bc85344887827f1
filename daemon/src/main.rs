use std::process::exit;

mod args;
mod daemon;
mod monitor;

use args::Args;
use provenance_core::log::{init_logger, init_panic_hook};

pub fn main() {
    let args = match Args::parse() {
        Ok(args) => args,
        Err(err) => {
            // clap renders usage/help itself; argument errors are exit code 1
            let _ = err.print();
            exit(if err.use_stderr() { daemon::EXIT_ARGS } else { daemon::EXIT_OK });
        }
    };

    init_logger(args.log_dir.as_deref(), &args.log_level);
    init_panic_hook();

    exit(daemon::run(args));
}
