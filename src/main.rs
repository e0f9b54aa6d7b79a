//! Provides the main entry point to the program.
use human_panic::setup_panic;
use tatonnement::cli::run_cli;
use tatonnement::log;

fn main() {
    setup_panic!();

    if let Err(err) = run_cli() {
        // Print the full error chain. Use the logger if it is available.
        if log::is_logger_initialised() {
            ::log::error!("{err:?}");
        } else {
            eprintln!("Error: {err:?}");
        }

        std::process::exit(1);
    }
}
