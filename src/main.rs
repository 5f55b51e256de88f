// Entrypoint for the admin console.
// - Keeps `main` small: load the configuration and hand it to the console.
// - A returned error (bad config, unwritable log, terminal failure) exits
//   with status 1.

use admin_console::{config::ConsoleConfig, ui::run_console};

fn main() -> anyhow::Result<()> {
    // Defaults, then the optional config file, then ADMIN_CONSOLE_* env vars.
    // See `config::ConsoleConfig::load`.
    let config = ConsoleConfig::load()?;

    // Blocks until the user types `exit`.
    run_console(config)?;
    Ok(())
}
