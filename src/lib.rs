// Library root
// ------------
// The binary (`main.rs`) loads the config and hands it to `ui::run_console`.
//
// Module responsibilities:
// - `api`: blocking HTTP client for the backend, implements `Backend`.
// - `backend`: the contract with the backend plus its data types.
// - `config`: defaults, config file and environment overrides.
// - `identity`: per-run machine id and UID.
// - `inbox`: queue of replies from the current chat target.
// - `logger`: terminal + file logger.
// - `password`: masked password input.
// - `repl`: command parsing and the command loop.
// - `session`: login loop, presence broadcast, logout.
// - `ui`: terminal console and the top-level session driver.
pub mod api;
pub mod backend;
pub mod config;
pub mod identity;
pub mod inbox;
pub mod logger;
pub mod password;
pub mod repl;
pub mod session;
pub mod ui;

#[cfg(test)]
mod testing;
