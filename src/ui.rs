// UI layer: terminal input for the login prompts and the command loop, and
// `run_console`, which drives a whole session from login to logout.
//
// Prompts for values (login name, 2FA code) go through `dialoguer`; the
// password uses the masked reader; command lines are read from stdin after
// the logger has printed the `user> ` prompt.

use crate::api::ApiClient;
use crate::config::ConsoleConfig;
use crate::identity::Identity;
use crate::logger::{self, Logger};
use crate::password;
use crate::repl::Repl;
use crate::session;
use anyhow::{Context, Result};
use chrono::Local;
use crossterm::cursor::MoveTo;
use crossterm::terminal::{Clear, ClearType};
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;

/// Where the session reads user input from.
pub trait Console {
    /// Ask for a labelled value.
    fn prompt(&mut self, label: &str) -> Result<String>;

    /// Read a password without echoing it.
    fn read_password(&mut self) -> Result<String>;

    /// Next command line, `None` once input is closed.
    fn read_line(&mut self) -> Result<Option<String>>;

    fn clear_screen(&mut self) -> Result<()>;

    /// Activity indicator shown while waiting on the backend.
    fn progress(&self, message: &str) -> ProgressBar;
}

/// The interactive terminal.
pub struct TerminalConsole {
    spinner_style: ProgressStyle,
}

impl TerminalConsole {
    pub fn new() -> Result<Self> {
        let spinner_style = ProgressStyle::with_template("{spinner} {msg}")
            .context("Invalid spinner template")?;
        Ok(TerminalConsole { spinner_style })
    }
}

impl Console for TerminalConsole {
    fn prompt(&mut self, label: &str) -> Result<String> {
        let value: String = Input::new()
            .with_prompt(label)
            .allow_empty(true)
            .interact_text()
            .with_context(|| format!("Reading {label}"))?;
        Ok(value.trim().to_string())
    }

    fn read_password(&mut self) -> Result<String> {
        password::read_masked_line().context("Reading password")
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        let mut line = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut line)
            .context("Reading command")?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }

    fn clear_screen(&mut self) -> Result<()> {
        let mut out = io::stdout();
        crossterm::execute!(out, Clear(ClearType::All), MoveTo(0, 0)).context("Clearing the screen")
    }

    fn progress(&self, message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(self.spinner_style.clone());
        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner
    }
}

/// Run a full console session: logger, identity, login, command loop,
/// logout. Returns once the user exits.
pub fn run_console(config: ConsoleConfig) -> Result<()> {
    let logger = Arc::new(Logger::create(&config.log_dir, config.colored_output)?);
    logger::install(Arc::clone(&logger), &config.log_level)?;
    logger.line(format!(
        "Program started at {}",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    ))?;

    let identity = Identity::generate();
    logger.line(format!("Generated machine ID: {}", identity.machine_id))?;
    logger.line(format!("Generated UID: {}", identity.uid))?;

    let mut api = ApiClient::from_config(&config, &identity)?;
    let mut console = TerminalConsole::new()?;

    session::login(&mut api, &mut console, &logger, &config, &identity)?;
    console.clear_screen()?;

    let outcome = Repl::new(&mut api, &mut console, Arc::clone(&logger), &config)
        .and_then(|mut repl| repl.run());
    session::finalize(&mut api, &logger)?;
    outcome
}
