// Command loop run after login. Each line is either a console command
// (`exit`, `changeuser <name>`) or a message for the current target. After a
// message is sent the loop polls the backend for a bounded time and prints
// whatever the target replied.

use crate::backend::{Backend, Message, MessageThread};
use crate::config::ConsoleConfig;
use crate::inbox::{Delivery, Inbox};
use crate::logger::Logger;
use crate::ui::Console;
use anyhow::Result;
use crossterm::style::Color;
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const CHANGE_USER: &str = "changeuser ";
const USER_ID_PREFIX: &str = "U-";

/// A parsed input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Exit,
    ChangeUser(String),
    Send(String),
}

impl Command {
    /// Parse one line of input.
    ///
    /// One leading `/` is stripped before anything else is matched, so
    /// `/exit` and `/changeuser bob` work like their bare forms.
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        let line = line.strip_prefix('/').unwrap_or(line);
        if line.eq_ignore_ascii_case("exit") {
            return Command::Exit;
        }
        if let Some(user) = line.strip_prefix(CHANGE_USER) {
            return Command::ChangeUser(user.trim().to_string());
        }
        Command::Send(line.to_string())
    }
}

/// `bob` -> `U-bob`; ids that already carry the prefix are kept.
pub fn normalize_user_id(user: &str) -> String {
    if user.starts_with(USER_ID_PREFIX) {
        user.to_string()
    } else {
        format!("{USER_ID_PREFIX}{user}")
    }
}

/// Owns the chat state for the lifetime of the loop: current target, the
/// thread handle for it, and the inbox the listener feeds.
pub struct Repl<'a, B: Backend, C: Console> {
    backend: &'a mut B,
    console: &'a mut C,
    logger: Arc<Logger>,
    config: &'a ConsoleConfig,
    inbox: Arc<Inbox>,
    target: String,
    thread: MessageThread,
    cancelled: bool,
}

impl<'a, B: Backend, C: Console> Repl<'a, B, C> {
    /// Open the thread with the administrative account, hook the message
    /// listener up to a fresh inbox and pump the backend once.
    pub fn new(
        backend: &'a mut B,
        console: &'a mut C,
        logger: Arc<Logger>,
        config: &'a ConsoleConfig,
    ) -> Result<Self> {
        let target = config.admin_user.clone();
        let thread = backend.user_messages(&target)?;
        let inbox = Arc::new(Inbox::new(target.clone(), config.inbox_capacity));

        let listener_inbox = Arc::clone(&inbox);
        let listener_logger = Arc::clone(&logger);
        backend.set_listener(Box::new(move |message: &Message| {
            listener_logger.line_detached(format!(
                "Message received from {}: {}",
                message.sender_id, message.content
            ));
            if listener_inbox.offer(message) == Delivery::QueuedDroppingOldest {
                log::warn!("inbox full, dropped the oldest message");
            }
        }));

        logger.line("Setting up message listener...")?;
        backend.update();
        logger.take_failure()?;

        Ok(Repl {
            backend,
            console,
            logger,
            config,
            inbox,
            target,
            thread,
            cancelled: false,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Run until `exit` or end of input.
    pub fn run(&mut self) -> Result<()> {
        while !self.cancelled {
            let username = self
                .backend
                .current_username()
                .unwrap_or_else(|| self.target.clone());
            self.logger.color(Color::DarkYellow);
            self.logger.inline(format!("{username}> "))?;
            self.logger.color(Color::Yellow);

            let Some(line) = self.console.read_line()? else {
                self.logger.line("End of input. Exiting...")?;
                self.cancelled = true;
                break;
            };
            self.execute(&line)?;
        }
        Ok(())
    }

    /// Handle one input line.
    pub fn execute(&mut self, line: &str) -> Result<()> {
        let command = Command::parse(line);
        self.logger.line(format!("Received command: {}", line.trim()))?;

        match command {
            Command::Empty => {
                self.logger.line("Empty command. Skipping...")?;
            }
            Command::Exit => {
                self.logger.line("Exit command received. Canceling...")?;
                self.cancelled = true;
            }
            Command::ChangeUser(user) => self.change_user(&user)?,
            Command::Send(payload) => self.send_and_collect(&payload)?,
        }
        Ok(())
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    fn change_user(&mut self, user: &str) -> Result<()> {
        self.target = normalize_user_id(user);
        self.inbox.retarget(self.target.clone());
        self.logger.line(format!("Changed current user to: {}", self.target))?;
        self.thread = self.backend.user_messages(&self.target)?;
        Ok(())
    }

    fn send_and_collect(&mut self, payload: &str) -> Result<()> {
        let text = if self.target == self.config.admin_user {
            format!("/{payload}")
        } else {
            payload.to_string()
        };

        self.logger.line(format!("Sending command: {text}"))?;
        let sent = match self.backend.send_text(&self.thread, &text) {
            Ok(accepted) => accepted,
            Err(err) => {
                log::warn!("send to {} failed: {err:#}", self.thread.user_id);
                false
            }
        };
        if !sent {
            self.logger.color(Color::Red);
            self.logger.line("Error sending message!")?;
            return Ok(());
        }

        self.logger.line("Waiting for response...")?;
        self.wait_for_reply()?;

        for message in self.inbox.drain() {
            self.logger.color(Color::Blue);
            self.logger.inline(format!("{}: ", self.target))?;
            self.logger.line(&message.content)?;
        }

        if let Err(err) = self.backend.mark_all_read(&self.thread) {
            log::warn!("marking {} read failed: {err:#}", self.thread.user_id);
        }
        Ok(())
    }

    /// Pump the backend until something is queued or the reply timeout runs
    /// out. Running out is not an error.
    fn wait_for_reply(&mut self) -> Result<()> {
        let spinner = self.console.progress("Waiting for response...");
        let started = Instant::now();
        while self.inbox.is_empty() && started.elapsed() < self.config.reply_timeout() {
            thread::sleep(self.config.poll_interval());
            self.backend.update();
            self.logger.take_failure()?;
        }
        spinner.finish_and_clear();
        Ok(())
    }
}
