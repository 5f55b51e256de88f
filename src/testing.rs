// Test doubles for the backend and the console.

use crate::backend::{
    Backend, BroadcastTarget, LoginRequest, LoginResult, Message, MessageListener, MessageThread,
    UserStatus,
};
use crate::config::ConsoleConfig;
use crate::logger::Logger;
use crate::ui::Console;
use anyhow::Result;
use chrono::Utc;
use indicatif::ProgressBar;
use std::collections::VecDeque;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

/// Config with no delays and a short reply window.
pub fn test_config() -> ConsoleConfig {
    ConsoleConfig {
        colored_output: false,
        login_delay_ms: 0,
        reply_timeout_ms: 50,
        poll_interval_ms: 5,
        ..ConsoleConfig::default()
    }
}

/// Logger writing into a temporary directory. Keep the `TempDir` alive.
pub fn test_logger() -> (TempDir, Arc<Logger>) {
    let dir = tempfile::tempdir().unwrap();
    let logger = Logger::create(dir.path(), false).unwrap();
    (dir, Arc::new(logger))
}

/// Writer standing in for a full disk. With a `needle` set, only entries
/// containing it fail and everything else is discarded.
struct FailingSink {
    needle: Option<&'static str>,
}

impl Write for FailingSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let hit = match self.needle {
            Some(needle) => String::from_utf8_lossy(buf).contains(needle),
            None => true,
        };
        if hit {
            return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Logger whose every file append fails.
pub fn failing_logger() -> Logger {
    Logger::with_sink(PathBuf::from("broken.txt"), Box::new(FailingSink { needle: None }), false)
}

/// Logger that fails only on entries containing `needle`.
pub fn logger_failing_on(needle: &'static str) -> Logger {
    let sink = FailingSink { needle: Some(needle) };
    Logger::with_sink(PathBuf::from("broken.txt"), Box::new(sink), false)
}

pub fn inbound(id: &str, sender: &str, content: &str) -> Message {
    Message {
        id: id.into(),
        sender_id: sender.into(),
        recipient_id: "U-admin".into(),
        content: content.into(),
        send_time: Utc::now(),
    }
}

/// In-memory backend that records every call.
#[derive(Default)]
pub struct FakeBackend {
    pub logins: VecDeque<LoginResult>,
    pub login_requests: Vec<LoginRequest>,
    /// Number of upcoming login calls that fail at the transport level.
    pub login_transport_failures: usize,
    pub user_id: Option<String>,
    pub statuses: Vec<(UserStatus, BroadcastTarget)>,
    pub fail_broadcast: bool,
    pub opened: Vec<String>,
    pub sent: Vec<(String, String)>,
    pub reject_sends: bool,
    pub marked_read: Vec<String>,
    /// Messages handed to the listener, one batch per `update()`.
    pub deliveries: VecDeque<Vec<Message>>,
    pub updates: usize,
    pub finalized: bool,
    listener: Option<MessageListener>,
}

impl FakeBackend {
    pub fn with_logins(logins: Vec<LoginResult>) -> Self {
        FakeBackend {
            logins: logins.into(),
            ..FakeBackend::default()
        }
    }

    pub fn logged_in() -> Self {
        FakeBackend {
            user_id: Some("U-admin".into()),
            ..FakeBackend::default()
        }
    }
}

impl Backend for FakeBackend {
    fn login(&mut self, request: &LoginRequest) -> Result<LoginResult> {
        self.login_requests.push(request.clone());
        if self.login_transport_failures > 0 {
            self.login_transport_failures -= 1;
            anyhow::bail!("connection refused");
        }
        let result = self.logins.pop_front().unwrap_or_else(|| LoginResult::error("no more logins"));
        if !result.is_error {
            self.user_id = Some("U-admin".into());
        }
        Ok(result)
    }

    fn broadcast_status(&mut self, status: &UserStatus, target: BroadcastTarget) -> Result<()> {
        if self.fail_broadcast {
            anyhow::bail!("hub unavailable");
        }
        self.statuses.push((status.clone(), target));
        Ok(())
    }

    fn user_messages(&mut self, user_id: &str) -> Result<MessageThread> {
        self.opened.push(user_id.to_string());
        Ok(MessageThread {
            user_id: user_id.to_string(),
        })
    }

    fn send_text(&mut self, thread: &MessageThread, text: &str) -> Result<bool> {
        if self.reject_sends {
            return Ok(false);
        }
        self.sent.push((thread.user_id.clone(), text.to_string()));
        Ok(true)
    }

    fn mark_all_read(&mut self, thread: &MessageThread) -> Result<()> {
        self.marked_read.push(thread.user_id.clone());
        Ok(())
    }

    fn set_listener(&mut self, listener: MessageListener) {
        self.listener = Some(listener);
    }

    fn update(&mut self) {
        self.updates += 1;
        if let Some(batch) = self.deliveries.pop_front() {
            if let Some(listener) = &self.listener {
                for message in &batch {
                    listener(message);
                }
            }
        }
    }

    fn current_user_id(&self) -> Option<String> {
        self.user_id.clone()
    }

    fn current_username(&self) -> Option<String> {
        self.user_id.as_ref().map(|id| id.trim_start_matches("U-").to_string())
    }

    fn finalize_session(&mut self) -> Result<()> {
        self.finalized = true;
        self.user_id = None;
        Ok(())
    }
}

/// Console fed from fixed scripts. Running out of prompts or passwords is an
/// error; running out of command lines is end of input.
#[derive(Default)]
pub struct ScriptedConsole {
    prompts: VecDeque<String>,
    passwords: VecDeque<String>,
    lines: VecDeque<String>,
    pub cleared: usize,
}

impl ScriptedConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prompts(mut self, answers: &[&str]) -> Self {
        self.prompts.extend(answers.iter().map(|s| s.to_string()));
        self
    }

    pub fn passwords(mut self, answers: &[&str]) -> Self {
        self.passwords.extend(answers.iter().map(|s| s.to_string()));
        self
    }

    pub fn lines(mut self, lines: &[&str]) -> Self {
        self.lines.extend(lines.iter().map(|s| s.to_string()));
        self
    }

    pub fn lines_left(&self) -> usize {
        self.lines.len()
    }

    pub fn passwords_left(&self) -> usize {
        self.passwords.len()
    }
}

impl Console for ScriptedConsole {
    fn prompt(&mut self, label: &str) -> Result<String> {
        self.prompts
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script has no answer for {label:?}"))
    }

    fn read_password(&mut self) -> Result<String> {
        self.passwords
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("script has no password left"))
    }

    fn read_line(&mut self) -> Result<Option<String>> {
        Ok(self.lines.pop_front())
    }

    fn clear_screen(&mut self) -> Result<()> {
        self.cleared += 1;
        Ok(())
    }

    fn progress(&self, _message: &str) -> ProgressBar {
        ProgressBar::hidden()
    }
}
