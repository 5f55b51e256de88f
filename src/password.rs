// Masked password prompt. Keys are read in raw mode so nothing the user
// types is echoed; each accepted character is shown as `*` instead.

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::{self, Write};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PromptError {
    #[error("Input interrupted")]
    Interrupted,

    #[error("Terminal error: {0}")]
    Terminal(#[from] io::Error),
}

/// Keys the masked reader cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskedKey {
    Char(char),
    Backspace,
    Enter,
    Interrupt,
}

impl MaskedKey {
    /// Map a terminal key event. Releases, repeats and keys with no text
    /// (arrows, function keys) are ignored.
    pub fn from_event(key: KeyEvent) -> Option<Self> {
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match key.code {
            KeyCode::Enter => Some(MaskedKey::Enter),
            KeyCode::Backspace => Some(MaskedKey::Backspace),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(MaskedKey::Interrupt)
            }
            KeyCode::Char(c) => Some(MaskedKey::Char(c)),
            _ => None,
        }
    }
}

/// Accumulate keys until Enter, echoing a mask to `echo`.
///
/// Backspace drops the last character and erases its `*`; it does nothing on
/// an empty buffer. Running out of keys behaves like Enter.
pub fn read_masked<I, W>(keys: I, echo: &mut W) -> Result<String, PromptError>
where
    I: IntoIterator<Item = Result<MaskedKey, PromptError>>,
    W: Write,
{
    let mut buffer = String::new();
    for key in keys {
        match key? {
            MaskedKey::Enter => break,
            MaskedKey::Interrupt => return Err(PromptError::Interrupted),
            MaskedKey::Backspace => {
                if buffer.pop().is_some() {
                    echo.write_all(b"\x08 \x08")?;
                    echo.flush()?;
                }
            }
            MaskedKey::Char(c) => {
                buffer.push(c);
                echo.write_all(b"*")?;
                echo.flush()?;
            }
        }
    }
    Ok(buffer)
}

/// Read a masked line from the terminal.
pub fn read_masked_line() -> Result<String, PromptError> {
    let result = {
        let _raw = RawModeGuard::enable()?;
        let mut out = io::stdout();
        read_masked(TerminalKeys, &mut out)
    };
    // raw mode is off again, so a plain newline moves to column 0
    println!();
    result
}

/// Raw mode for as long as the guard lives.
struct RawModeGuard;

impl RawModeGuard {
    fn enable() -> io::Result<Self> {
        enable_raw_mode()?;
        Ok(RawModeGuard)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
    }
}

/// Endless stream of keys from the terminal.
struct TerminalKeys;

impl Iterator for TerminalKeys {
    type Item = Result<MaskedKey, PromptError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match event::read() {
                Ok(Event::Key(key)) => {
                    if let Some(key) = MaskedKey::from_event(key) {
                        return Some(Ok(key));
                    }
                }
                Ok(_) => {}
                Err(err) => return Some(Err(err.into())),
            }
        }
    }
}
