// Session orchestration: the login retry loop, the presence broadcast that
// follows a successful login, and logging out at the end.

use crate::backend::{Backend, BroadcastTarget, LoginOutcome, LoginRequest, LoginResult, UserStatus};
use crate::config::ConsoleConfig;
use crate::identity::Identity;
use crate::logger::Logger;
use crate::ui::Console;
use anyhow::Result;
use crossterm::style::Color;
use std::thread;

/// Prompt for credentials until the backend accepts them.
///
/// There is no retry limit. A failed attempt (including a failed second
/// factor or a transport error) starts over with a fresh login name and
/// password. Errors are only returned for console or log failures.
pub fn login<B: Backend, C: Console>(
    backend: &mut B,
    console: &mut C,
    logger: &Logger,
    config: &ConsoleConfig,
    identity: &Identity,
) -> Result<()> {
    loop {
        logger.color(Color::White);
        logger.line("Prompting for login...")?;
        thread::sleep(config.login_delay());

        let username = console.prompt("Login")?;
        logger.record(format!("Login: {username}"))?;
        logger.inline("Password: ")?;
        let password = console.read_password()?;
        logger.line("Attempting to log in...")?;

        let mut request = LoginRequest {
            username,
            password,
            machine_id: identity.machine_id.clone(),
            remember_me: false,
            totp: None,
        };
        let mut result = attempt(backend, console, &request);

        if result.outcome() == LoginOutcome::NeedsSecondFactor {
            logger.line("2FA Code required...")?;
            let code = console.prompt("2FA Code")?;
            logger.record("2FA Code: <entered>")?;
            logger.line("Attempting 2FA login...")?;
            request.totp = Some(code);
            result = attempt(backend, console, &request);
        }

        match result.outcome() {
            LoginOutcome::Success => {
                logger.line("Login successful. Updating user status to Online...")?;
                announce_online(backend, logger)?;
                return Ok(());
            }
            LoginOutcome::NeedsSecondFactor | LoginOutcome::Failed(_) => {
                logger.color(Color::Red);
                logger.line(format!("Error logging in!\t{}", result.content))?;
            }
        }
    }
}

fn attempt<B: Backend, C: Console>(backend: &mut B, console: &C, request: &LoginRequest) -> LoginResult {
    let spinner = console.progress("Logging in...");
    let result = backend.login(request).unwrap_or_else(|err| {
        log::warn!("login request failed: {err:#}");
        LoginResult::error(format!("{err:#}"))
    });
    spinner.finish_and_clear();
    result
}

/// Broadcast an online status to all contacts. A failed broadcast is
/// reported but the session stays usable.
pub fn announce_online<B: Backend>(backend: &mut B, logger: &Logger) -> Result<()> {
    let Some(user_id) = backend.current_user_id() else {
        logger.line("No user id for this session, skipping status update")?;
        return Ok(());
    };
    let status = UserStatus::online(&user_id);
    logger.record(format!("Broadcasting user status: {}", serde_json::to_string(&status)?))?;
    if let Err(err) = backend.broadcast_status(&status, BroadcastTarget::AllContacts) {
        logger.color(Color::Red);
        logger.line(format!("Failed to broadcast user status: {err:#}"))?;
    }
    Ok(())
}

/// Log out and write the closing lines.
pub fn finalize<B: Backend>(backend: &mut B, logger: &Logger) -> Result<()> {
    logger.color(Color::White);
    logger.line("Logging out...")?;
    if let Err(err) = backend.finalize_session() {
        logger.line(format!("Logout failed: {err:#}"))?;
    }
    logger.line("Program ended.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{OnlineStatus, TOTP_REQUIRED};
    use crate::testing::{test_config, test_logger, FakeBackend, ScriptedConsole};

    fn identity() -> Identity {
        Identity {
            machine_id: "machine".into(),
            uid: "UID".into(),
        }
    }

    #[test]
    fn successful_login_broadcasts_online_status() {
        let (_dir, logger) = test_logger();
        let mut backend = FakeBackend::with_logins(vec![LoginResult::ok()]);
        let mut console = ScriptedConsole::new()
            .prompts(&["admin"])
            .passwords(&["secret"]);

        login(&mut backend, &mut console, &logger, &test_config(), &identity()).unwrap();

        assert_eq!(backend.login_requests.len(), 1);
        let request = &backend.login_requests[0];
        assert_eq!(request.username, "admin");
        assert_eq!(request.password, "secret");
        assert_eq!(request.machine_id, "machine");
        assert!(!request.remember_me);
        assert!(request.totp.is_none());

        assert_eq!(backend.statuses.len(), 1);
        let (status, target) = &backend.statuses[0];
        assert_eq!(status.online_status, OnlineStatus::Online);
        assert_eq!(status.user_id, "U-admin");
        assert_eq!(*target, BroadcastTarget::AllContacts);
    }

    #[test]
    fn failure_reprompts_full_credentials() {
        let (_dir, logger) = test_logger();
        let mut backend = FakeBackend::with_logins(vec![
            LoginResult::error("Invalid credentials"),
            LoginResult::ok(),
        ]);
        let mut console = ScriptedConsole::new()
            .prompts(&["admin", "admin2"])
            .passwords(&["wrong", "right"]);

        login(&mut backend, &mut console, &logger, &test_config(), &identity()).unwrap();

        let users: Vec<&str> = backend.login_requests.iter().map(|r| r.username.as_str()).collect();
        let passwords: Vec<&str> = backend.login_requests.iter().map(|r| r.password.as_str()).collect();
        assert_eq!(users, ["admin", "admin2"]);
        assert_eq!(passwords, ["wrong", "right"]);
        let log = std::fs::read_to_string(logger.path()).unwrap();
        assert!(log.contains("Error logging in!\tInvalid credentials"));
    }

    #[test]
    fn totp_sentinel_prompts_for_code_and_retries_with_it() {
        let (_dir, logger) = test_logger();
        let mut backend =
            FakeBackend::with_logins(vec![LoginResult::error(TOTP_REQUIRED), LoginResult::ok()]);
        let mut console = ScriptedConsole::new()
            .prompts(&["admin", "654321"])
            .passwords(&["secret"]);

        login(&mut backend, &mut console, &logger, &test_config(), &identity()).unwrap();

        assert_eq!(backend.login_requests.len(), 2);
        assert_eq!(backend.login_requests[1].totp.as_deref(), Some("654321"));
        assert_eq!(backend.login_requests[1].password, "secret");
    }

    #[test]
    fn failed_second_factor_restarts_from_credentials() {
        let (_dir, logger) = test_logger();
        let mut backend = FakeBackend::with_logins(vec![
            LoginResult::error(TOTP_REQUIRED),
            LoginResult::error("Invalid code"),
            LoginResult::ok(),
        ]);
        let mut console = ScriptedConsole::new()
            .prompts(&["admin", "000000", "admin"])
            .passwords(&["secret", "secret"]);

        login(&mut backend, &mut console, &logger, &test_config(), &identity()).unwrap();

        assert_eq!(backend.login_requests.len(), 3);
        assert!(backend.login_requests[2].totp.is_none());
        assert_eq!(console.passwords_left(), 0);
    }

    #[test]
    fn transport_error_counts_as_failed_attempt() {
        let (_dir, logger) = test_logger();
        let mut backend = FakeBackend::with_logins(vec![LoginResult::ok()]);
        backend.login_transport_failures = 1;
        let mut console = ScriptedConsole::new()
            .prompts(&["admin", "admin"])
            .passwords(&["secret", "secret"]);

        login(&mut backend, &mut console, &logger, &test_config(), &identity()).unwrap();

        assert_eq!(backend.login_requests.len(), 2);
        assert_eq!(backend.statuses.len(), 1);
    }

    #[test]
    fn broadcast_failure_keeps_the_session() {
        let (_dir, logger) = test_logger();
        let mut backend = FakeBackend::with_logins(vec![LoginResult::ok()]);
        backend.fail_broadcast = true;
        let mut console = ScriptedConsole::new().prompts(&["admin"]).passwords(&["secret"]);

        assert!(login(&mut backend, &mut console, &logger, &test_config(), &identity()).is_ok());
        let log = std::fs::read_to_string(logger.path()).unwrap();
        assert!(log.contains("Failed to broadcast user status"));
    }

    #[test]
    fn empty_login_name_is_still_attempted() {
        let (_dir, logger) = test_logger();
        let mut backend = FakeBackend::with_logins(vec![
            LoginResult::error("Invalid credentials"),
            LoginResult::ok(),
        ]);
        let mut console = ScriptedConsole::new()
            .prompts(&["", "admin"])
            .passwords(&["", "secret"]);

        login(&mut backend, &mut console, &logger, &test_config(), &identity()).unwrap();

        assert_eq!(backend.login_requests[0].username, "");
        assert_eq!(backend.login_requests[0].password, "");
        assert_eq!(backend.login_requests.len(), 2);
    }

    #[test]
    fn finalize_logs_out() {
        let (_dir, logger) = test_logger();
        let mut backend = FakeBackend::with_logins(vec![LoginResult::ok()]);

        finalize(&mut backend, &logger).unwrap();

        assert!(backend.finalized);
        let log = std::fs::read_to_string(logger.path()).unwrap();
        assert!(log.contains("Logging out..."));
        assert!(log.contains("Program ended."));
    }
}
