// API client module: a small blocking HTTP client for the backend's REST
// surface. It implements `Backend`, so the login loop and the REPL never see
// reqwest directly.
//
// Messages are polled: every `update()` fetches unread messages for the
// thread opened last and hands the ones not seen before to the listener.

use crate::backend::{
    Backend, BroadcastTarget, LoginRequest, LoginResult, Message, MessageListener, MessageThread,
    UserStatus,
};
use crate::config::ConsoleConfig;
use crate::identity::Identity;
use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Not logged in")]
    NoSession,

    #[error("{action} failed: {status} - {body}")]
    Status {
        action: &'static str,
        status: StatusCode,
        body: String,
    },
}

/// Session returned by a successful login.
#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub user_id: String,
    pub token: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct LoginBody<'a> {
    username: &'a str,
    authentication: PasswordLogin<'a>,
    secret_machine_id: &'a str,
    remember_me: bool,
}

#[derive(Serialize, Debug)]
struct PasswordLogin<'a> {
    #[serde(rename = "$type")]
    kind: &'static str,
    password: &'a str,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct OutgoingMessage<'a> {
    #[serde(flatten)]
    message: &'a Message,
    message_type: &'static str,
}

/// Blocking backend client. Holds the reqwest client, the API base URL,
/// this instance's UID and, once logged in, the session.
pub struct ApiClient {
    client: Client,
    base_url: String,
    uid: String,
    session: Option<UserSession>,
    poll_timeout: Duration,
    thread: Option<String>,
    seen: HashSet<String>,
    unread: HashMap<String, Vec<String>>,
    listener: Option<MessageListener>,
}

impl ApiClient {
    pub fn new(base_url: &str, uid: &str) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("AdminConsole/{}", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            uid: uid.to_string(),
            session: None,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            thread: None,
            seen: HashSet::new(),
            unread: HashMap::new(),
            listener: None,
        })
    }

    pub fn from_config(config: &ConsoleConfig, identity: &Identity) -> Result<Self> {
        Ok(Self::new(&config.api_url, &identity.uid)?.with_poll_timeout(config.reply_timeout()))
    }

    /// Upper bound for one poll in `update()`, so a hung backend cannot hold
    /// the reply wait past its window.
    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    pub fn session(&self) -> Option<&UserSession> {
        self.session.as_ref()
    }

    fn require_session(&self) -> Result<&UserSession> {
        self.session.as_ref().ok_or_else(|| ApiError::NoSession.into())
    }

    /// Attach `Authorization: res <userId>:<token>`.
    fn authorized(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        let session = self.require_session()?;
        let value = HeaderValue::from_str(&format!("res {}:{}", session.user_id, session.token))
            .context("Session token is not a valid header value")?;
        Ok(req.header(AUTHORIZATION, value))
    }

    fn messages_url(&self) -> Result<String> {
        let session = self.require_session()?;
        Ok(format!("{}/users/{}/messages", self.base_url, session.user_id))
    }

    fn fetch_unread(&self, other: &str) -> Result<Vec<Message>> {
        let url = self.messages_url()?;
        let req = self
            .client
            .get(&url)
            .query(&[("unread", "true"), ("user", other)])
            .timeout(self.poll_timeout);
        let res = self.authorized(req)?.send().context("Failed to send messages request")?;
        let res = check(res, "Fetching messages")?;
        res.json().context("Parsing messages response json")
    }

    /// Drop the pending ids of `user_id`. They are delivered again if the
    /// server still reports them unread the next time the thread is polled.
    fn forget(&mut self, user_id: &str) {
        if let Some(ids) = self.unread.remove(user_id) {
            for id in ids {
                self.seen.remove(&id);
            }
        }
    }
}

/// Turn a non-success response into an [`ApiError::Status`].
fn check(res: Response, action: &'static str) -> Result<Response> {
    if res.status().is_success() {
        return Ok(res);
    }
    let status = res.status();
    let body = res.text().unwrap_or_default();
    Err(ApiError::Status { action, status, body }.into())
}

impl Backend for ApiClient {
    fn login(&mut self, request: &LoginRequest) -> Result<LoginResult> {
        let url = format!("{}/userSessions", self.base_url);
        let body = LoginBody {
            username: &request.username,
            authentication: PasswordLogin {
                kind: "password",
                password: &request.password,
            },
            secret_machine_id: &request.machine_id,
            remember_me: request.remember_me,
        };
        let mut req = self.client.post(&url).header("UID", &self.uid).json(&body);
        if let Some(code) = &request.totp {
            req = req.header("TOTP", code.trim());
        }
        let res = req.send().context("Failed to send login request")?;
        if !res.status().is_success() {
            let status = res.status();
            let txt = res.text().unwrap_or_default();
            log::debug!("login rejected with {status}");
            // A bare "TOTP" body is how the backend asks for a second factor.
            let content = match txt.trim() {
                "" => status.to_string(),
                other => other.to_string(),
            };
            return Ok(LoginResult::error(content));
        }
        let session: UserSession = res.json().context("Parsing login response json")?;
        log::info!("session established for {}", session.user_id);
        self.session = Some(session);
        Ok(LoginResult::ok())
    }

    fn broadcast_status(&mut self, status: &UserStatus, target: BroadcastTarget) -> Result<()> {
        let session = self.require_session()?;
        let url = format!("{}/users/{}/status", self.base_url, session.user_id);
        let req = self
            .client
            .put(&url)
            .query(&[("target", target.as_str())])
            .json(status);
        let res = self.authorized(req)?.send().context("Failed to send status update")?;
        check(res, "Status broadcast")?;
        Ok(())
    }

    fn user_messages(&mut self, user_id: &str) -> Result<MessageThread> {
        if self.thread.as_deref() != Some(user_id) {
            if let Some(previous) = self.thread.replace(user_id.to_string()) {
                self.forget(&previous);
            }
        }
        Ok(MessageThread {
            user_id: user_id.to_string(),
        })
    }

    fn send_text(&mut self, thread: &MessageThread, text: &str) -> Result<bool> {
        let sender = self.require_session()?.user_id.clone();
        let message = Message {
            id: format!("MSG-{}", Uuid::new_v4()),
            sender_id: sender,
            recipient_id: thread.user_id.clone(),
            content: text.to_string(),
            send_time: Utc::now(),
        };
        let url = self.messages_url()?;
        let req = self.client.post(&url).json(&OutgoingMessage {
            message: &message,
            message_type: "Text",
        });
        let res = self.authorized(req)?.send().context("Failed to send message")?;
        if !res.status().is_success() {
            log::warn!("message {} rejected: {}", message.id, res.status());
            return Ok(false);
        }
        Ok(true)
    }

    fn mark_all_read(&mut self, thread: &MessageThread) -> Result<()> {
        let ids = match self.unread.get(&thread.user_id) {
            Some(ids) if !ids.is_empty() => ids.clone(),
            _ => return Ok(()),
        };
        let url = self.messages_url()?;
        let req = self.client.patch(&url).json(&ids);
        let res = self.authorized(req)?.send().context("Failed to send mark-read request")?;
        check(res, "Marking messages read")?;
        self.forget(&thread.user_id);
        Ok(())
    }

    fn set_listener(&mut self, listener: MessageListener) {
        self.listener = Some(listener);
    }

    fn update(&mut self) {
        let me = match &self.session {
            Some(session) => session.user_id.clone(),
            None => return,
        };
        let Some(other) = self.thread.clone() else {
            return;
        };
        let messages = match self.fetch_unread(&other) {
            Ok(messages) => messages,
            Err(err) => {
                log::warn!("polling messages from {other} failed: {err:#}");
                return;
            }
        };
        for message in messages {
            if message.sender_id == me || !self.seen.insert(message.id.clone()) {
                continue;
            }
            self.unread
                .entry(message.sender_id.clone())
                .or_default()
                .push(message.id.clone());
            if let Some(listener) = &self.listener {
                listener(&message);
            }
        }
    }

    fn current_user_id(&self) -> Option<String> {
        self.session.as_ref().map(|s| s.user_id.clone())
    }

    fn current_username(&self) -> Option<String> {
        self.session
            .as_ref()
            .map(|s| s.user_name.clone().unwrap_or_else(|| s.user_id.clone()))
    }

    fn finalize_session(&mut self) -> Result<()> {
        let session = match &self.session {
            Some(session) => session.clone(),
            None => return Ok(()),
        };
        let url = format!(
            "{}/userSessions/{}/{}",
            self.base_url, session.user_id, session.token
        );
        let req = self.client.delete(&url);
        let res = self.authorized(req)?.send().context("Failed to send logout request")?;
        self.session = None;
        check(res, "Logout")?;
        Ok(())
    }
}
