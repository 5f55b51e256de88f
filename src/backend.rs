// Contract with the backend session/messaging/presence layer. The console
// only orchestrates; everything behind this trait (authentication, delivery,
// presence fan-out) is the backend's business.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Content value meaning "a TOTP code is required".
pub const TOTP_REQUIRED: &str = "TOTP";

/// Outcome of a login call as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub is_error: bool,
    pub content: String,
}

/// How the login loop should continue after a [`LoginResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Success,
    NeedsSecondFactor,
    Failed(String),
}

impl LoginResult {
    pub fn ok() -> Self {
        LoginResult { is_error: false, content: String::new() }
    }

    pub fn error(content: impl Into<String>) -> Self {
        LoginResult { is_error: true, content: content.into() }
    }

    pub fn outcome(&self) -> LoginOutcome {
        if self.content == TOTP_REQUIRED {
            LoginOutcome::NeedsSecondFactor
        } else if self.is_error {
            LoginOutcome::Failed(self.content.clone())
        } else {
            LoginOutcome::Success
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    pub machine_id: String,
    pub remember_me: bool,
    pub totp: Option<String>,
}

/// A chat message as exchanged with the backend.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default = "Utc::now")]
    pub send_time: DateTime<Utc>,
}

/// Handle on the conversation with one user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageThread {
    pub user_id: String,
}

/// Called for every message the backend receives for the logged-in user.
pub type MessageListener = Box<dyn Fn(&Message) + Send + Sync>;

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnlineStatus {
    Offline,
    Invisible,
    Away,
    Busy,
    Online,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDevice {
    Unknown,
    Headless,
    Screen,
    #[serde(rename = "VR")]
    Vr,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserSessionType {
    Unknown,
    GraphicalClient,
    ChatClient,
    Headless,
    NotResonite,
}

/// Who receives a status broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastTarget {
    AllContacts,
}

impl BroadcastTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            BroadcastTarget::AllContacts => "allContacts",
        }
    }
}

/// Presence record announced after login.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserStatus {
    pub user_id: String,
    pub online_status: OnlineStatus,
    pub output_device: OutputDevice,
    pub session_type: UserSessionType,
    pub user_session_id: String,
    pub is_present: bool,
    pub last_presence_timestamp: DateTime<Utc>,
    pub last_status_change: DateTime<Utc>,
    pub compatibility_hash: String,
    pub app_version: String,
    pub is_mobile: bool,
}

impl UserStatus {
    /// Online and present, stamped now.
    pub fn online(user_id: &str) -> Self {
        let now = Utc::now();
        UserStatus {
            user_id: user_id.to_string(),
            online_status: OnlineStatus::Online,
            output_device: OutputDevice::Unknown,
            session_type: UserSessionType::GraphicalClient,
            user_session_id: user_id.to_string(),
            is_present: true,
            last_presence_timestamp: now,
            last_status_change: now,
            compatibility_hash: "adminconsole".into(),
            app_version: app_version(),
            is_mobile: false,
        }
    }
}

/// `AdminConsole <crate version>`
pub fn app_version() -> String {
    format!("AdminConsole {}", env!("CARGO_PKG_VERSION"))
}

/// Everything the console needs from the backend.
///
/// Transport problems come back as `Err`; a login the backend refused is an
/// `Ok(LoginResult)` with `is_error` set.
pub trait Backend {
    fn login(&mut self, request: &LoginRequest) -> Result<LoginResult>;

    fn broadcast_status(&mut self, status: &UserStatus, target: BroadcastTarget) -> Result<()>;

    /// Open (or reopen) the conversation with `user_id`.
    fn user_messages(&mut self, user_id: &str) -> Result<MessageThread>;

    /// `Ok(true)` when the backend accepted the message.
    fn send_text(&mut self, thread: &MessageThread, text: &str) -> Result<bool>;

    fn mark_all_read(&mut self, thread: &MessageThread) -> Result<()>;

    fn set_listener(&mut self, listener: MessageListener);

    /// Let the backend process pending network events. Received messages
    /// are handed to the listener from here.
    fn update(&mut self);

    fn current_user_id(&self) -> Option<String>;

    fn current_username(&self) -> Option<String>;

    fn finalize_session(&mut self) -> Result<()>;
}
