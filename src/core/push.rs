//! Push payloads, notification intents, and the page/notification seams.
//!
//! A push message becomes a [`NotificationIntent`] shown through a
//! [`Notifier`]. Clicking it routes to an open page through [`Clients`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Action id that dismisses a notification.
pub const ACTION_CLOSE: &str = "close";
/// Action id that opens the notification's target.
pub const ACTION_OPEN: &str = "open";

/// Push message data. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushPayload {
    pub title: Option<String>,
    pub body: Option<String>,
    pub icon: Option<String>,
    pub badge: Option<String>,
    pub tag: Option<String>,
    pub url: Option<String>,
}

impl PushPayload {
    /// Decode raw push data.
    ///
    /// Returns `None` for absent or blank data. A JSON object is read field
    /// by field: a field counts only when it is a non-empty string. Data
    /// that is not a JSON object becomes the body of an otherwise empty
    /// payload.
    #[must_use]
    pub fn parse(data: Option<&[u8]>) -> Option<Self> {
        let data = data?;
        let text = String::from_utf8_lossy(data);
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Object(fields)) => Some(Self::from_fields(&fields)),
            Ok(_) => {
                tracing::debug!("push data is not a JSON object, using it as body");
                Some(Self::body_only(trimmed))
            }
            Err(err) => {
                tracing::debug!(error = %err, "push data is not JSON, using it as body");
                Some(Self::body_only(trimmed))
            }
        }
    }

    fn from_fields(fields: &Map<String, Value>) -> Self {
        let field = |name: &str| match fields.get(name) {
            Some(Value::String(value)) if !value.trim().is_empty() => Some(value.clone()),
            Some(Value::String(_)) | None => None,
            Some(other) => {
                tracing::debug!(field = name, value = %other, "push field is not a string, using default");
                None
            }
        };
        Self {
            title: field("title"),
            body: field("body"),
            icon: field("icon"),
            badge: field("badge"),
            tag: field("tag"),
            url: field("url"),
        }
    }

    fn body_only(text: &str) -> Self {
        Self {
            body: Some(text.to_string()),
            ..Self::default()
        }
    }
}

/// Defaults applied to every field a push payload leaves out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationDefaults {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub url: String,
    /// Vibration pattern in milliseconds.
    pub vibrate: Vec<u32>,
}

impl Default for NotificationDefaults {
    fn default() -> Self {
        Self {
            title: "New notification".to_string(),
            body: "You have a new update".to_string(),
            icon: "/icon-192.png".to_string(),
            badge: "/badge-72.png".to_string(),
            tag: "default".to_string(),
            url: "/".to_string(),
            vibrate: vec![100, 50, 100],
        }
    }
}

/// A button on a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub action: String,
    pub title: String,
}

/// A notification ready to be shown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationIntent {
    pub title: String,
    pub body: String,
    pub icon: String,
    pub badge: String,
    pub tag: String,
    pub vibrate: Vec<u32>,
    /// Page opened or focused when the notification is clicked.
    pub url: String,
    pub actions: Vec<NotificationAction>,
}

impl NotificationIntent {
    /// Map a payload field by field, filling gaps from `defaults`.
    #[must_use]
    pub fn from_payload(payload: PushPayload, defaults: &NotificationDefaults) -> Self {
        Self {
            title: payload.title.unwrap_or_else(|| defaults.title.clone()),
            body: payload.body.unwrap_or_else(|| defaults.body.clone()),
            icon: payload.icon.unwrap_or_else(|| defaults.icon.clone()),
            badge: payload.badge.unwrap_or_else(|| defaults.badge.clone()),
            tag: payload.tag.unwrap_or_else(|| defaults.tag.clone()),
            vibrate: defaults.vibrate.clone(),
            url: payload.url.unwrap_or_else(|| defaults.url.clone()),
            actions: vec![
                NotificationAction {
                    action: ACTION_OPEN.to_string(),
                    title: "Open".to_string(),
                },
                NotificationAction {
                    action: ACTION_CLOSE.to_string(),
                    title: "Close".to_string(),
                },
            ],
        }
    }
}

/// A user interaction with a shown notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationClick {
    /// The notification that was interacted with.
    pub notification: NotificationIntent,
    /// The action button pressed; `None` for a click on the body.
    pub action: Option<String>,
}

impl NotificationClick {
    /// Whether the interaction only dismisses the notification.
    #[must_use]
    pub fn is_dismiss(&self) -> bool {
        self.action.as_deref() == Some(ACTION_CLOSE)
    }
}

/// An open page window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowClient {
    pub id: String,
    pub url: String,
    pub focused: bool,
}

/// Open pages of the governed origin.
#[async_trait]
pub trait Clients: Send + Sync {
    /// Take control of every open page.
    async fn claim(&self) -> Result<()>;

    /// All open window clients, including uncontrolled ones.
    async fn match_all_windows(&self) -> Result<Vec<WindowClient>>;

    /// Bring a window to the foreground.
    async fn focus(&self, id: &str) -> Result<()>;

    /// Open a new window at `url`.
    async fn open_window(&self, url: &str) -> Result<()>;
}

/// System notification surface.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Display a notification.
    async fn show(&self, intent: &NotificationIntent) -> Result<()>;

    /// Close a displayed notification by tag.
    async fn close(&self, tag: &str) -> Result<()>;
}

/// Notifier that writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn show(&self, intent: &NotificationIntent) -> Result<()> {
        tracing::info!(
            title = %intent.title,
            body = %intent.body,
            tag = %intent.tag,
            url = %intent.url,
            "notification shown"
        );
        Ok(())
    }

    async fn close(&self, tag: &str) -> Result<()> {
        tracing::debug!(tag, "notification closed");
        Ok(())
    }
}

/// Clients for a host with no page windows (CLI and proxy).
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessClients;

#[async_trait]
impl Clients for HeadlessClients {
    async fn claim(&self) -> Result<()> {
        tracing::debug!("no page windows to claim");
        Ok(())
    }

    async fn match_all_windows(&self) -> Result<Vec<WindowClient>> {
        Ok(Vec::new())
    }

    async fn focus(&self, id: &str) -> Result<()> {
        tracing::debug!(id, "focus requested without windows");
        Ok(())
    }

    async fn open_window(&self, url: &str) -> Result<()> {
        tracing::info!(url, "open window requested");
        Ok(())
    }
}
