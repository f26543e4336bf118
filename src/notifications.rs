//! Admin notification feed
//!
//! Keeps the most recent notifications in memory for the dashboard and emails
//! the site owner when a visitor writes in. Email delivery is best effort.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::{
    Json,
    extract::{Path, Query, State},
};
use chrono::{DateTime, Utc};
use log::{error, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::mailer::{Email, Notifier};
use crate::models::ContactMessage;

const MAX_NOTIFICATIONS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    ContactMessage,
    System,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationFeed {
    pub notifications: Vec<Notification>,
    pub unread: usize,
}

pub struct NotificationCenter {
    feed: Mutex<VecDeque<Notification>>,
    notifier: Arc<dyn Notifier>,
    /// Where contact notifications are emailed; `None` disables email
    owner_email: Option<String>,
}

impl NotificationCenter {
    pub fn new(notifier: Arc<dyn Notifier>, owner_email: Option<String>) -> Self {
        Self {
            feed: Mutex::new(VecDeque::with_capacity(MAX_NOTIFICATIONS)),
            notifier,
            owner_email,
        }
    }

    pub fn notifier(&self) -> Arc<dyn Notifier> {
        self.notifier.clone()
    }

    pub fn owner_email(&self) -> Option<&str> {
        self.owner_email.as_deref()
    }

    /// Add a notification to the feed, evicting the oldest beyond capacity
    pub fn push(&self, kind: NotificationKind, title: impl Into<String>, body: impl Into<String>) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4().to_string(),
            kind,
            title: title.into(),
            body: body.into(),
            read: false,
            created_at: Utc::now(),
        };

        let mut feed = self.lock();
        feed.push_front(notification.clone());
        feed.truncate(MAX_NOTIFICATIONS);
        notification
    }

    /// Record a contact form submission and email the owner
    pub async fn contact_received(&self, message: &ContactMessage) -> Notification {
        let subject = message
            .subject
            .clone()
            .unwrap_or_else(|| "New message".to_string());
        let notification = self.push(
            NotificationKind::ContactMessage,
            format!("{} from {}", subject, message.name),
            preview(&message.message, 140),
        );

        match &self.owner_email {
            Some(owner) => {
                let email = Email {
                    to: owner.clone(),
                    subject: format!("[Portfolio] {}", subject),
                    body: format!(
                        "Name: {}\nEmail: {}\n\n{}",
                        message.name, message.email, message.message
                    ),
                    reply_to: Some(message.email.clone()),
                };
                if let Err(e) = self.notifier.send(email).await {
                    error!("Failed to email contact notification: {}", e);
                }
            }
            None => warn!("ADMIN_EMAIL not set, contact notification not emailed"),
        }

        notification
    }

    pub fn list(&self, unread_only: bool) -> NotificationFeed {
        let feed = self.lock();
        NotificationFeed {
            notifications: feed
                .iter()
                .filter(|n| !unread_only || !n.read)
                .cloned()
                .collect(),
            unread: feed.iter().filter(|n| !n.read).count(),
        }
    }

    pub fn mark_read(&self, id: &str) -> AppResult<Notification> {
        let mut feed = self.lock();
        let notification = feed
            .iter_mut()
            .find(|n| n.id == id)
            .ok_or_else(|| AppError::not_found("Notification"))?;
        notification.read = true;
        Ok(notification.clone())
    }

    /// Returns how many notifications changed
    pub fn mark_all_read(&self) -> usize {
        let mut feed = self.lock();
        let mut changed = 0;
        for n in feed.iter_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        changed
    }

    pub fn unread_count(&self) -> usize {
        self.lock().iter().filter(|n| !n.read).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Notification>> {
        // A poisoned feed is still usable, it only holds display data
        self.feed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

// Web handler functions below

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedQuery {
    #[serde(default)]
    pub unread_only: bool,
}

pub async fn handle_list(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
) -> Json<NotificationFeed> {
    Json(state.notifications.list(query.unread_only))
}

pub async fn handle_mark_read(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<Notification>> {
    Ok(Json(state.notifications.mark_read(&id)?))
}

pub async fn handle_mark_all_read(State(state): State<AppState>) -> Json<serde_json::Value> {
    let updated = state.notifications.mark_all_read();
    Json(serde_json::json!({ "success": true, "updated": updated }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<Email>>,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, email: Email) -> AppResult<()> {
            if self.fail {
                return Err(AppError::Upstream("smtp down".into()));
            }
            self.sent.lock().unwrap().push(email);
            Ok(())
        }
    }

    fn message() -> ContactMessage {
        ContactMessage {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            subject: Some("Hiring".into()),
            message: "Would you like to work with us?".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_contact_notification_is_emailed() {
        let notifier = Arc::new(RecordingNotifier::default());
        let center = NotificationCenter::new(notifier.clone(), Some("me@example.com".into()));

        let n = center.contact_received(&message()).await;
        assert_eq!(n.kind, NotificationKind::ContactMessage);
        assert_eq!(n.title, "Hiring from Ada");

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "me@example.com");
        assert_eq!(sent[0].reply_to.as_deref(), Some("ada@example.com"));
    }

    #[tokio::test]
    async fn test_email_failure_still_records() {
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..Default::default()
        });
        let center = NotificationCenter::new(notifier, Some("me@example.com".into()));
        center.contact_received(&message()).await;
        assert_eq!(center.unread_count(), 1);
    }

    #[test]
    fn test_read_state_and_capacity() {
        let center = NotificationCenter::new(Arc::new(RecordingNotifier::default()), None);
        for i in 0..(MAX_NOTIFICATIONS + 5) {
            center.push(NotificationKind::System, format!("n{i}"), "");
        }
        let feed = center.list(false);
        assert_eq!(feed.notifications.len(), MAX_NOTIFICATIONS);
        // Newest first
        assert_eq!(feed.notifications[0].title, format!("n{}", MAX_NOTIFICATIONS + 4));

        let first = feed.notifications[0].id.clone();
        center.mark_read(&first).unwrap();
        assert_eq!(center.unread_count(), MAX_NOTIFICATIONS - 1);
        assert!(center.mark_read("missing").is_err());

        assert_eq!(center.mark_all_read(), MAX_NOTIFICATIONS - 1);
        assert!(center.list(true).notifications.is_empty());
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("abcdefghij", 4), "abcd…");
    }
}
