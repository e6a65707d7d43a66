//! Live notifications pushed to a user's open WebSocket connections.
//!
//! One task owns the connection registry; everything else talks to it through
//! a [`NotificationHandle`]. Nothing is persisted: a user with no open
//! connection simply misses the message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::Event;

const MAILBOX_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    EventCreated,
    EventUpdated,
    EventDeleted,
    CalendarSynced,
    Welcome,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub user_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl Notification {
    fn new(
        kind: NotificationKind,
        user_id: Uuid,
        title: &str,
        message: String,
        data: Option<Value>,
    ) -> Self {
        Self {
            kind,
            title: title.to_string(),
            message,
            user_id,
            timestamp: Utc::now(),
            data,
        }
    }

    pub fn welcome(user_id: Uuid) -> Self {
        Self::new(
            NotificationKind::Welcome,
            user_id,
            "Howdy, Cowboy !",
            "Connexion établie avec succès au ranch des notifications".into(),
            None,
        )
    }

    pub fn event_created(user_id: Uuid, event: &Event) -> Self {
        Self::new(
            NotificationKind::EventCreated,
            user_id,
            "Nouvel Événement Créé !",
            format!("\"{}\" a été ajouté au ranch", event.title),
            serde_json::to_value(event).ok(),
        )
    }

    pub fn event_updated(user_id: Uuid, event: &Event) -> Self {
        Self::new(
            NotificationKind::EventUpdated,
            user_id,
            "Événement Mis à Jour",
            format!("\"{}\" a été modifié", event.title),
            serde_json::to_value(event).ok(),
        )
    }

    pub fn event_deleted(user_id: Uuid, title: &str) -> Self {
        Self::new(
            NotificationKind::EventDeleted,
            user_id,
            "Événement Supprimé",
            format!("\"{}\" a quitté le ranch", title),
            None,
        )
    }

    pub fn calendar_synced(user_id: Uuid, calendar_name: &str, event_count: usize) -> Self {
        Self::new(
            NotificationKind::CalendarSynced,
            user_id,
            "Calendrier Synchronisé",
            format!("{} événements synchronisés avec {}", event_count, calendar_name),
            Some(json!({ "calendarName": calendar_name, "eventCount": event_count })),
        )
    }
}

pub type ConnectionId = Uuid;

/// Outgoing frames for one WebSocket, already serialized.
pub type ConnectionSender = mpsc::UnboundedSender<String>;

enum HubCommand {
    Register { user_id: Uuid, connection: ConnectionId, sender: ConnectionSender },
    Unregister { connection: ConnectionId },
    Deliver { notification: Notification },
    Count { user_id: Uuid, reply: oneshot::Sender<usize> },
}

/// Owns the registry. Run it with [`NotificationHub::run`].
pub struct NotificationHub {
    connections: HashMap<Uuid, Vec<(ConnectionId, ConnectionSender)>>,
    command_rx: mpsc::Receiver<HubCommand>,
}

#[derive(Clone)]
pub struct NotificationHandle {
    command_tx: mpsc::Sender<HubCommand>,
}

impl NotificationHub {
    pub fn new() -> (Self, NotificationHandle) {
        let (command_tx, command_rx) = mpsc::channel(MAILBOX_SIZE);
        let hub = Self {
            connections: HashMap::new(),
            command_rx,
        };
        (hub, NotificationHandle { command_tx })
    }

    /// Spawns the hub on the current runtime and returns its handle.
    pub fn spawn() -> NotificationHandle {
        let (hub, handle) = Self::new();
        tokio::spawn(hub.run());
        handle
    }

    pub async fn run(mut self) {
        info!("Notification hub started");
        while let Some(command) = self.command_rx.recv().await {
            match command {
                HubCommand::Register { user_id, connection, sender } => {
                    self.connections.entry(user_id).or_default().push((connection, sender));
                    info!(%user_id, "WebSocket connection registered");
                }
                HubCommand::Unregister { connection } => self.unregister(connection),
                HubCommand::Deliver { notification } => self.deliver(notification),
                HubCommand::Count { user_id, reply } => {
                    let count = self.connections.get(&user_id).map_or(0, Vec::len);
                    let _ = reply.send(count);
                }
            }
        }
        info!("Notification hub stopped");
    }

    fn unregister(&mut self, connection: ConnectionId) {
        self.connections.retain(|user_id, conns| {
            let before = conns.len();
            conns.retain(|(id, _)| *id != connection);
            if conns.len() != before {
                debug!(%user_id, "WebSocket connection removed");
            }
            !conns.is_empty()
        });
    }

    fn deliver(&mut self, notification: Notification) {
        let user_id = notification.user_id;
        let Some(conns) = self.connections.get_mut(&user_id) else {
            debug!(%user_id, "No WebSocket connection, notification dropped");
            return;
        };

        let payload = match serde_json::to_string(&notification) {
            Ok(p) => p,
            Err(e) => {
                warn!("Failed to serialize notification: {}", e);
                return;
            }
        };

        // A failed send means the socket task is gone
        conns.retain(|(_, sender)| sender.send(payload.clone()).is_ok());
        debug!(%user_id, connections = conns.len(), title = %notification.title, "Notification sent");
        if conns.is_empty() {
            self.connections.remove(&user_id);
        }
    }
}

impl NotificationHandle {
    pub async fn register(&self, user_id: Uuid, sender: ConnectionSender) -> ConnectionId {
        let connection = Uuid::new_v4();
        self.send(HubCommand::Register { user_id, connection, sender }).await;
        connection
    }

    pub async fn unregister(&self, connection: ConnectionId) {
        self.send(HubCommand::Unregister { connection }).await;
    }

    pub async fn send_to_user(&self, notification: Notification) {
        self.send(HubCommand::Deliver { notification }).await;
    }

    /// Open connections of `user_id`; 0 when the hub is gone.
    pub async fn connection_count(&self, user_id: Uuid) -> usize {
        let (reply, rx) = oneshot::channel();
        self.send(HubCommand::Count { user_id, reply }).await;
        rx.await.unwrap_or(0)
    }

    pub async fn notify_event_created(&self, user_id: Uuid, event: &Event) {
        self.send_to_user(Notification::event_created(user_id, event)).await;
    }

    pub async fn notify_event_updated(&self, user_id: Uuid, event: &Event) {
        self.send_to_user(Notification::event_updated(user_id, event)).await;
    }

    pub async fn notify_event_deleted(&self, user_id: Uuid, title: &str) {
        self.send_to_user(Notification::event_deleted(user_id, title)).await;
    }

    pub async fn notify_calendar_synced(
        &self,
        user_id: Uuid,
        calendar_name: &str,
        event_count: usize,
    ) {
        self.send_to_user(Notification::calendar_synced(user_id, calendar_name, event_count))
            .await;
    }

    async fn send(&self, command: HubCommand) {
        if self.command_tx.send(command).await.is_err() {
            warn!("Notification hub mailbox closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> (ConnectionSender, mpsc::UnboundedReceiver<String>) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn reaches_every_connection_of_the_user_only() {
        let hub = NotificationHub::spawn();
        let sam = Uuid::new_v4();
        let other = Uuid::new_v4();

        let (tx1, mut rx1) = connection();
        let (tx2, mut rx2) = connection();
        let (tx3, mut rx3) = connection();
        hub.register(sam, tx1).await;
        hub.register(sam, tx2).await;
        hub.register(other, tx3).await;

        hub.notify_event_deleted(sam, "Soirée du rire").await;
        assert_eq!(hub.connection_count(sam).await, 2);

        for rx in [&mut rx1, &mut rx2] {
            let frame = rx.try_recv().unwrap();
            let value: Value = serde_json::from_str(&frame).unwrap();
            assert_eq!(value["type"], "event_deleted");
            assert_eq!(value["userId"], sam.to_string());
            assert!(value.get("data").is_none());
        }
        assert!(rx3.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_connections_are_pruned() {
        let hub = NotificationHub::spawn();
        let sam = Uuid::new_v4();

        let (tx, rx) = connection();
        hub.register(sam, tx).await;
        drop(rx);

        hub.notify_calendar_synced(sam, "Google Calendar", 3).await;
        assert_eq!(hub.connection_count(sam).await, 0);
    }

    #[tokio::test]
    async fn unregister_removes_only_that_connection() {
        let hub = NotificationHub::spawn();
        let sam = Uuid::new_v4();

        let (tx1, _rx1) = connection();
        let (tx2, mut rx2) = connection();
        let first = hub.register(sam, tx1).await;
        hub.register(sam, tx2).await;
        hub.unregister(first).await;
        assert_eq!(hub.connection_count(sam).await, 1);

        hub.send_to_user(Notification::welcome(sam)).await;
        hub.connection_count(sam).await;
        assert!(rx2.try_recv().unwrap().contains("\"type\":\"welcome\""));
    }

    #[test]
    fn calendar_synced_carries_counts() {
        let n = Notification::calendar_synced(Uuid::new_v4(), "Outlook", 4);
        assert_eq!(n.message, "4 événements synchronisés avec Outlook");
        assert_eq!(n.data.unwrap()["eventCount"], 4);
    }
}
