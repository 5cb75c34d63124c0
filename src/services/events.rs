//! Domain events
//!
//! Services emit an event after every state change other parts of the
//! system react to. The notification listener turns them into per-user
//! notifications and outgoing mail.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Events emitted by services
#[derive(Debug, Clone)]
pub enum DomainEvent {
    // User events
    UserRegistered {
        user_id: String,
    },
    PasswordChanged {
        user_id: String,
    },

    // Mission events
    MissionPublished {
        mission_id: String,
        department_id: String,
        title: String,
    },
    MissionCanceled {
        mission_id: String,
        title: String,
        reason: Option<String>,
        /// Volunteers whose requests were canceled by the cascade
        volunteer_ids: Vec<String>,
    },

    // Participation events
    ParticipationRequested {
        request_id: String,
        shift_id: String,
        mission_id: String,
        volunteer_id: String,
    },
    ParticipationApproved {
        request_id: String,
        shift_id: String,
        mission_id: String,
        volunteer_id: String,
    },
    ParticipationRejected {
        request_id: String,
        shift_id: String,
        mission_id: String,
        volunteer_id: String,
        reason: Option<String>,
    },
    ParticipationCanceled {
        request_id: String,
        shift_id: String,
        mission_id: String,
        volunteer_id: String,
        by_admin: bool,
        reason: Option<String>,
    },
}

impl DomainEvent {
    /// Dotted name used for notification kinds and logs
    pub fn kind(&self) -> &'static str {
        match self {
            DomainEvent::UserRegistered { .. } => "user.registered",
            DomainEvent::PasswordChanged { .. } => "user.password_changed",
            DomainEvent::MissionPublished { .. } => "mission.published",
            DomainEvent::MissionCanceled { .. } => "mission.canceled",
            DomainEvent::ParticipationRequested { .. } => "participation.requested",
            DomainEvent::ParticipationApproved { .. } => "participation.approved",
            DomainEvent::ParticipationRejected { .. } => "participation.rejected",
            DomainEvent::ParticipationCanceled { .. } => "participation.canceled",
        }
    }
}

/// Events buffered per subscriber before a slow one starts lagging
const EVENT_BUS_CAPACITY: usize = 1024;

/// Broadcast channel between the services and the background listeners
pub struct EventBus {
    sender: broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        Self { sender }
    }

    /// Publish an event; returns how many listeners received it
    pub fn emit(&self, event: DomainEvent) -> usize {
        let kind = event.kind();
        match self.sender.send(event) {
            Ok(listeners) => {
                trace!(kind, listeners, "Domain event emitted");
                listeners
            }
            Err(_) => {
                trace!(kind, "Domain event emitted with no listeners");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DomainEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

fn log_event(event: &DomainEvent) {
    match event {
        DomainEvent::ParticipationApproved {
            request_id, shift_id, ..
        } => {
            debug!(request = %request_id, shift = %shift_id, "Participation approved");
        }
        DomainEvent::MissionCanceled {
            mission_id,
            volunteer_ids,
            ..
        } => {
            debug!(
                mission = %mission_id,
                affected = volunteer_ids.len(),
                "Mission canceled"
            );
        }
        _ => debug!(kind = event.kind(), "Domain event"),
    }
}

/// Spawn a background task that logs every event at debug level
pub fn spawn_logging_listener(event_bus: Arc<EventBus>) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => log_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    debug!(skipped = n, "Event logger lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_emit_receive() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        let delivered = bus.emit(DomainEvent::UserRegistered {
            user_id: "u1".into(),
        });
        assert_eq!(delivered, 1);

        let event = timeout(Duration::from_millis(100), receiver.recv())
            .await
            .expect("timeout")
            .expect("recv error");
        assert_eq!(event.kind(), "user.registered");
    }

    #[tokio::test]
    async fn test_emit_without_subscribers() {
        let bus = EventBus::new();
        let delivered = bus.emit(DomainEvent::PasswordChanged {
            user_id: "u1".into(),
        });
        assert_eq!(delivered, 0);
    }
}
