//! Notification fan-out
//!
//! Subscribes to the [`EventBus`], works out who should hear about each
//! domain event, stores a notification per recipient and mirrors the
//! important ones to email through the [`MailOutbox`].

pub mod mailer;

pub use mailer::{mailer_from_args, LogMailer, MailMessage, MailOutbox, Mailer, WebhookMailer};

use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::auth::Role;
use crate::db::schemas::UserDoc;
use crate::db::Collections;
use crate::services::{DomainEvent, EventBus, NotificationService};
use crate::types::Result;

/// What to tell whom for one event
struct Delivery {
    recipients: BTreeSet<String>,
    title: String,
    message: String,
    data: Value,
    mail: bool,
}

pub struct NotificationListener {
    collections: Collections,
    notifications: Arc<NotificationService>,
    outbox: Option<MailOutbox>,
}

impl NotificationListener {
    pub fn new(
        collections: Collections,
        notifications: Arc<NotificationService>,
        outbox: Option<MailOutbox>,
    ) -> Self {
        Self {
            collections,
            notifications,
            outbox,
        }
    }

    async fn mission_title(&self, mission_id: &str) -> Result<String> {
        Ok(self
            .collections
            .missions
            .get_with_deleted(mission_id)
            .await?
            .map(|m| m.title)
            .unwrap_or_default())
    }

    /// Leader of the shift plus administrators of the mission's department
    /// and system administrators
    async fn shift_managers(&self, shift_id: &str, mission_id: &str) -> Result<BTreeSet<String>> {
        let mut managers = BTreeSet::new();

        if let Some(leader) = self
            .collections
            .shifts
            .get_with_deleted(shift_id)
            .await?
            .and_then(|s| s.leader_id)
        {
            managers.insert(leader);
        }

        let department_id = self
            .collections
            .missions
            .get_with_deleted(mission_id)
            .await?
            .map(|m| m.department_id);

        for user in self.collections.users.all().await? {
            if !user.is_active {
                continue;
            }
            let manages = match user.role {
                Role::SystemAdmin => true,
                Role::DepartmentAdmin => {
                    department_id.is_some() && user.department_id == department_id
                }
                _ => false,
            };
            if manages {
                managers.insert(user.id);
            }
        }
        Ok(managers)
    }

    async fn plan(&self, event: &DomainEvent) -> Result<Option<Delivery>> {
        let delivery = match event {
            DomainEvent::UserRegistered { user_id } => Delivery {
                recipients: BTreeSet::from([user_id.clone()]),
                title: "Καλώς ήρθατε".into(),
                message: "Ο λογαριασμός σας δημιουργήθηκε με επιτυχία.".into(),
                data: json!({}),
                mail: true,
            },
            DomainEvent::PasswordChanged { user_id } => Delivery {
                recipients: BTreeSet::from([user_id.clone()]),
                title: "Αλλαγή κωδικού".into(),
                message: "Ο κωδικός πρόσβασής σας άλλαξε. Αν δεν το κάνατε εσείς, επικοινωνήστε με τον διαχειριστή.".into(),
                data: json!({}),
                mail: true,
            },
            DomainEvent::MissionPublished {
                mission_id,
                department_id,
                title,
            } => {
                let recipients = self
                    .collections
                    .users
                    .find(bson::doc! { "department_id": department_id.as_str() })
                    .await?
                    .into_iter()
                    .filter(|u| u.is_active)
                    .map(|u| u.id)
                    .collect();
                Delivery {
                    recipients,
                    title: "Νέα αποστολή".into(),
                    message: format!("Δημοσιεύτηκε η αποστολή «{}».", title),
                    data: json!({ "mission_id": mission_id }),
                    mail: false,
                }
            }
            DomainEvent::MissionCanceled {
                mission_id,
                title,
                reason,
                volunteer_ids,
            } => Delivery {
                recipients: volunteer_ids.iter().cloned().collect(),
                title: "Ακύρωση αποστολής".into(),
                message: match reason {
                    Some(reason) => format!("Η αποστολή «{}» ακυρώθηκε: {}", title, reason),
                    None => format!("Η αποστολή «{}» ακυρώθηκε.", title),
                },
                data: json!({ "mission_id": mission_id, "reason": reason }),
                mail: true,
            },
            DomainEvent::ParticipationRequested {
                request_id,
                shift_id,
                mission_id,
                volunteer_id,
            } => {
                let mut recipients = self.shift_managers(shift_id, mission_id).await?;
                recipients.remove(volunteer_id);
                let volunteer = self
                    .collections
                    .users
                    .get_with_deleted(volunteer_id)
                    .await?
                    .map(|u| u.name)
                    .unwrap_or_default();
                Delivery {
                    recipients,
                    title: "Νέο αίτημα συμμετοχής".into(),
                    message: format!(
                        "Ο/Η {} ζήτησε να συμμετάσχει στην αποστολή «{}».",
                        volunteer,
                        self.mission_title(mission_id).await?
                    ),
                    data: json!({
                        "request_id": request_id,
                        "shift_id": shift_id,
                        "mission_id": mission_id,
                    }),
                    mail: false,
                }
            }
            DomainEvent::ParticipationApproved {
                request_id,
                shift_id,
                mission_id,
                volunteer_id,
            } => Delivery {
                recipients: BTreeSet::from([volunteer_id.clone()]),
                title: "Έγκριση συμμετοχής".into(),
                message: format!(
                    "Το αίτημά σας για την αποστολή «{}» εγκρίθηκε.",
                    self.mission_title(mission_id).await?
                ),
                data: json!({
                    "request_id": request_id,
                    "shift_id": shift_id,
                    "mission_id": mission_id,
                }),
                mail: true,
            },
            DomainEvent::ParticipationRejected {
                request_id,
                shift_id,
                mission_id,
                volunteer_id,
                reason,
            } => {
                let title = self.mission_title(mission_id).await?;
                Delivery {
                    recipients: BTreeSet::from([volunteer_id.clone()]),
                    title: "Απόρριψη συμμετοχής".into(),
                    message: match reason {
                        Some(reason) => format!(
                            "Το αίτημά σας για την αποστολή «{}» απορρίφθηκε: {}",
                            title, reason
                        ),
                        None => format!("Το αίτημά σας για την αποστολή «{}» απορρίφθηκε.", title),
                    },
                    data: json!({
                        "request_id": request_id,
                        "shift_id": shift_id,
                        "mission_id": mission_id,
                        "reason": reason,
                    }),
                    mail: true,
                }
            }
            DomainEvent::ParticipationCanceled {
                request_id,
                shift_id,
                mission_id,
                volunteer_id,
                by_admin,
                reason,
            } => {
                let title = self.mission_title(mission_id).await?;
                let data = json!({
                    "request_id": request_id,
                    "shift_id": shift_id,
                    "mission_id": mission_id,
                    "reason": reason,
                });
                if *by_admin {
                    Delivery {
                        recipients: BTreeSet::from([volunteer_id.clone()]),
                        title: "Ακύρωση συμμετοχής".into(),
                        message: format!(
                            "Η συμμετοχή σας στην αποστολή «{}» ακυρώθηκε από τον υπεύθυνο.",
                            title
                        ),
                        data,
                        mail: true,
                    }
                } else {
                    let mut recipients = self.shift_managers(shift_id, mission_id).await?;
                    recipients.remove(volunteer_id);
                    Delivery {
                        recipients,
                        title: "Ακύρωση συμμετοχής".into(),
                        message: format!(
                            "Ένας εθελοντής ακύρωσε τη συμμετοχή του στην αποστολή «{}».",
                            title
                        ),
                        data,
                        mail: false,
                    }
                }
            }
        };

        if delivery.recipients.is_empty() {
            return Ok(None);
        }
        Ok(Some(delivery))
    }

    fn mail(&self, user: &UserDoc, delivery: &Delivery) {
        if let Some(outbox) = &self.outbox {
            outbox.enqueue(MailMessage {
                to: user.email.clone(),
                subject: delivery.title.clone(),
                body: format!("{},\n\n{}\n", user.name, delivery.message),
            });
        }
    }

    /// Store notifications for one event. Returns how many were written.
    pub async fn handle(&self, event: &DomainEvent) -> Result<usize> {
        let Some(delivery) = self.plan(event).await? else {
            return Ok(0);
        };

        let mut written = 0;
        for user_id in &delivery.recipients {
            // Recipients that no longer exist or were deactivated are skipped
            let Some(user) = self.collections.users.get(user_id).await? else {
                continue;
            };
            if !user.is_active {
                continue;
            }
            self.notifications
                .notify(
                    &user.id,
                    event.kind(),
                    delivery.title.clone(),
                    delivery.message.clone(),
                    delivery.data.clone(),
                )
                .await?;
            written += 1;
            if delivery.mail {
                self.mail(&user, &delivery);
            }
        }

        debug!(kind = event.kind(), recipients = written, "Notifications stored");
        Ok(written)
    }
}

/// Spawn the task that turns domain events into notifications
pub fn spawn_notification_listener(
    listener: Arc<NotificationListener>,
    event_bus: &EventBus,
) -> tokio::task::JoinHandle<()> {
    let mut receiver = event_bus.subscribe();

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if let Err(e) = listener.handle(&event).await {
                        warn!(kind = event.kind(), "Failed to store notifications: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(skipped = n, "Notification listener lagged, skipped events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed, stopping notification listener");
                    break;
                }
            }
        }
    })
}
