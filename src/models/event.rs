use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SystemEvent {
    Registration,
    Subscription,
    Refund,
    PaymentError,
}

/// Fixed delivery settings of a system event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventTemplate {
    pub template_id: Uuid,
    pub send_from: &'static str,
    pub subject: &'static str,
}

impl SystemEvent {
    pub fn template(&self) -> EventTemplate {
        match self {
            SystemEvent::Registration => EventTemplate {
                template_id: Uuid::from_u128(0),
                send_from: "welcome@movix.ru",
                subject: "Confirm you email",
            },
            SystemEvent::Subscription => EventTemplate {
                template_id: Uuid::from_u128(1),
                send_from: "subscription@movix.ru",
                subject: "Enjoy your movies!",
            },
            SystemEvent::Refund => EventTemplate {
                template_id: Uuid::from_u128(2),
                send_from: "refund@movix.ru",
                subject: "Your refund status",
            },
            SystemEvent::PaymentError => EventTemplate {
                template_id: Uuid::from_u128(3),
                send_from: "subscription@movix.ru",
                subject: "One more step...",
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOnRegistration {
    pub email: String,
    pub verification_token: String,
    pub id_user: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOnSubscription {
    pub email: String,
    pub username: String,
    pub subscription_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOnRefund {
    pub email: String,
    pub username: String,
    pub amount: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserOnPaymentError {
    pub email: String,
    pub username: String,
    pub amount: String,
}
