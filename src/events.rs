//! Fixed system events mapped straight to single-recipient email messages.

use serde_json::Value;

use crate::models::{
    context::ContextValues,
    event::{
        SystemEvent, UserOnPaymentError, UserOnRefund, UserOnRegistration, UserOnSubscription,
    },
    message::{OutboundMessage, Recipients},
    notification::ChannelType,
};

#[derive(Debug, Clone)]
pub struct EventService {
    verify_url: String,
}

impl EventService {
    pub fn new(verify_url: impl Into<String>) -> Self {
        Self {
            verify_url: verify_url.into(),
        }
    }

    pub fn on_registration(&self, user: &UserOnRegistration) -> OutboundMessage {
        let context = context([
            ("verefy_url", self.verify_url.as_str()),
            ("verification_token", user.verification_token.as_str()),
        ]);
        create_message(SystemEvent::Registration, context, &user.email)
    }

    pub fn on_subscription(&self, user: &UserOnSubscription) -> OutboundMessage {
        let context = context([
            ("username", user.username.as_str()),
            ("sub_name", user.subscription_name.as_str()),
        ]);
        create_message(SystemEvent::Subscription, context, &user.email)
    }

    pub fn on_refund(&self, user: &UserOnRefund) -> OutboundMessage {
        let context = context([
            ("username", user.username.as_str()),
            ("amount", user.amount.as_str()),
        ]);
        create_message(SystemEvent::Refund, context, &user.email)
    }

    pub fn on_payment_error(&self, user: &UserOnPaymentError) -> OutboundMessage {
        let context = context([
            ("username", user.username.as_str()),
            ("amount", user.amount.as_str()),
        ]);
        create_message(SystemEvent::PaymentError, context, &user.email)
    }
}

fn context<const N: usize>(pairs: [(&str, &str); N]) -> ContextValues {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
        .collect()
}

fn create_message(event: SystemEvent, context: ContextValues, email: &str) -> OutboundMessage {
    let template = event.template();

    OutboundMessage {
        context,
        template_id: template.template_id,
        channel_type: ChannelType::email(),
        recipients: Recipients {
            to: vec![email.to_string()],
            from: template.send_from.to_string(),
            subject: template.subject.to_string(),
        },
    }
}
