use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{context::ContextValues, notification::ChannelType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipients {
    pub to: Vec<String>,
    pub from: String,
    pub subject: String,
}

/// Payload handed to the publisher: one per (channel type, context group).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub context: ContextValues,
    pub template_id: Uuid,

    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub recipients: Recipients,
}
