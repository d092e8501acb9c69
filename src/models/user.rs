use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::notification::ChannelType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationChannel {
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
    pub value: String,
}

/// One user's delivery addresses as reported by the identity service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserChannels {
    pub id: Uuid,
    pub channels: Vec<NotificationChannel>,
}

impl UserChannels {
    pub fn addresses_for<'a>(
        &'a self,
        channel_type: &'a ChannelType,
    ) -> impl Iterator<Item = &'a str> + 'a {
        self.channels
            .iter()
            .filter(move |channel| &channel.channel_type == channel_type)
            .map(|channel| channel.value.as_str())
    }

    pub fn has_channel(&self, channel_type: &ChannelType) -> bool {
        self.addresses_for(channel_type).next().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub username: String,

    #[serde(default)]
    pub is_active: bool,

    #[serde(default)]
    pub is_verified: bool,
}
