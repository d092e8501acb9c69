use std::fmt::{Display, Formatter, Result};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery medium tag such as `email` or `sms`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelType(pub String);

impl ChannelType {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn email() -> Self {
        Self::new("email")
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ChannelType {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChannelType {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Uuid,
    pub template_id: Uuid,
    pub channels: Vec<ChannelType>,
    pub context_vars: Vec<String>,
    pub title: String,

    #[serde(default)]
    pub category: Option<String>,
}

impl Notification {
    /// Declared channel types in order, with repeats dropped.
    pub fn channel_types(&self) -> Vec<&ChannelType> {
        let mut seen = Vec::with_capacity(self.channels.len());
        for channel in &self.channels {
            if !seen.contains(&channel) {
                seen.push(channel);
            }
        }
        seen
    }
}
