use std::{collections::HashSet, sync::Arc};

use async_trait::async_trait;
use futures_util::{StreamExt, stream::BoxStream};
use serde::Serialize;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    context::{ContextChains, grouper::group_contexts},
    error::DispatchError,
    models::{
        context::GroupedContext,
        message::{OutboundMessage, Recipients},
        notification::{ChannelType, Notification},
        user::UserChannels,
    },
};

#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, DispatchError>;
}

/// Audience of a notification as lazily fetched pages of user ids.
pub trait RecipientSource: Send + Sync {
    fn stream_users(
        &self,
        notification_id: Uuid,
        page_size: usize,
    ) -> BoxStream<'_, Result<Vec<Uuid>, DispatchError>>;
}

#[async_trait]
pub trait ChannelResolver: Send + Sync {
    async fn resolve(&self, user_ids: &[Uuid]) -> Result<Vec<UserChannels>, DispatchError>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub pages: usize,
    pub users: usize,
    pub messages_published: usize,
    pub publish_failures: usize,
}

pub struct Dispatcher {
    notifications: Arc<dyn NotificationStore>,
    recipients: Arc<dyn RecipientSource>,
    channels: Arc<dyn ChannelResolver>,
    publisher: Arc<dyn Publisher>,
    chains: ContextChains,
    page_size: usize,
    email_from: String,
}

impl Dispatcher {
    pub fn new(
        notifications: Arc<dyn NotificationStore>,
        recipients: Arc<dyn RecipientSource>,
        channels: Arc<dyn ChannelResolver>,
        publisher: Arc<dyn Publisher>,
        chains: ContextChains,
        page_size: usize,
        email_from: impl Into<String>,
    ) -> Self {
        Self {
            notifications,
            recipients,
            channels,
            publisher,
            chains,
            page_size: page_size.max(1),
            email_from: email_from.into(),
        }
    }

    /// Fans one notification out to its whole audience, one page at a time.
    ///
    /// Channel or context resolution failures abort the dispatch; messages
    /// already published stay published. Individual publish failures are
    /// logged and counted without stopping the remaining groups.
    pub async fn dispatch(&self, notification_id: Uuid) -> Result<DispatchSummary, DispatchError> {
        let notification = self
            .notifications
            .get_notification(notification_id)
            .await?
            .ok_or(DispatchError::NotFound(notification_id))?;

        info!(
            %notification_id,
            template_id = %notification.template_id,
            channels = ?notification.channels,
            "Dispatch started"
        );

        let mut summary = DispatchSummary::default();
        let mut pages = self.recipients.stream_users(notification_id, self.page_size);

        while let Some(page) = pages.next().await {
            let user_ids = page?;
            summary.pages += 1;
            summary.users += user_ids.len();
            let page_number = summary.pages;

            self.dispatch_page(&notification, &user_ids, &mut summary)
                .await
                .inspect_err(|e| {
                    warn!(%notification_id, page = page_number, error = %e, "Dispatch aborted");
                })?;
        }

        info!(
            %notification_id,
            pages = summary.pages,
            users = summary.users,
            messages_published = summary.messages_published,
            publish_failures = summary.publish_failures,
            "Dispatch completed"
        );

        Ok(summary)
    }

    async fn dispatch_page(
        &self,
        notification: &Notification,
        user_ids: &[Uuid],
        summary: &mut DispatchSummary,
    ) -> Result<(), DispatchError> {
        let resolved = self.channels.resolve(user_ids).await?;
        let users_channels = page_recipients(user_ids, resolved);
        let channel_types = notification.channel_types();

        let reachable: Vec<Uuid> = users_channels
            .iter()
            .filter(|user| channel_types.iter().any(|channel_type| user.has_channel(channel_type)))
            .map(|user| user.id)
            .collect();

        if reachable.is_empty() {
            debug!(
                notification_id = %notification.id,
                users = user_ids.len(),
                "No reachable recipients on this page"
            );
            return Ok(());
        }

        // One chain run per page; groups are cut per channel type afterwards.
        let chain = self.chains.select(notification);
        let contexts = chain.handle(&notification.context_vars, &reachable).await?;

        debug!(
            notification_id = %notification.id,
            chain = chain.name(),
            recipients = reachable.len(),
            "Context resolved"
        );

        for channel_type in channel_types {
            let matching: Vec<&UserChannels> = users_channels
                .iter()
                .filter(|user| user.has_channel(channel_type))
                .collect();

            if matching.is_empty() {
                debug!(
                    notification_id = %notification.id,
                    %channel_type,
                    "No recipients for channel type on this page"
                );
                continue;
            }

            let members: HashSet<Uuid> = matching.iter().map(|user| user.id).collect();
            let groups = group_contexts(
                contexts
                    .iter()
                    .filter(|user_context| members.contains(&user_context.user_id))
                    .cloned(),
            );

            debug!(
                notification_id = %notification.id,
                %channel_type,
                recipients = matching.len(),
                groups = groups.len(),
                "Context groups built"
            );

            for group in groups {
                let message = self.build_message(notification, channel_type, &matching, group);

                match self.publisher.publish(&message).await {
                    Ok(()) => summary.messages_published += 1,
                    Err(e) => {
                        summary.publish_failures += 1;
                        warn!(
                            notification_id = %notification.id,
                            %channel_type,
                            recipients = message.recipients.to.len(),
                            error = %e,
                            "Failed to publish message"
                        );
                    }
                }
            }
        }

        Ok(())
    }

    fn build_message(
        &self,
        notification: &Notification,
        channel_type: &ChannelType,
        matching: &[&UserChannels],
        group: GroupedContext,
    ) -> OutboundMessage {
        let members: HashSet<&Uuid> = group.user_ids.iter().collect();
        let to = matching
            .iter()
            .filter(|user| members.contains(&user.id))
            .flat_map(|user| user.addresses_for(channel_type))
            .map(str::to_string)
            .collect();

        OutboundMessage {
            context: group.context,
            template_id: notification.template_id,
            channel_type: channel_type.clone(),
            recipients: Recipients {
                to,
                from: self.email_from.clone(),
                subject: notification.title.clone(),
            },
        }
    }
}

/// Channel entries of the requested page only, one per user.
///
/// Entries for users outside the page are dropped; for a repeated user the
/// first entry wins.
fn page_recipients(user_ids: &[Uuid], resolved: Vec<UserChannels>) -> Vec<UserChannels> {
    let requested: HashSet<&Uuid> = user_ids.iter().collect();
    let mut seen = HashSet::with_capacity(resolved.len());

    resolved
        .into_iter()
        .filter(|user| {
            if !requested.contains(&user.id) {
                warn!(user_id = %user.id, "Channel resolver returned a user outside the page");
                return false;
            }
            if !seen.insert(user.id) {
                warn!(user_id = %user.id, "Ignoring repeated channel entry");
                return false;
            }
            true
        })
        .collect()
}
