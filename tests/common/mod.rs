use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use dispatch_service::{
    context::{
        ContextChain, ContextChains, ContextResolver, profile::UserDirectory,
        profile::UserProfileResolver,
    },
    dispatch::{ChannelResolver, Dispatcher, NotificationStore, Publisher, RecipientSource},
    error::DispatchError,
    models::{
        message::OutboundMessage,
        notification::{ChannelType, Notification},
        user::{NotificationChannel, UserChannels, UserProfile},
    },
};
use futures_util::{
    StreamExt,
    stream::{self, BoxStream},
};
use uuid::Uuid;

pub const EMAIL_FROM: &str = "notifications@movix.ru";

pub fn user(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

pub fn notification(channels: &[&str], context_vars: &[&str]) -> Notification {
    Notification {
        id: Uuid::new_v4(),
        template_id: Uuid::new_v4(),
        channels: channels.iter().map(|tag| ChannelType::new(*tag)).collect(),
        context_vars: context_vars.iter().map(|var| var.to_string()).collect(),
        title: "New releases this week".to_string(),
        category: None,
    }
}

pub fn user_channels(id: Uuid, channels: &[(&str, &str)]) -> UserChannels {
    UserChannels {
        id,
        channels: channels
            .iter()
            .map(|(channel_type, value)| NotificationChannel {
                channel_type: ChannelType::new(*channel_type),
                value: value.to_string(),
            })
            .collect(),
    }
}

pub fn profile(id: Uuid, first_name: &str) -> UserProfile {
    UserProfile {
        id,
        first_name: first_name.to_string(),
        last_name: "Smith".to_string(),
        username: format!("{}_{}", first_name.to_lowercase(), id.as_u128()),
        is_active: true,
        is_verified: true,
    }
}

#[derive(Default)]
pub struct InMemoryStore {
    notifications: HashMap<Uuid, Notification>,
    audiences: HashMap<Uuid, Vec<Uuid>>,
    pub lookups: AtomicUsize,
    pub pages_served: Arc<AtomicUsize>,
}

impl InMemoryStore {
    pub fn with_notification(mut self, notification: Notification, audience: Vec<Uuid>) -> Self {
        self.audiences.insert(notification.id, audience);
        self.notifications.insert(notification.id, notification);
        self
    }

    pub fn pages_served(&self) -> usize {
        self.pages_served.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn get_notification(&self, id: Uuid) -> Result<Option<Notification>, DispatchError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.notifications.get(&id).cloned())
    }
}

impl RecipientSource for InMemoryStore {
    fn stream_users(
        &self,
        notification_id: Uuid,
        page_size: usize,
    ) -> BoxStream<'_, Result<Vec<Uuid>, DispatchError>> {
        let pages: Vec<Vec<Uuid>> = self
            .audiences
            .get(&notification_id)
            .map(|users| users.chunks(page_size).map(<[Uuid]>::to_vec).collect())
            .unwrap_or_default();
        let served = Arc::clone(&self.pages_served);

        stream::iter(pages)
            .map(move |page| {
                served.fetch_add(1, Ordering::SeqCst);
                Ok(page)
            })
            .boxed()
    }
}

#[derive(Default)]
pub struct FakeChannelResolver {
    channels: HashMap<Uuid, UserChannels>,
    stray: Vec<UserChannels>,
    failing: bool,
    pub calls: Mutex<Vec<Vec<Uuid>>>,
}

impl FakeChannelResolver {
    pub fn with_user(mut self, channels: UserChannels) -> Self {
        self.channels.insert(channels.id, channels);
        self
    }

    /// Entry appended to every response, whether or not it was requested.
    pub fn with_stray(mut self, channels: UserChannels) -> Self {
        self.stray.push(channels);
        self
    }

    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl ChannelResolver for FakeChannelResolver {
    async fn resolve(&self, user_ids: &[Uuid]) -> Result<Vec<UserChannels>, DispatchError> {
        self.calls.lock().unwrap().push(user_ids.to_vec());

        if self.failing {
            return Err(DispatchError::UpstreamAuthFailure(
                "refresh token rejected".to_string(),
            ));
        }

        Ok(user_ids
            .iter()
            .filter_map(|id| self.channels.get(id).cloned())
            .chain(self.stray.iter().cloned())
            .collect())
    }
}

#[derive(Default)]
pub struct FakeDirectory {
    profiles: HashMap<Uuid, UserProfile>,
    pub calls: AtomicUsize,
}

impl FakeDirectory {
    pub fn with_profile(mut self, profile: UserProfile) -> Self {
        self.profiles.insert(profile.id, profile);
        self
    }
}

#[async_trait]
impl UserDirectory for FakeDirectory {
    async fn get_users(&self, user_ids: &[Uuid]) -> Result<Vec<UserProfile>, DispatchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(user_ids
            .iter()
            .filter_map(|id| self.profiles.get(id).cloned())
            .collect())
    }
}

type FailurePredicate = Box<dyn Fn(&OutboundMessage) -> bool + Send + Sync>;

#[derive(Default)]
pub struct RecordingPublisher {
    pub messages: Mutex<Vec<OutboundMessage>>,
    pub attempts: AtomicUsize,
    fail_when: Option<FailurePredicate>,
}

impl RecordingPublisher {
    pub fn failing_when(
        predicate: impl Fn(&OutboundMessage) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            fail_when: Some(Box::new(predicate)),
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<OutboundMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, message: &OutboundMessage) -> Result<(), DispatchError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);

        if self.fail_when.as_ref().is_some_and(|fail| fail(message)) {
            return Err(DispatchError::PublishFailure("channel closed".to_string()));
        }

        self.messages.lock().unwrap().push(message.clone());
        Ok(())
    }
}

pub fn profile_chains(directory: Arc<FakeDirectory>) -> ContextChains {
    ContextChains::single(ContextChain::new(
        "default",
        vec![ContextResolver::UserProfile(UserProfileResolver::new(
            directory,
        ))],
    ))
}

pub fn dispatcher(
    store: Arc<InMemoryStore>,
    channels: Arc<FakeChannelResolver>,
    publisher: Arc<RecordingPublisher>,
    directory: Arc<FakeDirectory>,
    page_size: usize,
) -> Dispatcher {
    Dispatcher::new(
        store.clone(),
        store,
        channels,
        publisher,
        profile_chains(directory),
        page_size,
        EMAIL_FROM,
    )
}
