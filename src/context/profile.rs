use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::DispatchError,
    models::{context::ContextState, user::UserProfile},
};

/// Source of user profile data for personalization.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_users(&self, user_ids: &[Uuid]) -> Result<Vec<UserProfile>, DispatchError>;
}

pub const PROFILE_VARS: [&str; 3] = ["first_name", "last_name", "username"];

/// Fills profile-derived variables (`first_name`, `last_name`, `username`).
#[derive(Clone)]
pub struct UserProfileResolver {
    directory: Arc<dyn UserDirectory>,
}

impl UserProfileResolver {
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    pub async fn populate(
        &self,
        state: &mut ContextState,
        user_ids: &[Uuid],
    ) -> Result<(), DispatchError> {
        if !PROFILE_VARS.iter().any(|var| state.is_declared(var)) || user_ids.is_empty() {
            return Ok(());
        }

        let profiles = self.directory.get_users(user_ids).await?;
        debug!(
            requested = user_ids.len(),
            found = profiles.len(),
            "Fetched user profiles for context"
        );

        for profile in profiles {
            let UserProfile {
                id,
                first_name,
                last_name,
                username,
                ..
            } = profile;

            state.set(&id, "first_name", Value::String(first_name));
            state.set(&id, "last_name", Value::String(last_name));
            state.set(&id, "username", Value::String(username));
        }

        Ok(())
    }
}
