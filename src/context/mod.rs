//! Per-user template context: resolver chains and grouping of equal contexts.
//!
//! A chain is an ordered list of resolvers sharing one mutable [`ContextState`].
//! Each resolver fills only the declared variables it knows; later resolvers may
//! overwrite earlier ones, so they run strictly one after another.

pub mod grouper;
pub mod profile;
pub mod static_values;

use std::collections::HashMap;

use anyhow::{Error, anyhow};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::{
    error::DispatchError,
    models::{
        context::{ContextState, UserContext},
        notification::Notification,
    },
};

use self::{profile::UserProfileResolver, static_values::StaticResolver};

pub const DEFAULT_CHAIN: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolverId {
    UserProfile,
    Static,
}

#[derive(Clone)]
pub enum ContextResolver {
    UserProfile(UserProfileResolver),
    Static(StaticResolver),
}

impl ContextResolver {
    pub fn id(&self) -> ResolverId {
        match self {
            ContextResolver::UserProfile(_) => ResolverId::UserProfile,
            ContextResolver::Static(_) => ResolverId::Static,
        }
    }

    pub async fn populate(
        &self,
        state: &mut ContextState,
        user_ids: &[Uuid],
    ) -> Result<(), DispatchError> {
        match self {
            ContextResolver::UserProfile(resolver) => resolver.populate(state, user_ids).await,
            ContextResolver::Static(resolver) => {
                resolver.populate(state, user_ids);
                Ok(())
            }
        }
    }
}

/// Resolver instances available when assembling chains at startup.
#[derive(Clone, Default)]
pub struct ResolverSet {
    pub user_profile: Option<UserProfileResolver>,
    pub static_values: Option<StaticResolver>,
}

impl ResolverSet {
    fn get(&self, id: ResolverId) -> Option<ContextResolver> {
        match id {
            ResolverId::UserProfile => self.user_profile.clone().map(ContextResolver::UserProfile),
            ResolverId::Static => self.static_values.clone().map(ContextResolver::Static),
        }
    }
}

/// Category tag to ordered resolver ids.
pub type ChainLayout = Vec<(String, Vec<ResolverId>)>;

pub fn default_layout() -> ChainLayout {
    vec![(
        DEFAULT_CHAIN.to_string(),
        vec![ResolverId::UserProfile, ResolverId::Static],
    )]
}

#[derive(Clone)]
pub struct ContextChain {
    name: String,
    resolvers: Vec<ContextResolver>,
}

impl ContextChain {
    pub fn new(name: impl Into<String>, resolvers: Vec<ContextResolver>) -> Self {
        Self {
            name: name.into(),
            resolvers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn resolver_ids(&self) -> Vec<ResolverId> {
        self.resolvers.iter().map(ContextResolver::id).collect()
    }

    fn before_chain_execution(&self, user_count: usize) {
        debug!(chain = %self.name, user_count, "Context chain starting");
    }

    fn after_chain_execution(&self, user_count: usize) {
        debug!(chain = %self.name, user_count, "Context chain finished");
    }

    pub async fn handle(
        &self,
        context_vars: &[String],
        user_ids: &[Uuid],
    ) -> Result<Vec<UserContext>, DispatchError> {
        let mut state = ContextState::new(context_vars.iter().cloned(), user_ids);

        self.before_chain_execution(state.len());

        for resolver in &self.resolvers {
            resolver.populate(&mut state, user_ids).await?;
        }

        self.after_chain_execution(state.len());

        Ok(state.into_contexts())
    }
}

/// Chains by notification category, assembled once at startup.
#[derive(Clone)]
pub struct ContextChains {
    default: ContextChain,
    by_category: HashMap<String, ContextChain>,
}

impl ContextChains {
    pub fn single(chain: ContextChain) -> Self {
        Self {
            default: chain,
            by_category: HashMap::new(),
        }
    }

    pub fn build(layout: &ChainLayout, resolvers: &ResolverSet) -> Result<Self, Error> {
        let mut chains = HashMap::new();

        for (category, ids) in layout {
            let chain_resolvers = ids
                .iter()
                .map(|id| {
                    resolvers.get(*id).ok_or_else(|| {
                        anyhow!("Resolver {:?} for chain '{}' is not configured", id, category)
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?;

            chains.insert(category.clone(), ContextChain::new(category.clone(), chain_resolvers));
        }

        let default = chains
            .remove(DEFAULT_CHAIN)
            .ok_or_else(|| anyhow!("Chain layout has no '{}' chain", DEFAULT_CHAIN))?;

        Ok(Self {
            default,
            by_category: chains,
        })
    }

    /// Chain for the notification's category, falling back to the default chain.
    pub fn select(&self, notification: &Notification) -> &ContextChain {
        notification
            .category
            .as_deref()
            .and_then(|category| self.by_category.get(category))
            .unwrap_or(&self.default)
    }
}
