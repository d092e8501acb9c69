use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Variable name to resolved value. Ordered by key so serialization is canonical.
pub type ContextValues = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: Uuid,
    pub context: ContextValues,
}

impl UserContext {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            context: ContextValues::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedContext {
    pub user_ids: Vec<Uuid>,
    pub context: ContextValues,
}

/// Per-user contexts for one batch, shared mutably by every resolver in a chain.
#[derive(Debug, Clone, Default)]
pub struct ContextState {
    declared: BTreeSet<String>,
    order: Vec<Uuid>,
    users: HashMap<Uuid, UserContext>,
}

impl ContextState {
    pub fn new<I, S>(context_vars: I, user_ids: &[Uuid]) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut order = Vec::with_capacity(user_ids.len());
        let mut users = HashMap::with_capacity(user_ids.len());
        for user_id in user_ids {
            if users.insert(*user_id, UserContext::new(*user_id)).is_none() {
                order.push(*user_id);
            }
        }

        Self {
            declared: context_vars.into_iter().map(Into::into).collect(),
            order,
            users,
        }
    }

    pub fn is_declared(&self, var: &str) -> bool {
        self.declared.contains(var)
    }

    pub fn declared(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(String::as_str)
    }

    /// Sets a declared variable for a known user. Anything else is ignored.
    pub fn set(&mut self, user_id: &Uuid, var: &str, value: Value) -> bool {
        if !self.declared.contains(var) {
            return false;
        }

        match self.users.get_mut(user_id) {
            Some(user_context) => {
                user_context.context.insert(var.to_string(), value);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, user_id: &Uuid) -> Option<&UserContext> {
        self.users.get(user_id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Contexts in the order their users were first given.
    pub fn into_contexts(mut self) -> Vec<UserContext> {
        self.order
            .iter()
            .filter_map(|user_id| self.users.remove(user_id))
            .collect()
    }
}
