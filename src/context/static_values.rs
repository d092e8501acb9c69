use uuid::Uuid;

use crate::models::context::{ContextState, ContextValues};

/// Fills declared variables with process-wide constants such as `verify_url`.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    values: ContextValues,
}

impl StaticResolver {
    pub fn new(values: ContextValues) -> Self {
        Self { values }
    }

    pub fn populate(&self, state: &mut ContextState, user_ids: &[Uuid]) {
        for (var, value) in &self.values {
            if !state.is_declared(var) {
                continue;
            }
            for user_id in user_ids {
                state.set(user_id, var, value.clone());
            }
        }
    }
}
