use std::collections::HashMap;

use serde_json::Value;

use crate::models::context::{ContextValues, GroupedContext, UserContext};

/// Canonical grouping key of a context.
///
/// `ContextValues` iterates in key order and nested JSON objects are ordered
/// maps as well, so equal contexts always render to the same string.
pub fn context_signature(context: &ContextValues) -> String {
    Value::Object(
        context
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
    .to_string()
}

/// Collapses users whose resolved contexts are equal into one group each.
pub fn group_contexts<I>(contexts: I) -> Vec<GroupedContext>
where
    I: IntoIterator<Item = UserContext>,
{
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<GroupedContext> = Vec::new();

    for user_context in contexts {
        let signature = context_signature(&user_context.context);

        match index.get(&signature) {
            Some(&position) => groups[position].user_ids.push(user_context.user_id),
            None => {
                index.insert(signature, groups.len());
                groups.push(GroupedContext {
                    user_ids: vec![user_context.user_id],
                    context: user_context.context,
                });
            }
        }
    }

    groups
}
