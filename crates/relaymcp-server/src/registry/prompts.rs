//! Prompt registry backing `prompts/list` and `prompts/get`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use relaymcp_protocol::types::{GetPromptResult, PromptDescriptor};

use crate::context::HandlerContext;
use crate::error::{ServerError, ServerResult};

use super::ListChangedHook;

/// Opaque, embedder-supplied prompt template implementation.
#[async_trait]
pub trait PromptHandler: Send + Sync {
    /// Render the prompt given its declared arguments.
    async fn get(
        &self,
        arguments: HashMap<String, String>,
        ctx: &HandlerContext,
    ) -> ServerResult<GetPromptResult>;

    /// The immutable descriptor advertised by `prompts/list`.
    fn descriptor(&self) -> PromptDescriptor;
}

/// Registry of prompts keyed by name.
pub struct PromptRegistry {
    prompts: DashMap<String, Arc<dyn PromptHandler>>,
    list_changed_hook: RwLock<Option<ListChangedHook>>,
    list_changed_enabled: AtomicBool,
}

impl PromptRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            prompts: DashMap::new(),
            list_changed_hook: RwLock::new(None),
            list_changed_enabled: AtomicBool::new(false),
        }
    }

    /// Install the `list_changed` broadcast hook and whether the server's
    /// `prompts` capability declares `listChanged`.
    pub fn configure_list_changed(&self, enabled: bool, hook: ListChangedHook) {
        self.list_changed_enabled.store(enabled, Ordering::Relaxed);
        *self.list_changed_hook.write() = Some(hook);
    }

    /// Register a prompt. Rejects a duplicate name.
    pub fn register(&self, handler: Arc<dyn PromptHandler>) -> ServerResult<()> {
        let name = handler.descriptor().name.clone();
        if self.prompts.contains_key(&name) {
            return Err(ServerError::DuplicateRegistration(name));
        }
        self.prompts.insert(name, handler);
        self.fire_list_changed();
        Ok(())
    }

    /// Remove a prompt by name. Returns `true` if it existed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.prompts.remove(name).is_some();
        if removed {
            self.fire_list_changed();
        }
        removed
    }

    /// Look up a prompt by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn PromptHandler>> {
        self.prompts.get(name).map(|entry| entry.clone())
    }

    /// All registered prompt descriptors, for `prompts/list`.
    #[must_use]
    pub fn list(&self) -> Vec<PromptDescriptor> {
        self.prompts.iter().map(|entry| entry.value().descriptor()).collect()
    }

    fn fire_list_changed(&self) {
        if self.list_changed_enabled.load(Ordering::Relaxed) {
            if let Some(hook) = self.list_changed_hook.read().as_ref() {
                hook();
            }
        }
    }
}

impl Default for PromptRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relaymcp_protocol::types::{PromptMessage, Role};
    use relaymcp_protocol::types::Content;

    struct Greeting;

    #[async_trait]
    impl PromptHandler for Greeting {
        async fn get(
            &self,
            arguments: HashMap<String, String>,
            _ctx: &HandlerContext,
        ) -> ServerResult<GetPromptResult> {
            let name = arguments.get("name").cloned().unwrap_or_else(|| "friend".to_string());
            Ok(GetPromptResult {
                description: None,
                messages: vec![PromptMessage {
                    role: Role::User,
                    content: Content::Text { text: format!("Hello, {name}!") },
                }],
            })
        }

        fn descriptor(&self) -> PromptDescriptor {
            PromptDescriptor {
                name: "greeting".to_string(),
                description: None,
                arguments: vec![],
            }
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = PromptRegistry::new();
        registry.register(Arc::new(Greeting)).unwrap();
        assert!(matches!(
            registry.register(Arc::new(Greeting)),
            Err(ServerError::DuplicateRegistration(_))
        ));
    }

    #[test]
    fn list_includes_registered_descriptors() {
        let registry = PromptRegistry::new();
        registry.register(Arc::new(Greeting)).unwrap();
        assert_eq!(registry.list().len(), 1);
    }
}
