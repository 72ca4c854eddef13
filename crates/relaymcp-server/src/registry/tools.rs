//! Tool registry backing `tools/list` and `tools/call`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde_json::Value;

use relaymcp_protocol::types::{CallToolResult, ToolDescriptor};

use crate::context::HandlerContext;
use crate::error::{ServerError, ServerResult};

use super::ListChangedHook;

/// Opaque, embedder-supplied tool implementation. `arguments` is the raw
/// `arguments` object from `tools/call`; schema validation against
/// [`ToolHandler::descriptor`]'s `inputSchema` is the embedder's
/// responsibility.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Execute the tool call.
    async fn call(&self, arguments: Value, ctx: &HandlerContext) -> ServerResult<CallToolResult>;

    /// The immutable descriptor advertised by `tools/list`.
    fn descriptor(&self) -> ToolDescriptor;
}

/// Registry of tools keyed by name.
pub struct ToolRegistry {
    tools: DashMap<String, Arc<dyn ToolHandler>>,
    list_changed_hook: RwLock<Option<ListChangedHook>>,
    list_changed_enabled: AtomicBool,
}

impl ToolRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
            list_changed_hook: RwLock::new(None),
            list_changed_enabled: AtomicBool::new(false),
        }
    }

    /// Install the `list_changed` broadcast hook and whether the server's
    /// `tools` capability declares `listChanged`.
    pub fn configure_list_changed(&self, enabled: bool, hook: ListChangedHook) {
        self.list_changed_enabled.store(enabled, Ordering::Relaxed);
        *self.list_changed_hook.write() = Some(hook);
    }

    /// Register a tool. Rejects a duplicate name with `-32602`, and fires
    /// `list_changed` if enabled.
    pub fn register(&self, handler: Arc<dyn ToolHandler>) -> ServerResult<()> {
        let name = handler.descriptor().name.clone();
        if self.tools.contains_key(&name) {
            return Err(ServerError::DuplicateRegistration(name));
        }
        self.tools.insert(name, handler);
        self.fire_list_changed();
        Ok(())
    }

    /// Remove a tool by name. Returns `true` if it existed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.tools.remove(name).is_some();
        if removed {
            self.fire_list_changed();
        }
        removed
    }

    /// Look up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).map(|entry| entry.clone())
    }

    /// All registered tool descriptors, for `tools/list`.
    #[must_use]
    pub fn list(&self) -> Vec<ToolDescriptor> {
        self.tools.iter().map(|entry| entry.value().descriptor()).collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tools are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    fn fire_list_changed(&self) {
        if self.list_changed_enabled.load(Ordering::Relaxed) {
            if let Some(hook) = self.list_changed_hook.read().as_ref() {
                hook();
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct Echo;

    #[async_trait]
    impl ToolHandler for Echo {
        async fn call(&self, arguments: Value, _ctx: &HandlerContext) -> ServerResult<CallToolResult> {
            Ok(CallToolResult::text(arguments.to_string()))
        }

        fn descriptor(&self) -> ToolDescriptor {
            ToolDescriptor {
                name: "echo".to_string(),
                description: None,
                input_schema: serde_json::json!({"type": "object"}),
            }
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(Echo)).unwrap();
        assert!(matches!(
            registry.register(Arc::new(Echo)),
            Err(ServerError::DuplicateRegistration(_))
        ));
    }

    #[test]
    fn list_changed_fires_only_when_enabled() {
        let registry = ToolRegistry::new();
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        registry.configure_list_changed(false, Arc::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        registry.register(Arc::new(Echo)).unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        registry.configure_list_changed(true, {
            let count = count.clone();
            Arc::new(move || {
                count.fetch_add(1, Ordering::SeqCst);
            })
        });
        registry.unregister("echo");
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unregister_unknown_returns_false() {
        let registry = ToolRegistry::new();
        assert!(!registry.unregister("nope"));
    }
}
