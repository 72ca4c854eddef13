//! Resource registry with URI-template matching, backing
//! `resources/list`/`read`/`templates/list`.
//!
//! Lookup for a concrete `uri` tries an exact key match first, then scans
//! registered templates in registration order; the first matching template
//! wins.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use relaymcp_protocol::types::{
    match_uri_template, ResourceContent, ResourceDescriptor, ResourceTemplateDescriptor,
};

use crate::context::HandlerContext;
use crate::error::{ServerError, ServerResult};

use super::ListChangedHook;

/// Opaque, embedder-supplied resource implementation.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    /// Read the resource at `uri`. For a template match, `ctx.uri_bindings`
    /// carries the extracted named segments.
    async fn read(&self, uri: &str, ctx: &HandlerContext) -> ServerResult<ResourceContent>;
}

struct ExactEntry {
    descriptor: ResourceDescriptor,
    handler: Arc<dyn ResourceHandler>,
}

struct TemplateEntry {
    descriptor: ResourceTemplateDescriptor,
    handler: Arc<dyn ResourceHandler>,
}

/// A resolved resource lookup: the handler to invoke and any URI-template
/// bindings extracted along the way.
pub struct ResourceLookup {
    /// Handler to invoke.
    pub handler: Arc<dyn ResourceHandler>,
    /// Named segments bound from a matched template; empty on an exact hit.
    pub bindings: std::collections::HashMap<String, String>,
}

/// Registry of concrete resources and URI templates.
pub struct ResourceRegistry {
    exact: DashMap<String, ExactEntry>,
    templates: DashMap<String, TemplateEntry>,
    template_order: RwLock<Vec<String>>,
    list_changed_hook: RwLock<Option<ListChangedHook>>,
    list_changed_enabled: AtomicBool,
}

impl ResourceRegistry {
    /// Construct an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            exact: DashMap::new(),
            templates: DashMap::new(),
            template_order: RwLock::new(Vec::new()),
            list_changed_hook: RwLock::new(None),
            list_changed_enabled: AtomicBool::new(false),
        }
    }

    /// Install the `list_changed` broadcast hook and whether the server's
    /// `resources` capability declares `listChanged`.
    pub fn configure_list_changed(&self, enabled: bool, hook: ListChangedHook) {
        self.list_changed_enabled.store(enabled, Ordering::Relaxed);
        *self.list_changed_hook.write() = Some(hook);
    }

    /// Register a concrete resource.
    pub fn register(
        &self,
        descriptor: ResourceDescriptor,
        handler: Arc<dyn ResourceHandler>,
    ) -> ServerResult<()> {
        let uri = descriptor.uri.clone();
        if self.exact.contains_key(&uri) {
            return Err(ServerError::DuplicateRegistration(uri));
        }
        self.exact.insert(uri, ExactEntry { descriptor, handler });
        self.fire_list_changed();
        Ok(())
    }

    /// Register a URI template.
    pub fn register_template(
        &self,
        descriptor: ResourceTemplateDescriptor,
        handler: Arc<dyn ResourceHandler>,
    ) -> ServerResult<()> {
        let template = descriptor.uri_template.clone();
        if self.templates.contains_key(&template) {
            return Err(ServerError::DuplicateRegistration(template));
        }
        self.templates.insert(template.clone(), TemplateEntry { descriptor, handler });
        self.template_order.write().push(template);
        self.fire_list_changed();
        Ok(())
    }

    /// Remove a concrete resource by uri, invalidating it for lookup.
    /// Returns `true` if it existed.
    pub fn unregister(&self, uri: &str) -> bool {
        let removed = self.exact.remove(uri).is_some();
        if removed {
            self.fire_list_changed();
        }
        removed
    }

    /// Resolve `uri` to a handler: exact match first, then the first
    /// matching template in registration order.
    #[must_use]
    pub fn resolve(&self, uri: &str) -> Option<ResourceLookup> {
        if let Some(entry) = self.exact.get(uri) {
            return Some(ResourceLookup {
                handler: entry.handler.clone(),
                bindings: std::collections::HashMap::new(),
            });
        }

        for template in self.template_order.read().iter() {
            let Some(entry) = self.templates.get(template) else {
                continue;
            };
            if let Some(bindings) = match_uri_template(&entry.descriptor.uri_template, uri) {
                return Some(ResourceLookup {
                    handler: entry.handler.clone(),
                    bindings,
                });
            }
        }

        None
    }

    /// All registered concrete resource descriptors, for `resources/list`.
    #[must_use]
    pub fn list(&self) -> Vec<ResourceDescriptor> {
        self.exact.iter().map(|entry| entry.value().descriptor.clone()).collect()
    }

    /// All registered templates, for `resources/templates/list`.
    #[must_use]
    pub fn list_templates(&self) -> Vec<ResourceTemplateDescriptor> {
        self.template_order
            .read()
            .iter()
            .filter_map(|t| self.templates.get(t).map(|entry| entry.descriptor.clone()))
            .collect()
    }

    fn fire_list_changed(&self) {
        if self.list_changed_enabled.load(Ordering::Relaxed) {
            if let Some(hook) = self.list_changed_hook.read().as_ref() {
                hook();
            }
        }
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticResource(String);

    #[async_trait]
    impl ResourceHandler for StaticResource {
        async fn read(&self, uri: &str, _ctx: &HandlerContext) -> ServerResult<ResourceContent> {
            Ok(ResourceContent::text(uri, "text/plain", self.0.clone()))
        }
    }

    fn descriptor(uri: &str) -> ResourceDescriptor {
        ResourceDescriptor {
            uri: uri.to_string(),
            name: uri.to_string(),
            description: None,
            mime_type: Some("text/plain".to_string()),
        }
    }

    #[test]
    fn exact_match_wins_over_a_template() {
        let registry = ResourceRegistry::new();
        registry
            .register(descriptor("file:///a.txt"), Arc::new(StaticResource("exact".into())))
            .unwrap();
        registry
            .register_template(
                ResourceTemplateDescriptor {
                    uri_template: "file:///{name}".to_string(),
                    name: "any file".to_string(),
                    description: None,
                    mime_type: None,
                },
                Arc::new(StaticResource("template".into())),
            )
            .unwrap();

        let lookup = registry.resolve("file:///a.txt").unwrap();
        assert!(lookup.bindings.is_empty());
    }

    #[test]
    fn template_resolves_with_bindings_on_miss() {
        let registry = ResourceRegistry::new();
        registry
            .register_template(
                ResourceTemplateDescriptor {
                    uri_template: "file:///{name}".to_string(),
                    name: "any file".to_string(),
                    description: None,
                    mime_type: None,
                },
                Arc::new(StaticResource("template".into())),
            )
            .unwrap();

        let lookup = registry.resolve("file:///b.txt").unwrap();
        assert_eq!(lookup.bindings.get("name"), Some(&"b.txt".to_string()));
    }

    #[test]
    fn unregister_invalidates_exact_lookup() {
        let registry = ResourceRegistry::new();
        registry
            .register(descriptor("file:///a.txt"), Arc::new(StaticResource("exact".into())))
            .unwrap();
        assert!(registry.unregister("file:///a.txt"));
        assert!(registry.resolve("file:///a.txt").is_none());
    }

    #[test]
    fn unresolved_uri_returns_none() {
        let registry = ResourceRegistry::new();
        assert!(registry.resolve("file:///missing.txt").is_none());
    }
}
