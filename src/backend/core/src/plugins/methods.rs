//! Named-method dispatch for plugin instances.
//!
//! Each plugin type builds one [`MethodTable`] at registration. Instances are
//! type-erased behind [`PluginInstance`] so the catalog can cache instances of
//! every plugin type side by side.

use futures::future::BoxFuture;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::{Arguments, Plugin, PluginError, PluginHealth};
use crate::access::ProjectId;

/// Future returned by a plugin method.
pub type MethodFuture = BoxFuture<'static, Result<Value, PluginError>>;

type Handler<P> = Arc<dyn Fn(Arc<P>, Arguments) -> MethodFuture + Send + Sync>;

// ═══════════════════════════════════════════════════════════════════════════════
// Method Table
// ═══════════════════════════════════════════════════════════════════════════════

/// Method name → async handler for one plugin type.
///
/// ```rust,ignore
/// MethodTable::new()
///     .method("list_posts", |wp: Arc<WordPress>, args| async move { wp.list_posts(args).await })
///     .method("get_post", |wp: Arc<WordPress>, args| async move { wp.get_post(args).await })
/// ```
pub struct MethodTable<P> {
    handlers: BTreeMap<String, Handler<P>>,
}

impl<P: Send + Sync + 'static> MethodTable<P> {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    /// Add a handler. A later registration under the same name replaces the earlier one.
    pub fn method<F, Fut>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<P>, Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, PluginError>> + Send + 'static,
    {
        let handler: Handler<P> = Arc::new(move |plugin: Arc<P>, args: Arguments| -> MethodFuture {
            Box::pin(handler(plugin, args))
        });
        self.handlers.insert(name.into(), handler);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Method names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.handlers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    fn invoke(&self, plugin: Arc<P>, name: &str, args: Arguments) -> Option<MethodFuture> {
        self.handlers.get(name).map(|handler| handler(plugin, args))
    }
}

impl<P: Send + Sync + 'static> Default for MethodTable<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> fmt::Debug for MethodTable<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodTable")
            .field("methods", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Type Erasure
// ═══════════════════════════════════════════════════════════════════════════════

pub(crate) trait ErasedPlugin: Send + Sync {
    fn call(&self, method: &str, args: Arguments) -> Option<MethodFuture>;
    fn health_check(&self) -> BoxFuture<'_, PluginHealth>;
}

pub(crate) struct Bound<P: Plugin> {
    plugin: Arc<P>,
    methods: Arc<MethodTable<P>>,
}

impl<P: Plugin> Bound<P> {
    pub(crate) fn new(plugin: P, methods: Arc<MethodTable<P>>) -> Self {
        Self {
            plugin: Arc::new(plugin),
            methods,
        }
    }
}

impl<P: Plugin> ErasedPlugin for Bound<P> {
    fn call(&self, method: &str, args: Arguments) -> Option<MethodFuture> {
        self.methods.invoke(Arc::clone(&self.plugin), method, args)
    }

    fn health_check(&self) -> BoxFuture<'_, PluginHealth> {
        self.plugin.health_check()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Plugin Instance
// ═══════════════════════════════════════════════════════════════════════════════

/// A constructed plugin bound to one project. Cheap to clone.
#[derive(Clone)]
pub struct PluginInstance {
    inner: Arc<dyn ErasedPlugin>,
    plugin_type: Arc<str>,
    project_id: ProjectId,
}

impl PluginInstance {
    pub(crate) fn new(inner: Arc<dyn ErasedPlugin>, plugin_type: &str, project_id: ProjectId) -> Self {
        Self {
            inner,
            plugin_type: Arc::from(plugin_type),
            project_id,
        }
    }

    /// Invoke a named method. No lock is held while the method runs.
    pub async fn call(&self, method: &str, args: Arguments) -> Result<Value, PluginError> {
        match self.inner.call(method, args) {
            Some(fut) => fut.await,
            None => Err(PluginError::UnknownMethod(method.to_string())),
        }
    }

    pub async fn health_check(&self) -> PluginHealth {
        self.inner.health_check().await
    }

    pub fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    /// Whether two handles refer to the same constructed instance.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("plugin_type", &self.plugin_type)
            .field("project_id", &self.project_id)
            .finish_non_exhaustive()
    }
}
