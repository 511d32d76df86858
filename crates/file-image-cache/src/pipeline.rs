//! Ordered dispatch of lifecycle events to registered plugins

use crate::context::RequestContext;
use crate::hooks::CachePlugin;
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Points in a request's lifecycle where plugins are invoked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    AfterParsingArguments,
    BeforeLoadingSourceImage,
    AfterLoadingSourceImage,
    AfterFinishRequest,
}

impl LifecycleEvent {
    /// Firing order within one request
    pub const ORDER: [LifecycleEvent; 4] = [
        LifecycleEvent::AfterParsingArguments,
        LifecycleEvent::BeforeLoadingSourceImage,
        LifecycleEvent::AfterLoadingSourceImage,
        LifecycleEvent::AfterFinishRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleEvent::AfterParsingArguments => "after_parsing_arguments",
            LifecycleEvent::BeforeLoadingSourceImage => "before_loading_source_image",
            LifecycleEvent::AfterLoadingSourceImage => "after_loading_source_image",
            LifecycleEvent::AfterFinishRequest => "after_finish_request",
        }
    }
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plugins in registration order
#[derive(Default, Clone)]
pub struct Pipeline {
    plugins: Vec<Arc<dyn CachePlugin>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, plugin: Arc<dyn CachePlugin>) -> &mut Self {
        self.plugins.push(plugin);
        self
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Invoke every plugin for `event`, one after another
    pub async fn dispatch(&self, event: LifecycleEvent, ctx: &mut RequestContext) {
        for plugin in &self.plugins {
            trace!(plugin = plugin.name(), %event, url = %ctx.url, "Dispatching lifecycle event");
            match event {
                LifecycleEvent::AfterParsingArguments => plugin.after_parsing_arguments(ctx).await,
                LifecycleEvent::BeforeLoadingSourceImage => {
                    plugin.before_loading_source_image(ctx).await
                }
                LifecycleEvent::AfterLoadingSourceImage => {
                    plugin.after_loading_source_image(ctx).await
                }
                LifecycleEvent::AfterFinishRequest => plugin.after_finish_request(ctx).await,
            }
        }
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.plugins.iter().map(|p| p.name()))
            .finish()
    }
}
