//! Factory for the in-memory backing context.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use authstore::{BackingContext, ContextFactory, StoreResult};

use crate::context::{CONTEXT_NAME, MemoryContext};

/// Creates [`MemoryContext`]s.
///
/// By default every `create` call yields a fresh, empty context. A factory
/// built with [`MemoryContextFactory::with_context`] hands out the given
/// context instead, which lets tests inspect the data behind the stores.
#[derive(Debug, Default)]
pub struct MemoryContextFactory {
    shared: Option<Arc<MemoryContext>>,
}

impl MemoryContextFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_context(context: Arc<MemoryContext>) -> Self {
        Self {
            shared: Some(context),
        }
    }
}

#[async_trait]
impl ContextFactory for MemoryContextFactory {
    fn name(&self) -> &str {
        CONTEXT_NAME
    }

    async fn create(&self) -> StoreResult<Arc<dyn BackingContext>> {
        let context = match &self.shared {
            Some(context) => Arc::clone(context),
            None => Arc::new(MemoryContext::new()),
        };
        info!("Created in-memory backing context");
        Ok(context)
    }
}
