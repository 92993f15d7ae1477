//! Lazily resolved backing context.

use std::fmt;
use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::session::{BackingContext, ContextFactory, Session};

/// Binds stores to a backing context.
///
/// The context is created on first use and then shared by every store. A
/// failed creation is not memoized, so the next operation retries it. When no
/// factory is bound, every operation fails with a configuration error.
pub struct BackingContextBinding {
    factory: Option<Arc<dyn ContextFactory>>,
    context: OnceCell<Arc<dyn BackingContext>>,
}

impl BackingContextBinding {
    /// Creates a binding that resolves through `factory`.
    #[must_use]
    pub fn new(factory: Arc<dyn ContextFactory>) -> Self {
        Self {
            factory: Some(factory),
            context: OnceCell::new(),
        }
    }

    /// Creates a binding with no backing context.
    #[must_use]
    pub fn unbound() -> Self {
        Self {
            factory: None,
            context: OnceCell::new(),
        }
    }

    /// Returns `true` if a factory is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.factory.is_some()
    }

    /// Returns `true` once the context has been created.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.context.initialized()
    }

    /// Returns the backing context, creating it on first use.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no factory is bound, or the factory's
    /// error if the context cannot be created.
    pub async fn context(&self) -> StoreResult<Arc<dyn BackingContext>> {
        let Some(factory) = &self.factory else {
            return Err(StoreError::configuration(
                "No backing context is bound; set `context` in the store configuration",
            ));
        };

        let context = self
            .context
            .get_or_try_init(|| async {
                let context = factory.create().await?;
                info!(context = factory.name(), "Backing context bound");
                Ok::<_, StoreError>(context)
            })
            .await?;

        Ok(Arc::clone(context))
    }

    /// Acquires a session on the backing context.
    ///
    /// # Errors
    ///
    /// See [`context`](Self::context); session acquisition errors are passed
    /// through.
    pub async fn session(&self) -> StoreResult<Box<dyn Session>> {
        self.context().await?.session().await
    }

    /// Closes the backing context if it was created.
    pub async fn close(&self) {
        if let Some(context) = self.context.get() {
            context.close().await;
        }
    }
}

impl fmt::Debug for BackingContextBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackingContextBinding")
            .field("factory", &self.factory.as_ref().map(|factory| factory.name()))
            .field("resolved", &self.is_resolved())
            .finish()
    }
}
