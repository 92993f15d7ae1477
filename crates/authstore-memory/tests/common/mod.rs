//! Shared fixtures for the in-memory store tests.

#![allow(dead_code)]

use std::sync::Arc;

use authstore::{FixedClock, StoreBuilder, StoreServices};
use authstore_memory::{CONTEXT_NAME, MemoryContext, MemoryContextFactory};
use time::OffsetDateTime;
use time::macros::datetime;

pub const NOW: OffsetDateTime = datetime!(2025-06-01 12:00 UTC);

/// Store services over a memory context the test can inspect.
pub struct Harness {
    pub services: StoreServices,
    pub context: Arc<MemoryContext>,
    pub clock: Arc<FixedClock>,
}

pub fn harness() -> Harness {
    harness_with(|builder| builder)
}

pub fn harness_with(configure: impl FnOnce(StoreBuilder) -> StoreBuilder) -> Harness {
    let context = Arc::new(MemoryContext::new());
    let clock = Arc::new(FixedClock::new(NOW));
    let builder = StoreBuilder::new()
        .register_context(Arc::new(MemoryContextFactory::with_context(Arc::clone(
            &context,
        ))))
        .use_context(CONTEXT_NAME)
        .with_clock(clock.clone());

    let services = configure(builder).build().expect("build store services");
    Harness {
        services,
        context,
        clock,
    }
}
