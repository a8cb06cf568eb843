//! Built-in pipeline stages.

mod context;
mod mutation_queue;
mod partial_failure;
mod retry;

use std::sync::Arc;

pub use context::{
    AuthStage, CACHE_ID_HEADER, CACHE_ID_KEY, CURRENCY_HEADER, CacheIdStage, STORE_HEADER,
    StoreStage,
};
pub use mutation_queue::MutationQueueStage;
pub use partial_failure::{BENIGN_MESSAGES, PartialFailureStage, is_benign, normalize};
pub use retry::{RetryPolicy, RetryStage};

use super::{pipeline::Pipeline, transport::Transport};
use crate::persistence::{ContextDefaults, PersistedStore};

/// Compose the storefront pipeline in its fixed order: mutation queue,
/// retry, auth, cache id, store, partial-failure normalization, transport.
///
/// Context stages sit below retry so each attempt re-reads the store.
pub fn standard_pipeline(
    store: PersistedStore,
    defaults: ContextDefaults,
    retry: RetryPolicy,
    mutations: MutationQueueStage,
    transport: Arc<dyn Transport>,
) -> Pipeline {
    Pipeline::builder(transport)
        .stage(mutations)
        .stage(RetryStage::new(retry))
        .stage(AuthStage::new(store.clone(), defaults.clone()))
        .stage(CacheIdStage::new(store.clone()))
        .stage(StoreStage::new(store, defaults))
        .stage(PartialFailureStage)
        .build()
}
