use std::sync::Arc;

use tracing::debug;

use super::models::{Processor, ProcessorPatch};
use super::store::ProcessorStore;
use crate::common::Result;

/// Keeps the registry record of one processor up to date.
#[derive(Clone)]
pub struct ProcessorManager {
    processor_id: String,
    store: Arc<dyn ProcessorStore>,
}

impl ProcessorManager {
    pub fn new(processor_id: impl Into<String>, store: Arc<dyn ProcessorStore>) -> Self {
        Self {
            processor_id: processor_id.into(),
            store,
        }
    }

    pub fn processor_id(&self) -> &str {
        &self.processor_id
    }

    pub async fn update(&self, patch: ProcessorPatch) -> Result<Processor> {
        debug!(processor_id = %self.processor_id, patch = ?patch, "Updating processor");
        self.store.upsert(&self.processor_id, &patch).await
    }

    pub async fn get(&self) -> Result<Option<Processor>> {
        self.store.find(&self.processor_id).await
    }
}
