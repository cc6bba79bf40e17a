//! Tag and metadata edits on agent service instances.
//!
//! The agent API has no partial update for a service, so every edit reads
//! the current definition, merges the change and re-registers the whole
//! service. The agent offers no compare-and-set on registration; writes made
//! through one editor are serialized, writers in other processes are not
//! detected.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{ConsulBackend, ConsulError};
use crate::models::ServiceRegistration;

/// Read-merge-write editor for instance tags and metadata
#[derive(Debug)]
pub struct ServiceInstanceEditor {
    backend: Arc<dyn ConsulBackend>,
    write_lock: Mutex<()>,
}

impl ServiceInstanceEditor {
    pub fn new(backend: Arc<dyn ConsulBackend>) -> Self {
        Self {
            backend,
            write_lock: Mutex::new(()),
        }
    }

    pub async fn meta(&self, service_id: &str) -> Result<HashMap<String, String>, ConsulError> {
        Ok(self.backend.agent_service(service_id).await?.meta)
    }

    pub async fn tags(&self, service_id: &str) -> Result<Vec<String>, ConsulError> {
        Ok(self.backend.agent_service(service_id).await?.tags)
    }

    /// Merge `patch` into the instance metadata. Returns the metadata as read back.
    pub async fn merge_meta(
        &self,
        service_id: &str,
        patch: HashMap<String, String>,
    ) -> Result<HashMap<String, String>, ConsulError> {
        tracing::info!(
            service_id,
            keys = ?patch.keys().collect::<Vec<_>>(),
            "Updating service meta"
        );
        self.rewrite(service_id, |registration| registration.meta.extend(patch))
            .await?;
        self.meta(service_id).await
    }

    /// Remove metadata keys. Missing keys are ignored.
    pub async fn remove_meta_keys(
        &self,
        service_id: &str,
        keys: &[String],
    ) -> Result<HashMap<String, String>, ConsulError> {
        tracing::info!(service_id, ?keys, "Deleting service meta keys");
        self.rewrite(service_id, |registration| {
            for key in keys {
                registration.meta.remove(key);
            }
        })
        .await?;
        self.meta(service_id).await
    }

    /// Overwrite the instance tags. Returns the tags as read back.
    pub async fn replace_tags(
        &self,
        service_id: &str,
        tags: Vec<String>,
    ) -> Result<Vec<String>, ConsulError> {
        tracing::info!(service_id, ?tags, "Updating service tags");
        self.rewrite(service_id, |registration| registration.tags = tags)
            .await?;
        self.tags(service_id).await
    }

    async fn rewrite<F>(&self, service_id: &str, edit: F) -> Result<(), ConsulError>
    where
        F: FnOnce(&mut ServiceRegistration) + Send,
    {
        let _guard = self.write_lock.lock().await;
        let current = self.backend.agent_service(service_id).await?;
        let mut registration = ServiceRegistration::from_agent(&current);
        edit(&mut registration);
        tracing::debug!(service_id, "Re-registering service with updated definition");
        self.backend.register_service(&registration).await
    }
}
