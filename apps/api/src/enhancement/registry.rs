//! One controller per `(resume, field)`, created on first use.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;
use uuid::Uuid;

use crate::enhancement::context_builders::ContextBuilder;
use crate::enhancement::controller::EnhancementController;
use crate::enhancement::poller::PollSettings;
use crate::enhancement_client::EnhancementBackend;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldKey {
    pub resume_id: Uuid,
    pub field: String,
}

impl FieldKey {
    pub fn new(resume_id: Uuid, field: impl Into<String>) -> Self {
        Self {
            resume_id,
            field: field.into(),
        }
    }
}

pub struct FieldRegistry {
    backend: Arc<dyn EnhancementBackend>,
    builder: ContextBuilder,
    settings: PollSettings,
    controllers: Mutex<HashMap<FieldKey, Arc<EnhancementController>>>,
}

impl FieldRegistry {
    pub fn new(
        backend: Arc<dyn EnhancementBackend>,
        builder: ContextBuilder,
        settings: PollSettings,
    ) -> Self {
        Self {
            backend,
            builder,
            settings,
            controllers: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FieldKey, Arc<EnhancementController>>> {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &FieldKey) -> Option<Arc<EnhancementController>> {
        self.lock().get(key).cloned()
    }

    pub fn get_or_create(&self, key: FieldKey) -> Arc<EnhancementController> {
        self.lock()
            .entry(key)
            .or_insert_with_key(|key| {
                debug!("Creating controller for {}/{}", key.resume_id, key.field);
                Arc::new(EnhancementController::new(
                    self.backend.clone(),
                    self.builder,
                    self.settings,
                ))
            })
            .clone()
    }

    /// Removes the controller and cancels its job. Returns whether one existed.
    pub fn teardown(&self, key: &FieldKey) -> bool {
        let removed = self.lock().remove(key);
        match removed {
            Some(controller) => {
                controller.shutdown();
                true
            }
            None => false,
        }
    }

    /// Tears down every controller bound to `resume_id`.
    pub fn teardown_resume(&self, resume_id: Uuid) -> usize {
        let removed: Vec<_> = {
            let mut controllers = self.lock();
            let keys: Vec<FieldKey> = controllers
                .keys()
                .filter(|key| key.resume_id == resume_id)
                .cloned()
                .collect();
            keys.iter()
                .filter_map(|key| controllers.remove(key))
                .collect()
        };

        for controller in &removed {
            controller.shutdown();
        }
        removed.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }
}
