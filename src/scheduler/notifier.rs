//! State transitions and their notification.
//!
//! The notifier owns the single "current subscriber" slot. Every transition
//! is validated against the state stored in the transaction, written through
//! it, and then published to the current subscriber in the same transaction.

use std::sync::{Arc, PoisonError, RwLock};

use super::types::SchedulerError;
use crate::core::job::JobExecutionEntity;
use crate::core::state::JobState;
use crate::events::{JobExecutionStatusUpdateHandler, StatusUpdateEvent};
use crate::storage::StorageTransaction;

/// Holds the subscribed handler and performs state transitions.
#[derive(Default)]
pub struct StatusNotifier {
    subscriber: RwLock<Option<Arc<dyn JobExecutionStatusUpdateHandler>>>,
}

impl StatusNotifier {
    /// Create a notifier with no subscriber.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the subscriber. Returns the previous one, if any.
    pub fn subscribe(
        &self,
        handler: Arc<dyn JobExecutionStatusUpdateHandler>,
    ) -> Option<Arc<dyn JobExecutionStatusUpdateHandler>> {
        let mut slot = self
            .subscriber
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        slot.replace(handler)
    }

    /// Whether a subscriber is registered.
    pub fn has_subscriber(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<Arc<dyn JobExecutionStatusUpdateHandler>> {
        self.subscriber
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Move `entity` to `new_state` inside `tx` and notify the subscriber once.
    pub fn change_state(
        &self,
        tx: &mut dyn StorageTransaction,
        entity: &JobExecutionEntity,
        new_state: JobState,
    ) -> Result<(), SchedulerError> {
        let handler = self.current().ok_or(SchedulerError::NoSubscriber)?;

        let current = tx.job_state(entity.id)?;
        if !JobState::allows(current.as_ref(), &new_state) {
            return Err(SchedulerError::InvalidTransition {
                id: entity.id,
                from: current
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "starting".to_string()),
                to: new_state,
            });
        }

        tx.update_job_state(entity.id, new_state.clone())?;
        tracing::debug!(
            job_id = %entity.id,
            tx = %tx.id(),
            state = %new_state,
            "Job state changed"
        );

        let event = StatusUpdateEvent::new(entity.clone(), new_state);
        handler.handle(tx, std::slice::from_ref(&event))?;
        Ok(())
    }
}
