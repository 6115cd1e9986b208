use crate::domain::value_objects::{EntityId, OperationKind, OperationStatus};
use serde::{Deserialize, Serialize};

/// Selection used when listing stored operations. Empty fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationFilter {
    pub statuses: Option<Vec<OperationStatus>>,
    pub target_entity_id: Option<EntityId>,
    pub kinds: Option<Vec<OperationKind>>,
    pub limit: Option<u32>,
}

impl OperationFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_status(status: OperationStatus) -> Self {
        Self {
            statuses: Some(vec![status]),
            ..Self::default()
        }
    }

    pub fn active() -> Self {
        Self {
            statuses: Some(vec![OperationStatus::Pending, OperationStatus::InFlight]),
            ..Self::default()
        }
    }

    pub fn for_target(mut self, target: EntityId) -> Self {
        self.target_entity_id = Some(target);
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<OperationKind>) -> Self {
        self.kinds = Some(kinds);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}
