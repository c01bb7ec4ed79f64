use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::models::{ConversationRecord, RawRow, RoleMapping, Settings};
use crate::normalize::normalize_row;

/// An immutable set of normalized records. Reloading produces a new one.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub id: Uuid,
    pub loaded_at: DateTime<Utc>,
    pub records: Vec<ConversationRecord>,
}

impl Dataset {
    pub fn from_rows(rows: &[RawRow], loaded_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            loaded_at,
            records: rows.iter().map(normalize_row).collect(),
        }
    }

    pub fn timestamped(&self) -> usize {
        self.records
            .iter()
            .filter(|record| record.reference_time().is_some())
            .count()
    }
}

#[derive(Debug, Clone)]
pub struct DashboardState {
    dataset: Arc<Dataset>,
    roles: RoleMapping,
    settings: Settings,
}

impl DashboardState {
    pub fn new(dataset: Dataset, roles: RoleMapping, settings: Settings) -> Self {
        Self {
            dataset: Arc::new(dataset),
            roles,
            settings,
        }
    }

    /// Swaps the whole dataset; readers holding the previous snapshot keep it.
    pub fn replace_dataset(&mut self, dataset: Dataset) {
        info!(
            previous = %self.dataset.id,
            next = %dataset.id,
            records = dataset.records.len(),
            "replacing dataset"
        );
        self.dataset = Arc::new(dataset);
    }

    pub fn replace_roles(&mut self, roles: RoleMapping) {
        self.roles = roles;
    }

    pub fn merge_roles(&mut self, roles: RoleMapping) {
        self.roles.merge(roles);
    }

    pub fn snapshot(&self) -> Arc<Dataset> {
        Arc::clone(&self.dataset)
    }

    pub fn records(&self) -> &[ConversationRecord] {
        &self.dataset.records
    }

    pub fn roles(&self) -> &RoleMapping {
        &self.roles
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }
}
