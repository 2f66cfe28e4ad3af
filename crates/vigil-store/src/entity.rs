//! # Entities
//!
//! A business unit being tracked for compliance. Entities are created at
//! onboarding and never deleted — archival is a lifecycle stage, so the
//! obligation history underneath stays intact.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use vigil_core::EntityId;

/// Where an entity is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStage {
    /// Being set up; obligations may not be assigned yet.
    Onboarding,
    /// Actively tracked. The scheduler and aggregator operate on these.
    Active,
    /// Temporarily inactive (no trading activity); tracked but flagged.
    Dormant,
    /// Soft-archived. Skipped by the scheduler and aggregator, retained
    /// for audit.
    Archived,
}

impl LifecycleStage {
    /// Whether the scheduler and aggregator should process this entity.
    pub fn is_tracked(self) -> bool {
        !matches!(self, Self::Archived)
    }
}

/// Registration metadata captured at onboarding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    /// Corporate identification number, if incorporated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cin: Option<String>,
    /// GST registration number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gstin: Option<String>,
    /// Permanent account number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub incorporated_on: Option<NaiveDate>,
}

/// A business entity owning zero-or-more obligations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub legal_name: String,
    pub registration: RegistrationInfo,
    pub stage: LifecycleStage,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Entity {
    /// Create a new entity in the onboarding stage.
    pub fn new(legal_name: impl Into<String>, registration: RegistrationInfo) -> Self {
        let now = Utc::now();
        Self {
            id: EntityId::new(),
            legal_name: legal_name.into(),
            registration,
            stage: LifecycleStage::Onboarding,
            created_at: now,
            updated_at: now,
        }
    }
}
