use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use tradeledger_core::{CompanyId, UserId};

use crate::event::Event;

/// Audit trail entry describing one committed mutation.
///
/// This is the unit handed to the audit sink:
/// - **Multi-tenancy** is carried via `company_id`.
/// - `before` / `after` are JSON snapshots of the affected entity; either may be
///   absent (creation has no `before`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    record_id: Uuid,
    company_id: CompanyId,
    actor_id: UserId,

    /// Stable action name, taken from the event type (e.g. "inventory.transfer.reversed").
    action: String,
    entity_type: String,
    entity_id: Uuid,

    before: Option<JsonValue>,
    after: Option<JsonValue>,

    occurred_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Build an audit record from a committed domain event.
    pub fn from_event<E>(
        company_id: CompanyId,
        actor_id: UserId,
        entity_type: impl Into<String>,
        entity_id: Uuid,
        event: &E,
    ) -> Self
    where
        E: Event,
    {
        Self {
            record_id: Uuid::now_v7(),
            company_id,
            actor_id,
            action: event.event_type().to_string(),
            entity_type: entity_type.into(),
            entity_id,
            before: None,
            after: None,
            occurred_at: event.occurred_at(),
        }
    }

    /// Attach the entity state prior to the mutation.
    ///
    /// Serialization failures drop the snapshot rather than the record.
    pub fn with_before<T: Serialize>(mut self, before: &T) -> Self {
        self.before = serde_json::to_value(before).ok();
        self
    }

    /// Attach the entity state after the mutation.
    pub fn with_after<T: Serialize>(mut self, after: &T) -> Self {
        self.after = serde_json::to_value(after).ok();
        self
    }

    pub fn record_id(&self) -> Uuid {
        self.record_id
    }

    pub fn company_id(&self) -> CompanyId {
        self.company_id
    }

    pub fn actor_id(&self) -> UserId {
        self.actor_id
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn entity_type(&self) -> &str {
        &self.entity_type
    }

    pub fn entity_id(&self) -> Uuid {
        self.entity_id
    }

    pub fn before(&self) -> Option<&JsonValue> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&JsonValue> {
        self.after.as_ref()
    }

    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Probe {
        at: DateTime<Utc>,
    }

    impl Event for Probe {
        fn event_type(&self) -> &'static str {
            "test.probe"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn record_takes_action_and_time_from_event() {
        let at = Utc::now();
        let entity = Uuid::now_v7();
        let record = AuditRecord::from_event(
            CompanyId::new(),
            UserId::new(),
            "probe",
            entity,
            &Probe { at },
        )
        .with_after(&serde_json::json!({ "available_boxes": 60 }));

        assert_eq!(record.action(), "test.probe");
        assert_eq!(record.entity_type(), "probe");
        assert_eq!(record.entity_id(), entity);
        assert_eq!(record.occurred_at(), at);
        assert!(record.before().is_none());
        assert_eq!(record.after().unwrap()["available_boxes"], 60);
    }
}
