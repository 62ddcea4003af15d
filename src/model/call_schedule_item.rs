//! `CallScheduleItem` (`spec.md` §3) and its flat hash-map encoding for
//! storage in a `sled::Tree`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::call_status::CallStatus;
use super::call_type::CallType;
use crate::error::PostopError;

/// A single future follow-up call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallScheduleItem {
    pub id: String,
    pub patient_id: String,
    pub patient_phone: String,
    pub scheduled_time: DateTime<Utc>,
    pub call_type: CallType,
    /// 1 = urgent, 3 = routine.
    pub priority: u8,
    pub llm_prompt: String,
    pub status: CallStatus,
    pub max_attempts: u32,
    pub attempt_count: u32,
    pub related_discharge_order_id: Option<String>,
    pub metadata: HashMap<String, serde_json::Value>,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallScheduleItem {
    pub fn new(
        patient_id: impl Into<String>,
        patient_phone: impl Into<String>,
        scheduled_time: DateTime<Utc>,
        call_type: CallType,
        priority: u8,
        llm_prompt: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            patient_id: patient_id.into(),
            patient_phone: patient_phone.into(),
            scheduled_time,
            call_type,
            priority,
            llm_prompt: llm_prompt.into(),
            status: CallStatus::Pending,
            max_attempts: 3,
            attempt_count: 0,
            related_discharge_order_id: None,
            metadata: HashMap::new(),
            notes: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// `spec.md` §4.B: `can_retry() := attempt_count < max_attempts ∧ status
    /// ∈ {Failed, NoAnswer}`.
    pub fn can_retry(&self) -> bool {
        self.attempt_count < self.max_attempts
            && matches!(self.status, CallStatus::Failed | CallStatus::NoAnswer)
    }

    /// Flatten to a string-keyed map suitable for a `sled` hash-style
    /// record; `metadata` is JSON-encoded and absent optional fields
    /// round-trip as the empty string, matching `spec.md` §4.B.
    pub fn to_dict(&self) -> Result<HashMap<String, String>, PostopError> {
        let mut m = HashMap::new();
        m.insert("id".into(), self.id.clone());
        m.insert("patient_id".into(), self.patient_id.clone());
        m.insert("patient_phone".into(), self.patient_phone.clone());
        m.insert(
            "scheduled_time".into(),
            self.scheduled_time.to_rfc3339(),
        );
        m.insert("call_type".into(), self.call_type.as_str().to_string());
        m.insert("priority".into(), self.priority.to_string());
        m.insert("llm_prompt".into(), self.llm_prompt.clone());
        m.insert("status".into(), self.status.as_str().to_string());
        m.insert("max_attempts".into(), self.max_attempts.to_string());
        m.insert("attempt_count".into(), self.attempt_count.to_string());
        m.insert(
            "related_discharge_order_id".into(),
            self.related_discharge_order_id.clone().unwrap_or_default(),
        );
        m.insert("metadata".into(), serde_json::to_string(&self.metadata)?);
        m.insert("notes".into(), self.notes.clone());
        m.insert("created_at".into(), self.created_at.to_rfc3339());
        m.insert("updated_at".into(), self.updated_at.to_rfc3339());
        Ok(m)
    }

    pub fn from_dict(m: &HashMap<String, String>) -> Result<Self, PostopError> {
        let get = |key: &str| -> Result<&String, PostopError> {
            m.get(key)
                .ok_or_else(|| PostopError::StoreCorrupt(format!("missing field {key}")))
        };
        let scheduled_time = DateTime::parse_from_rfc3339(get("scheduled_time")?)
            .map_err(|e| PostopError::StoreCorrupt(e.to_string()))?
            .with_timezone(&Utc);
        let created_at = DateTime::parse_from_rfc3339(get("created_at")?)
            .map_err(|e| PostopError::StoreCorrupt(e.to_string()))?
            .with_timezone(&Utc);
        let updated_at = DateTime::parse_from_rfc3339(get("updated_at")?)
            .map_err(|e| PostopError::StoreCorrupt(e.to_string()))?
            .with_timezone(&Utc);
        let status = CallStatus::from_str(get("status")?)
            .ok_or_else(|| PostopError::StoreCorrupt(format!("bad status {:?}", get("status")?)))?;
        let related_discharge_order_id = get("related_discharge_order_id")?.clone();
        let related_discharge_order_id = if related_discharge_order_id.is_empty() {
            None
        } else {
            Some(related_discharge_order_id)
        };
        let metadata: HashMap<String, serde_json::Value> =
            serde_json::from_str(get("metadata")?)?;

        Ok(Self {
            id: get("id")?.clone(),
            patient_id: get("patient_id")?.clone(),
            patient_phone: get("patient_phone")?.clone(),
            scheduled_time,
            call_type: CallType::from_str(get("call_type")?),
            priority: get("priority")?
                .parse()
                .map_err(|_| PostopError::StoreCorrupt("bad priority".into()))?,
            llm_prompt: get("llm_prompt")?.clone(),
            status,
            max_attempts: get("max_attempts")?
                .parse()
                .map_err(|_| PostopError::StoreCorrupt("bad max_attempts".into()))?,
            attempt_count: get("attempt_count")?
                .parse()
                .map_err(|_| PostopError::StoreCorrupt("bad attempt_count".into()))?,
            related_discharge_order_id,
            metadata,
            notes: get("notes")?.clone(),
            created_at,
            updated_at,
        })
    }
}
