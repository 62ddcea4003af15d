//! `CallRecord` (`spec.md` §3) — append-only execution record for one
//! attempt at a `CallScheduleItem`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::call_status::CallStatus;
use crate::error::PostopError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallRecord {
    pub id: String,
    pub call_schedule_item_id: String,
    pub patient_id: String,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: CallStatus,
    pub room_name: Option<String>,
    pub participant_identity: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub conversation_summary: String,
    pub patient_responses: HashMap<String, String>,
    pub additional_calls_scheduled: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(call_schedule_item_id: impl Into<String>, patient_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            call_schedule_item_id: call_schedule_item_id.into(),
            patient_id: patient_id.into(),
            started_at: None,
            ended_at: None,
            status: CallStatus::InProgress,
            room_name: None,
            participant_identity: None,
            error_message: None,
            retry_count: 0,
            conversation_summary: String::new(),
            patient_responses: HashMap::new(),
            additional_calls_scheduled: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Derived duration, when both endpoints are known.
    pub fn duration_seconds(&self) -> Option<i64> {
        match (self.started_at, self.ended_at) {
            (Some(start), Some(end)) => Some((end - start).num_seconds()),
            _ => None,
        }
    }

    pub fn to_dict(&self) -> Result<HashMap<String, String>, PostopError> {
        let mut m = HashMap::new();
        m.insert("id".into(), self.id.clone());
        m.insert(
            "call_schedule_item_id".into(),
            self.call_schedule_item_id.clone(),
        );
        m.insert("patient_id".into(), self.patient_id.clone());
        m.insert(
            "started_at".into(),
            self.started_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        );
        m.insert(
            "ended_at".into(),
            self.ended_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
        );
        m.insert("status".into(), self.status.as_str().to_string());
        m.insert("room_name".into(), self.room_name.clone().unwrap_or_default());
        m.insert(
            "participant_identity".into(),
            self.participant_identity.clone().unwrap_or_default(),
        );
        m.insert(
            "error_message".into(),
            self.error_message.clone().unwrap_or_default(),
        );
        m.insert("retry_count".into(), self.retry_count.to_string());
        m.insert(
            "conversation_summary".into(),
            self.conversation_summary.clone(),
        );
        m.insert(
            "patient_responses".into(),
            serde_json::to_string(&self.patient_responses)?,
        );
        m.insert(
            "additional_calls_scheduled".into(),
            serde_json::to_string(&self.additional_calls_scheduled)?,
        );
        m.insert("created_at".into(), self.created_at.to_rfc3339());
        m.insert("updated_at".into(), self.updated_at.to_rfc3339());
        Ok(m)
    }

    pub fn from_dict(m: &HashMap<String, String>) -> Result<Self, PostopError> {
        let get = |key: &str| -> Result<&String, PostopError> {
            m.get(key)
                .ok_or_else(|| PostopError::StoreCorrupt(format!("missing field {key}")))
        };
        let parse_optional_ts = |raw: &str| -> Result<Option<DateTime<Utc>>, PostopError> {
            if raw.is_empty() {
                Ok(None)
            } else {
                Ok(Some(
                    DateTime::parse_from_rfc3339(raw)
                        .map_err(|e| PostopError::StoreCorrupt(e.to_string()))?
                        .with_timezone(&Utc),
                ))
            }
        };
        let non_empty = |raw: &str| -> Option<String> {
            if raw.is_empty() {
                None
            } else {
                Some(raw.to_string())
            }
        };

        Ok(Self {
            id: get("id")?.clone(),
            call_schedule_item_id: get("call_schedule_item_id")?.clone(),
            patient_id: get("patient_id")?.clone(),
            started_at: parse_optional_ts(get("started_at")?)?,
            ended_at: parse_optional_ts(get("ended_at")?)?,
            status: CallStatus::from_str(get("status")?)
                .ok_or_else(|| PostopError::StoreCorrupt("bad status".into()))?,
            room_name: non_empty(get("room_name")?),
            participant_identity: non_empty(get("participant_identity")?),
            error_message: non_empty(get("error_message")?),
            retry_count: get("retry_count")?
                .parse()
                .map_err(|_| PostopError::StoreCorrupt("bad retry_count".into()))?,
            conversation_summary: get("conversation_summary")?.clone(),
            patient_responses: serde_json::from_str(get("patient_responses")?)?,
            additional_calls_scheduled: serde_json::from_str(get("additional_calls_scheduled")?)?,
            created_at: DateTime::parse_from_rfc3339(get("created_at")?)
                .map_err(|e| PostopError::StoreCorrupt(e.to_string()))?
                .with_timezone(&Utc),
            updated_at: DateTime::parse_from_rfc3339(get("updated_at")?)
                .map_err(|e| PostopError::StoreCorrupt(e.to_string()))?
                .with_timezone(&Utc),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dict_round_trips() {
        let mut record = CallRecord::new("item-1", "patient-1");
        record.started_at = Some(Utc::now());
        record.ended_at = Some(Utc::now());
        record.status = CallStatus::Completed;
        let dict = record.to_dict().unwrap();
        let back = CallRecord::from_dict(&dict).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.status, CallStatus::Completed);
        assert!(back.duration_seconds().is_some());
    }
}
