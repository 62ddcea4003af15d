//! # Call Fabric adapter (`spec.md` §4.F, §6)
//!
//! The realtime voice/SIP platform that creates rooms, dispatches agents,
//! and bridges outbound phone calls. Abstracted behind [`CallFabric`] so
//! the Call Executor never depends on a concrete realtime platform SDK.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::PostopError;

#[derive(Debug, Clone)]
pub struct AgentDispatchRequest {
    pub agent_name: String,
    pub room_name: String,
    pub metadata: Value,
}

#[derive(Debug, Clone)]
pub struct SipParticipantRequest {
    pub room_name: String,
    pub trunk_id: String,
    /// E.164.
    pub phone_number: String,
    pub participant_identity: String,
    pub wait_until_answered: bool,
}

/// `spec.md` §6: errors carry `sip_status_code` and `sip_status` text,
/// classified by the Call Executor via the table in §4.F.
#[async_trait]
pub trait CallFabric: Send + Sync {
    async fn create_agent_dispatch(&self, req: AgentDispatchRequest) -> Result<String, PostopError>;
    async fn create_sip_participant(&self, req: SipParticipantRequest) -> Result<String, PostopError>;
}

/// Test double. Returns canned ids on success, or a scripted SIP failure
/// when `phone_number` matches one of the configured trigger numbers —
/// lets scenario tests (`spec.md` §8 Scenario B) drive specific SIP codes
/// without a real fabric.
pub struct MockCallFabric {
    pub sip_failures: std::collections::HashMap<String, (u16, String)>,
}

impl MockCallFabric {
    pub fn new() -> Self {
        Self { sip_failures: std::collections::HashMap::new() }
    }

    pub fn with_sip_failure(mut self, phone: impl Into<String>, code: u16, text: impl Into<String>) -> Self {
        self.sip_failures.insert(phone.into(), (code, text.into()));
        self
    }
}

impl Default for MockCallFabric {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallFabric for MockCallFabric {
    async fn create_agent_dispatch(&self, req: AgentDispatchRequest) -> Result<String, PostopError> {
        Ok(format!("dispatch-{}", req.room_name))
    }

    async fn create_sip_participant(&self, req: SipParticipantRequest) -> Result<String, PostopError> {
        if let Some((code, text)) = self.sip_failures.get(&req.phone_number) {
            return Err(crate::executor::sip_error(*code, text.clone()));
        }
        Ok(format!("participant-{}", req.participant_identity))
    }
}

/// Production adapter over the realtime platform's HTTP management API.
pub struct HttpCallFabric {
    client: reqwest::Client,
    base_url: String,
}

impl HttpCallFabric {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { client: reqwest::Client::new(), base_url: base_url.into() }
    }
}

#[async_trait]
impl CallFabric for HttpCallFabric {
    async fn create_agent_dispatch(&self, req: AgentDispatchRequest) -> Result<String, PostopError> {
        let url = format!("{}/dispatch", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "agent_name": req.agent_name,
            "room_name": req.room_name,
            "metadata": req.metadata,
        });
        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            return Err(PostopError::FabricUnavailable(format!(
                "dispatch request returned {}",
                response.status()
            )));
        }
        #[derive(serde::Deserialize)]
        struct DispatchResponse {
            dispatch_id: String,
        }
        let parsed: DispatchResponse = response.json().await?;
        Ok(parsed.dispatch_id)
    }

    async fn create_sip_participant(&self, req: SipParticipantRequest) -> Result<String, PostopError> {
        let url = format!("{}/sip/participants", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "room_name": req.room_name,
            "trunk_id": req.trunk_id,
            "phone_number": req.phone_number,
            "participant_identity": req.participant_identity,
            "wait_until_answered": req.wait_until_answered,
        });
        let response = self.client.post(url).json(&body).send().await?;
        if !response.status().is_success() {
            let code = response.status().as_u16();
            let text = response.text().await.unwrap_or_default();
            return Err(crate::executor::sip_error(code, text));
        }
        #[derive(serde::Deserialize)]
        struct ParticipantResponse {
            participant_id: String,
        }
        let parsed: ParticipantResponse = response.json().await?;
        Ok(parsed.participant_id)
    }
}
