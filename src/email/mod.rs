//! # Email adapter (`spec.md` §6)
//!
//! Outbound boundary to the transactional email sender used by the Dialog
//! Controller's `EmailConfirm` state to deliver the conversation summary.

use async_trait::async_trait;

use crate::error::PostopError;

#[derive(Debug, Clone)]
pub struct EmailSummary {
    pub to: String,
    pub subject: String,
    pub body_plain: String,
    pub body_html: Option<String>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_summary(&self, summary: EmailSummary) -> Result<(), PostopError>;
}

/// Test double that records every summary it was asked to send.
#[derive(Default)]
pub struct MockEmailSender {
    pub sent: std::sync::Mutex<Vec<EmailSummary>>,
}

impl MockEmailSender {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EmailSender for MockEmailSender {
    async fn send_summary(&self, summary: EmailSummary) -> Result<(), PostopError> {
        self.sent.lock().unwrap().push(summary);
        Ok(())
    }
}

pub struct HttpEmailSender {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    from_address: String,
}

impl HttpEmailSender {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, from_address: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            from_address: from_address.into(),
        }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send_summary(&self, summary: EmailSummary) -> Result<(), PostopError> {
        let url = format!("{}/send", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "from": self.from_address,
            "to": summary.to,
            "subject": summary.subject,
            "body_plain": summary.body_plain,
            "body_html": summary.body_html,
        });
        let response = self
            .client
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(PostopError::FabricUnavailable(format!(
                "email send returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_sender_records_summary() {
        let sender = MockEmailSender::new();
        sender
            .send_summary(EmailSummary {
                to: "patient@example.com".into(),
                subject: "Your discharge summary".into(),
                body_plain: "1. Take two Tylenol every four hours.".into(),
                body_html: None,
            })
            .await
            .unwrap();
        assert_eq!(sender.sent.lock().unwrap().len(), 1);
    }
}
