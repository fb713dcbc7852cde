// Minimal client for the Twilio Programmable Messaging REST API.

use std::collections::HashMap;
use std::time::Duration;

pub mod models;
use reqwest::Client;

use crate::models::{ApiErrorBody, MessageResponse};

const DEFAULT_BASE_URL: &str = "https://api.twilio.com/2010-04-01";

/// Check if a string is a valid phone number (E.164 format)
pub fn is_phone_number(identifier: &str) -> bool {
    identifier.starts_with('+')
        && identifier.len() >= 10
        && identifier[1..].chars().all(|c| c.is_ascii_digit())
}

#[derive(Debug, thiserror::Error)]
pub enum TwilioError {
    #[error("Invalid recipient format: {0} (expected E.164, e.g. +15551234567)")]
    InvalidRecipient(String),

    #[error("Request to Twilio timed out")]
    Timeout,

    #[error("Request to Twilio failed: {0}")]
    Transport(String),

    #[error("Twilio returned {status}: {message} (code {code:?})")]
    Api {
        status: u16,
        code: Option<i64>,
        message: String,
    },

    #[error("Error parsing Twilio response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for TwilioError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TwilioError::Timeout
        } else {
            TwilioError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Clone)]
pub struct TwilioOptions {
    pub account_sid: String,
    pub auth_token: String,
    /// Sender number in E.164 format.
    pub from_number: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct TwilioService {
    options: TwilioOptions,
    base_url: String,
    client: Client,
}

impl TwilioService {
    pub fn new(options: TwilioOptions) -> Self {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            options,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        }
    }

    /// Point the client at a different API root (regional edge, local stub).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/Accounts/{}/Messages.json",
            self.base_url.trim_end_matches('/'),
            self.options.account_sid
        )
    }

    pub async fn send_sms(
        &self,
        recipient: &str,
        body: &str,
    ) -> Result<MessageResponse, TwilioError> {
        if !is_phone_number(recipient) {
            return Err(TwilioError::InvalidRecipient(recipient.to_string()));
        }

        let mut form_body: HashMap<&str, &str> = HashMap::new();
        form_body.insert("To", recipient);
        form_body.insert("From", &self.options.from_number);
        form_body.insert("Body", body);

        let response = self
            .client
            .post(self.messages_url())
            .basic_auth(&self.options.account_sid, Some(&self.options.auth_token))
            .form(&form_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            let parsed = serde_json::from_str::<ApiErrorBody>(&error_body).ok();

            return Err(TwilioError::Api {
                status: status.as_u16(),
                code: parsed.as_ref().and_then(|b| b.code),
                message: parsed
                    .and_then(|b| b.message)
                    .unwrap_or(error_body),
            });
        }

        let message = response
            .json::<MessageResponse>()
            .await
            .map_err(|e| TwilioError::Decode(e.to_string()))?;

        // Twilio accepts the request but may reject the message synchronously.
        if message.status == "failed" || message.status == "undelivered" {
            return Err(TwilioError::Api {
                status: status.as_u16(),
                code: message.error_code,
                message: message
                    .error_message
                    .clone()
                    .unwrap_or_else(|| format!("message {} {}", message.sid, message.status)),
            });
        }

        Ok(message)
    }
}
