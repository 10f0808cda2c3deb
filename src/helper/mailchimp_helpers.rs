use crate::config::MailchimpConfig;
use serde::Serialize;
use thiserror::Error;

const BASIC_AUTH_USER: &str = "anyname";

#[derive(Error, Debug)]
pub enum MailchimpError {
    #[error("Mailing list is not configured")]
    NotConfigured,
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Serialize, PartialEq)]
pub struct Subscription<'a> {
    pub email_address: &'a str,
    pub status: &'static str,
    pub language: &'a str,
}

impl<'a> Subscription<'a> {
    pub fn new(email_address: &'a str, language: &'a str) -> Self {
        Subscription { email_address, status: "subscribed", language }
    }
}

/// Adds members to the configured mailing list.
#[derive(Clone)]
pub struct MailchimpClient {
    http: reqwest::Client,
    list_uri: String,
    api_key: String,
}

impl MailchimpClient {
    pub fn new(config: &MailchimpConfig) -> Self {
        MailchimpClient {
            http: reqwest::Client::new(),
            list_uri: config.list_uri.clone(),
            api_key: config.api_key.clone(),
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.list_uri.is_empty() && !self.api_key.is_empty()
    }

    /// Posts the subscription and returns the list's JSON reply, whatever
    /// its status; list-side rejections are for the editors to read.
    pub async fn subscribe(&self, email: &str, language: &str) -> Result<serde_json::Value, MailchimpError> {
        if !self.is_configured() {
            return Err(MailchimpError::NotConfigured);
        }
        let response = self
            .http
            .post(&self.list_uri)
            .basic_auth(BASIC_AUTH_USER, Some(&self.api_key))
            .json(&Subscription::new(email, language))
            .send()
            .await?;
        let status = response.status();
        let body = response.json::<serde_json::Value>().await?;
        if !status.is_success() {
            log::warn!("Mailing list answered {} for '{}'", status, email);
        }
        Ok(body)
    }
}
