//! Firebase Cloud Messaging (HTTP v1) gateway
//!
//! Sends one `messages:send` request per notification. Authentication uses a
//! bearer access token supplied by configuration or `FCM_ACCESS_TOKEN`;
//! minting tokens from a service account is left to the deployment.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use super::{PushError, PushGateway, PushNotification, PushPriority};
use crate::config::PushSettings;

/// Default FCM API base
const FCM_BASE_URL: &str = "https://fcm.googleapis.com";

/// Environment variable consulted when no token is configured
pub const ACCESS_TOKEN_ENV: &str = "FCM_ACCESS_TOKEN";

/// Maximum response body kept in a rejection error
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Serialize)]
struct SendRequest<'a> {
    message: FcmMessage<'a>,
}

#[derive(Debug, Serialize)]
struct FcmMessage<'a> {
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notification: Option<FcmNotification<'a>>,
    #[serde(skip_serializing_if = "no_data")]
    data: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    android: Option<AndroidConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    apns: Option<ApnsConfig>,
}

fn no_data(data: &&BTreeMap<String, String>) -> bool {
    data.is_empty()
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    title: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct AndroidConfig {
    priority: &'static str,
}

#[derive(Debug, Serialize)]
struct ApnsConfig {
    headers: BTreeMap<&'static str, &'static str>,
}

/// Build the JSON body FCM expects for `notification`
fn request_body(notification: &PushNotification) -> SendRequest<'_> {
    let visible = (!notification.is_silent()).then(|| FcmNotification {
        title: notification.title.as_deref(),
        body: notification.body.as_deref(),
    });

    let (android, apns) = match notification.priority {
        PushPriority::Normal => (None, None),
        PushPriority::High => (
            Some(AndroidConfig { priority: "HIGH" }),
            Some(ApnsConfig {
                headers: BTreeMap::from([("apns-priority", "10")]),
            }),
        ),
    };

    SendRequest {
        message: FcmMessage {
            token: &notification.token,
            notification: visible,
            data: &notification.data,
            android,
            apns,
        },
    }
}

pub struct FcmGateway {
    client: reqwest::Client,
    send_url: String,
    access_token: String,
}

impl FcmGateway {
    /// Create a gateway from push settings
    ///
    /// Fails when no project id or access token is available.
    pub fn from_settings(settings: &PushSettings) -> anyhow::Result<Self> {
        let project_id = settings
            .project_id
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| anyhow::anyhow!("push.project_id is required for FCM"))?;

        let access_token = settings
            .access_token
            .clone()
            .or_else(|| std::env::var(ACCESS_TOKEN_ENV).ok())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "No FCM access token: set push.access_token or {}",
                    ACCESS_TOKEN_ENV
                )
            })?;

        let base = settings.endpoint.as_deref().unwrap_or(FCM_BASE_URL);
        Self::new(
            base,
            project_id,
            access_token,
            Duration::from_secs(settings.timeout_secs),
        )
    }

    pub fn new(
        base_url: &str,
        project_id: &str,
        access_token: String,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let send_url = format!(
            "{}/v1/projects/{}/messages:send",
            base_url.trim_end_matches('/'),
            project_id
        );

        Ok(Self {
            client,
            send_url,
            access_token,
        })
    }
}

#[async_trait]
impl PushGateway for FcmGateway {
    fn name(&self) -> &str {
        "fcm"
    }

    async fn send(&self, notification: &PushNotification) -> Result<(), PushError> {
        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(&self.access_token)
            .json(&request_body(notification))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!("FCM accepted {} notification", notification.kind());
            return Ok(());
        }

        let mut body = response.text().await.unwrap_or_default();
        if body.len() > MAX_ERROR_BODY {
            let cut = (0..=MAX_ERROR_BODY)
                .rev()
                .find(|i| body.is_char_boundary(*i))
                .unwrap_or(0);
            body.truncate(cut);
        }
        Err(PushError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}
