// Cloud HTTP client
//
// Wraps the shared `reqwest::Client` and `SessionManager`. Status bodies
// arrive as `{"shadow": {...}, "info": {...}}`; both maps are flattened
// into one `PropertyMap` with `shadow` taking precedence.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use url::Url;

use crate::command::DeviceCommand;
use crate::error::Error;
use crate::model::{CloudDevice, PropertyMap, PropertyValue};
use crate::session::{SessionManager, excerpt};
use crate::transport::request_error;

#[derive(Deserialize)]
struct DeviceList {
    #[serde(default)]
    devices: Vec<CloudDevice>,
}

#[derive(Deserialize)]
struct StatusEnvelope {
    #[serde(default)]
    shadow: Map<String, Value>,
    #[serde(default)]
    info: Map<String, Value>,
}

/// Async client for the vendor cloud API.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    base_url: Url,
    timeout: Duration,
    session: Arc<SessionManager>,
}

impl CloudClient {
    /// Share the session manager's HTTP client and base URL.
    pub fn new(session: Arc<SessionManager>) -> Self {
        Self {
            http: session.http().clone(),
            base_url: session.base_url().clone(),
            timeout: session.timeout(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /devices`
    pub async fn list_devices(&self) -> Result<Vec<CloudDevice>, Error> {
        let url = self.device_url(&[])?;
        let resp = self.send_authorized(|token| self.http.get(url.clone()).bearer_auth(token)).await?;
        let list: DeviceList = handle_response(resp, self.timeout).await?;
        debug!(count = list.devices.len(), "listed cloud devices");
        Ok(list.devices)
    }

    /// `GET /devices/{id}/status`, flattened.
    pub async fn get_status(&self, device_id: &str) -> Result<PropertyMap, Error> {
        let url = self.device_url(&[device_id, "status"])?;
        let resp = self.send_authorized(|token| self.http.get(url.clone()).bearer_auth(token)).await?;
        let envelope: StatusEnvelope = handle_response(resp, self.timeout).await?;

        let mut props: PropertyMap = envelope
            .info
            .iter()
            .map(|(k, v)| (k.clone(), PropertyValue::from_json(v)))
            .collect();
        props.extend(
            envelope
                .shadow
                .iter()
                .map(|(k, v)| (k.clone(), PropertyValue::from_json(v))),
        );
        Ok(props)
    }

    /// `POST /devices/{id}/commands`
    pub async fn send_command(&self, device_id: &str, command: &DeviceCommand) -> Result<(), Error> {
        let url = self.device_url(&[device_id, "commands"])?;
        let body = command.cloud_body();
        debug!(device_id, command = command.name(), "sending cloud command");
        let resp = self
            .send_authorized(|token| self.http.post(url.clone()).bearer_auth(token).json(&body))
            .await?;
        handle_empty(resp).await
    }

    // ── Internals ────────────────────────────────────────────────────

    fn device_url(&self, tail: &[&str]) -> Result<Url, Error> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::InvalidUrl(url::ParseError::RelativeUrlWithCannotBeABaseBase))?
            .pop_if_empty()
            .push("devices")
            .extend(tail);
        Ok(url)
    }

    /// Send with a bearer token. A 401 forces one refresh and one retry;
    /// a second 401 means the session is beyond saving.
    async fn send_authorized<F>(&self, build: F) -> Result<reqwest::Response, Error>
    where
        F: Fn(&str) -> reqwest::RequestBuilder,
    {
        let token = self.session.get_valid_token().await?;
        let resp = build(token.expose_secret())
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        if resp.status() != StatusCode::UNAUTHORIZED {
            return Ok(resp);
        }

        debug!("cloud rejected token, forcing refresh");
        let rotated: SecretString = self.session.force_refresh(&token).await?;
        let resp = build(rotated.expose_secret())
            .send()
            .await
            .map_err(|e| request_error(e, self.timeout))?;
        if resp.status() == StatusCode::UNAUTHORIZED {
            warn!("cloud rejected freshly refreshed token");
            return Err(Error::AuthExpired);
        }
        Ok(resp)
    }
}

async fn handle_response<T: DeserializeOwned>(
    resp: reqwest::Response,
    timeout: Duration,
) -> Result<T, Error> {
    let status = resp.status();
    if !status.is_success() {
        return Err(parse_error(status, resp).await);
    }
    let body = resp.text().await.map_err(|e| request_error(e, timeout))?;
    serde_json::from_str(&body).map_err(|e| Error::Deserialization {
        message: format!("{e} (body preview: {:?})", excerpt(&body)),
        body,
    })
}

async fn handle_empty(resp: reqwest::Response) -> Result<(), Error> {
    let status = resp.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(parse_error(status, resp).await)
    }
}

async fn parse_error(status: StatusCode, resp: reqwest::Response) -> Error {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Error::RateLimited {
            retry_after_secs: super::retry_after(resp.headers()),
        };
    }
    let raw = resp.text().await.unwrap_or_default();
    Error::Remote {
        status: status.as_u16(),
        message: if raw.is_empty() {
            status.to_string()
        } else {
            excerpt(&raw).to_owned()
        },
    }
}
