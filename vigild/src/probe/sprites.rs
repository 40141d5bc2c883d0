//! Hibernatable VM probing through the Sprites REST API.

use super::{ProbeAdapter, backend_id};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use vigil_common::health::VmSnapshot;
use vigil_common::{BackendKind, ProbeError, RawSnapshot, Session};

#[derive(Debug, Deserialize)]
struct SpriteInfo {
    status: String,
    #[serde(default)]
    message: Option<String>,
}

pub struct SpritesAdapter {
    client: Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl SpritesAdapter {
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, ProbeError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ProbeError::Http(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            base_url: format!("{}/v1/sprites", api_url.trim_end_matches('/')),
            token,
            timeout,
        })
    }
}

#[async_trait]
impl ProbeAdapter for SpritesAdapter {
    fn kind(&self) -> BackendKind {
        BackendKind::Vm
    }

    async fn probe(&self, session: &Session) -> Result<RawSnapshot, ProbeError> {
        let name = backend_id(session)?;
        let url = format!("{}/{}", self.base_url, name);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(|err| self.transport(err))?;

        let status = response.status();
        debug!(%url, %status, "Sprites status response");
        match status {
            StatusCode::NOT_FOUND => return Ok(RawSnapshot::Vm(VmSnapshot::NotFound)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(ProbeError::Auth {
                    status: status.as_u16(),
                });
            }
            status if !status.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(ProbeError::Http(format!("HTTP {status}: {}", body.trim())));
            }
            _ => {}
        }

        let info: SpriteInfo = response
            .json()
            .await
            .map_err(|err| ProbeError::Malformed(format!("sprite status response: {err}")))?;
        Ok(RawSnapshot::Vm(VmSnapshot::from_provider_status(
            &info.status,
            info.message.as_deref(),
        )))
    }
}

impl SpritesAdapter {
    fn transport(&self, err: reqwest::Error) -> ProbeError {
        if err.is_timeout() {
            ProbeError::Timeout(self.timeout)
        } else {
            ProbeError::Http(err.to_string())
        }
    }
}
