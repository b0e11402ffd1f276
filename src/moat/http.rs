//! Moat transport over HTTPS using reqwest, optionally through meek.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{header, Client, Proxy};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use super::protocol::{
    BridgesData, ChallengeData, CheckRequest, FetchRequest, Response, CODE_INCORRECT_SOLUTION,
    CONTENT_TYPE,
};
use super::pt::ManagedTransport;
use super::transport::{Challenge, MoatChannel, MoatConnector, SubmitReply, TransportConfig};
use super::{MoatError, MoatResult};

pub const DEFAULT_MOAT_URL: &str = "https://bridges.torproject.org/moat";
pub const DEFAULT_REFLECTOR: &str = "https://moat.torproject.org.global.prod.fastly.net/";
pub const DEFAULT_FRONT: &str = "cdn.sstatic.net";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Connects to the BridgeDB moat endpoint.
#[derive(Debug, Clone)]
pub struct HttpMoatConnector {
    url: String,
    reflector: String,
    front: String,
    state_dir: PathBuf,
    timeout: Duration,
}

impl HttpMoatConnector {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            reflector: DEFAULT_REFLECTOR.to_string(),
            front: DEFAULT_FRONT.to_string(),
            state_dir: std::env::temp_dir().join("torbridge-pt-state"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Domain fronting parameters handed to meek.
    pub fn with_fronting(mut self, reflector: &str, front: &str) -> Self {
        self.reflector = reflector.to_string();
        self.front = front.to_string();
        self
    }

    pub fn with_state_dir(mut self, state_dir: PathBuf) -> Self {
        self.state_dir = state_dir;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// SOCKS proxy URL carrying the meek arguments as credentials.
    ///
    /// SOCKS5 rejects an empty password, so a single NUL stands in for it.
    fn meek_proxy_url(&self, pt: &ManagedTransport) -> String {
        let args = format!("url={};front={}", self.reflector, self.front);
        format!(
            "socks5h://{}:%00@{}",
            urlencoding::encode(&args),
            pt.socks_addr()
        )
    }

    fn build_client(&self, proxy_url: Option<&str>) -> MoatResult<Client> {
        let mut builder = Client::builder().timeout(self.timeout);
        builder = match proxy_url {
            Some(url) => {
                let proxy = Proxy::all(url)
                    .map_err(|e| MoatError::Transport(format!("invalid proxy URL: {}", e)))?;
                builder.proxy(proxy)
            }
            // only the proxy configured in tor is used, never the environment's
            None => builder.no_proxy(),
        };
        builder
            .build()
            .map_err(|e| MoatError::Transport(format!("failed to create HTTP client: {}", e)))
    }
}

impl Default for HttpMoatConnector {
    fn default() -> Self {
        Self::new(DEFAULT_MOAT_URL)
    }
}

#[async_trait]
impl MoatConnector for HttpMoatConnector {
    async fn connect(&self, config: &TransportConfig) -> MoatResult<Box<dyn MoatChannel>> {
        url::Url::parse(&self.url)
            .map_err(|e| MoatError::Transport(format!("invalid moat URL '{}': {}", self.url, e)))?;

        let (client, pt) = match config.meek {
            Some(ref meek) => {
                let pt = ManagedTransport::launch(
                    meek,
                    &self.state_dir,
                    config.proxy_uri.as_deref(),
                    self.timeout,
                )
                .await?;
                let client = self.build_client(Some(&self.meek_proxy_url(&pt)))?;
                (client, Some(pt))
            }
            None => (self.build_client(config.proxy_uri.as_deref())?, None),
        };

        info!("Moat channel open to {}", self.url);
        Ok(Box::new(HttpMoatChannel {
            client,
            url: self.url.clone(),
            pt,
        }))
    }
}

/// An open moat channel. Dropping it kills the meek child.
pub struct HttpMoatChannel {
    client: Client,
    url: String,
    pt: Option<ManagedTransport>,
}

impl HttpMoatChannel {
    fn endpoint(&self, name: &str) -> String {
        format!("{}/{}", self.url, name)
    }
}

async fn post<B: Serialize, T: DeserializeOwned>(
    client: &Client,
    url: &str,
    body: &B,
) -> MoatResult<Response<T>> {
    let body = serde_json::to_vec(body).map_err(|e| MoatError::Protocol(e.to_string()))?;
    debug!("POST {}", url);

    let response = client
        .post(url)
        .header(header::CONTENT_TYPE, CONTENT_TYPE)
        .body(body)
        .send()
        .await?;
    let status = response.status();
    let text = response.text().await?;

    match serde_json::from_str::<Response<T>>(&text) {
        Ok(parsed) => Ok(parsed),
        Err(_) if !status.is_success() => Err(MoatError::Server {
            code: status.as_u16(),
            detail: status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string(),
        }),
        Err(e) => Err(MoatError::Protocol(e.to_string())),
    }
}

fn server_error<T>(response: &Response<T>) -> Option<MoatError> {
    response.errors.first().map(|e| MoatError::Server {
        code: e.code,
        detail: e.detail.clone(),
    })
}

#[async_trait]
impl MoatChannel for HttpMoatChannel {
    async fn fetch_challenge(&mut self, bridge_types: &[String]) -> MoatResult<Challenge> {
        let response: Response<ChallengeData> =
            post(&self.client, &self.endpoint("fetch"), &FetchRequest::new(bridge_types)).await?;
        if let Some(err) = server_error(&response) {
            return Err(err);
        }

        let data = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| MoatError::Protocol("empty challenge response".to_string()))?;
        if data.kind != "moat-challenge" {
            return Err(MoatError::Protocol(format!(
                "unexpected response type '{}'",
                data.kind
            )));
        }
        let image = base64::engine::general_purpose::STANDARD
            .decode(data.image.trim())
            .map_err(|e| MoatError::Protocol(format!("bad captcha image: {}", e)))?;

        Ok(Challenge {
            transport: data.transport,
            token: data.challenge,
            image,
        })
    }

    async fn submit(&mut self, challenge: &Challenge, solution: &str) -> MoatResult<SubmitReply> {
        let response: Response<BridgesData> = post(
            &self.client,
            &self.endpoint("check"),
            &CheckRequest::new(&challenge.transport, &challenge.token, solution),
        )
        .await?;
        if let Some(err) = server_error(&response) {
            return match err {
                MoatError::Server { code, .. } if code == CODE_INCORRECT_SOLUTION => {
                    Ok(SubmitReply::Incorrect)
                }
                other => Err(other),
            };
        }

        let data = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| MoatError::Protocol("empty check response".to_string()))?;
        Ok(SubmitReply::Bridges(data.bridges))
    }

    async fn close(&mut self) {
        if let Some(mut pt) = self.pt.take() {
            info!("Stopping {} client", pt.transport());
            pt.shutdown().await;
        }
    }
}
