//! Request gateway: every remote call the controller makes goes through here.
//!
//! RPC calls are POSTed to a single endpoint as
//! `{"id": 1, "method": "slim.request", "params": [scope, [command, args...]]}`
//! where `scope` is empty for global commands and the player identifier for
//! player-scoped ones. The gateway carries no business logic: it resolves
//! locators against a base URL that can be repointed at runtime, applies a
//! timeout, and hands back the `result` object (or `None` when absent).
//! There is no retry.

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Method};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::command::Command;
use crate::errors::{ControlError, Result};
use crate::model::PlayerId;

/// Verb carried by every RPC envelope.
pub const RPC_METHOD: &str = "slim.request";

/// Default RPC endpoint, relative to the base URL.
pub const DEFAULT_RPC_PATH: &str = "jsonrpc.js";

/// Default timeout for every request (5 seconds)
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(5000);

const RPC_ID: u64 = 1;

/// One HTTP exchange, as handed to a [`Transport`].
#[derive(Clone, Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub url: Url,
    pub body: Option<String>,
    pub timeout: Duration,
}

/// Performs HTTP exchanges for the gateway.
///
/// [`HttpTransport`] is the production implementation; tests plug in
/// scripted transports.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the response body of a 2xx answer.
    async fn send(&self, request: HttpRequest) -> Result<String>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Useful for sharing a connection pool or proxy settings
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: HttpRequest) -> Result<String> {
        let mut builder = self
            .client
            .request(request.method, request.url.clone())
            .timeout(request.timeout);

        if let Some(body) = request.body {
            builder = builder.header(CONTENT_TYPE, "application/json").body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ControlError::HttpStatus {
                url: request.url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }
}

/// Scope token of an RPC call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    Global,
    Player(PlayerId),
}

impl Scope {
    pub fn token(&self) -> &str {
        match self {
            Scope::Global => "",
            Scope::Player(id) => id.as_str(),
        }
    }
}

#[derive(Serialize)]
struct RpcEnvelope<'a> {
    id: u64,
    method: &'a str,
    params: (&'a str, Vec<Value>),
}

#[derive(Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Option<Value>,
}

/// Description of one request.
///
/// With `params` and no `url` the request is an RPC call; with a `url` it is
/// a plain request against that locator and `params` are ignored.
#[derive(Clone, Debug)]
pub struct RequestConfig {
    pub params: Option<(Scope, Command)>,
    pub url: Option<String>,
    pub method: Option<Method>,
    pub timeout: Option<Duration>,
    pub show_briefly: Option<String>,
}

impl RequestConfig {
    /// Global RPC call
    pub fn rpc(command: Command) -> Self {
        Self::scoped(Scope::Global, command)
    }

    pub fn scoped(scope: Scope, command: Command) -> Self {
        Self {
            params: Some((scope, command)),
            url: None,
            method: None,
            timeout: None,
            show_briefly: None,
        }
    }

    /// Plain GET against a locator
    pub fn locator(url: impl Into<String>) -> Self {
        Self {
            params: None,
            url: Some(url.into()),
            method: Some(Method::GET),
            timeout: None,
            show_briefly: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    /// Message surfaced through the show-briefly event when the request is issued
    pub fn with_show_briefly(mut self, text: impl Into<String>) -> Self {
        self.show_briefly = Some(text.into());
        self
    }

    pub fn command(&self) -> Option<&Command> {
        self.params.as_ref().map(|(_, command)| command)
    }
}

impl From<&str> for RequestConfig {
    fn from(url: &str) -> Self {
        RequestConfig::locator(url)
    }
}

impl From<Command> for RequestConfig {
    fn from(command: Command) -> Self {
        RequestConfig::rpc(command)
    }
}

/// What came back from a request.
#[derive(Clone, Debug, PartialEq)]
pub enum Reply {
    /// RPC call; `None` when the answer carried no `result`.
    Rpc(Option<Value>),
    /// Locator request; the raw body.
    Body(String),
}

impl Reply {
    pub fn into_result(self) -> Option<Value> {
        match self {
            Reply::Rpc(result) => result,
            Reply::Body(_) => None,
        }
    }
}

pub struct RequestGateway {
    transport: Arc<dyn Transport>,
    base_url: RwLock<Url>,
    rpc_path: String,
    timeout: Duration,
    player: RwLock<Option<PlayerId>>,
}

impl std::fmt::Debug for RequestGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestGateway")
            .field("base_url", &self.base_url().as_str())
            .field("rpc_path", &self.rpc_path)
            .field("timeout", &self.timeout)
            .field("player", &self.selected_player())
            .finish()
    }
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn Transport>, base_url: &str) -> Result<Self> {
        Ok(Self {
            transport,
            base_url: RwLock::new(normalize_base(base_url)?),
            rpc_path: DEFAULT_RPC_PATH.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
            player: RwLock::new(None),
        })
    }

    pub fn with_rpc_path(mut self, rpc_path: &str) -> Self {
        self.rpc_path = rpc_path.trim_start_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> Url {
        self.base_url
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Repoints every subsequent request at another server
    pub fn set_base_url(&self, base_url: &str) -> Result<()> {
        let url = normalize_base(base_url)?;
        debug!(base_url = %url, "Gateway repointed");
        *self.base_url.write().unwrap_or_else(PoisonError::into_inner) = url;
        Ok(())
    }

    /// Resolves a locator (absolute, or relative to the base URL)
    pub fn resolve(&self, locator: &str) -> Result<Url> {
        Ok(self.base_url().join(locator.trim_start_matches('/'))?)
    }

    pub fn selected_player(&self) -> Option<PlayerId> {
        self.player
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_player(&self, player: Option<PlayerId>) {
        *self.player.write().unwrap_or_else(PoisonError::into_inner) = player;
    }

    pub async fn request(&self, config: RequestConfig) -> Result<Reply> {
        let timeout = config.timeout.unwrap_or(self.timeout);

        if let Some(locator) = config.url.as_deref() {
            let url = self.resolve(locator)?;
            debug!(url = %url, "Locator request");
            let body = self
                .transport
                .send(HttpRequest {
                    method: config.method.unwrap_or(Method::GET),
                    url,
                    body: None,
                    timeout,
                })
                .await?;
            return Ok(Reply::Body(body));
        }

        let Some((scope, command)) = config.params else {
            return Err(ControlError::transport("request has neither params nor url"));
        };

        let envelope = RpcEnvelope {
            id: RPC_ID,
            method: RPC_METHOD,
            params: (scope.token(), command.to_params()),
        };
        let body = serde_json::to_string(&envelope)?;
        let url = self.resolve(&self.rpc_path)?;

        debug!(command = command.name(), scope = scope.token(), "RPC request");
        let text = self
            .transport
            .send(HttpRequest {
                method: config.method.unwrap_or(Method::POST),
                url,
                body: Some(body),
                timeout,
            })
            .await?;

        let reply: RpcReply = serde_json::from_str(&text)?;
        Ok(Reply::Rpc(reply.result.filter(|r| !r.is_null())))
    }

    /// RPC call returning only the `result` object
    ///
    /// ```
    /// use std::sync::Arc;
    ///
    /// use async_trait::async_trait;
    /// use lmscontrol::{Command, HttpRequest, RequestGateway, Result, Scope, Transport};
    ///
    /// struct Canned;
    ///
    /// #[async_trait]
    /// impl Transport for Canned {
    ///     async fn send(&self, _request: HttpRequest) -> Result<String> {
    ///         Ok(r#"{"id":1,"result":{"rescan":0}}"#.to_string())
    ///     }
    /// }
    ///
    /// # tokio_test::block_on(async {
    /// let gateway = RequestGateway::new(Arc::new(Canned), "http://lms.local:9000/").unwrap();
    /// let result = gateway.rpc(Scope::Global, Command::server_status()).await.unwrap();
    /// assert_eq!(result.unwrap()["rescan"], 0);
    /// # });
    /// ```
    pub async fn rpc(&self, scope: Scope, command: Command) -> Result<Option<Value>> {
        Ok(self
            .request(RequestConfig::scoped(scope, command))
            .await?
            .into_result())
    }

    /// Same as [`request`](Self::request), scoped to the selected player.
    ///
    /// Returns `Ok(None)` without any network traffic when no player is selected.
    pub async fn player_request(&self, mut config: RequestConfig) -> Result<Option<Reply>> {
        let Some(player) = self.selected_player() else {
            return Ok(None);
        };
        if let Some((scope, _)) = config.params.as_mut() {
            *scope = Scope::Player(player);
        }
        Ok(Some(self.request(config).await?))
    }
}

fn normalize_base(base_url: &str) -> Result<Url> {
    let mut url = Url::parse(base_url.trim())?;
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
