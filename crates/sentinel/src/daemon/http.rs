//! JSON-RPC over HTTP client of the daemon

use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use super::{DaemonClient, Error, Result};
use crate::config::RpcConfig;

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

/// A blocking daemon client speaking JSON-RPC 1.0 with basic auth
#[derive(Debug)]
pub struct HttpDaemonClient {
    client: reqwest::blocking::Client,
    url: String,
    user: String,
    password: String,
}

impl HttpDaemonClient {
    /// Build a client from the RPC section of the config
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|err| Error::Transport(err.to_string()))?;
        Ok(Self {
            client,
            url: format!("http://{}:{}/", config.host, config.port),
            user: config.user.clone(),
            password: config.password.clone(),
        })
    }
}

impl DaemonClient for HttpDaemonClient {
    fn invoke(&self, method: &str, params: &[Value]) -> Result<Value> {
        let body = json!({
            "jsonrpc": "1.0",
            "id": "sentinel",
            "method": method,
            "params": params,
        });
        tracing::trace!(%method, "Daemon RPC call");
        // the daemon reports RPC errors with a non-2xx status and a JSON body,
        // so the status code is not checked here
        let response = self
            .client
            .post(&self.url)
            .basic_auth(&self.user, Some(&self.password))
            .json(&body)
            .send()
            .map_err(|err| Error::Transport(err.to_string()))?;
        let status = response.status();
        let response: RpcResponse = response.json().map_err(|err| {
            Error::UnexpectedResponse(format!("HTTP {status}: {err}"))
        })?;
        match response.error {
            Some(RpcError { code, message }) => {
                Err(Error::Rpc { code, message })
            }
            None => Ok(response.result),
        }
    }
}
