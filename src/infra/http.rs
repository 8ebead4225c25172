//! Live HTTP transport.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, Url};
use serde_json::{Map, Value};
use tracing::debug;

use crate::config::TransportSettings;
use crate::contract::Invocation;
use crate::error::ContractError;
use crate::transport::{Transport, TransportError};

use super::error::InfraError;

/// Sends invocations to a remote service rooted at a base URL.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    base: Url,
}

impl HttpTransport {
    pub fn new(settings: &TransportSettings) -> Result<Self, InfraError> {
        if settings.base_url.cannot_be_a_base() {
            return Err(InfraError::configuration(format!(
                "transport.base_url `{}` cannot be used as a base",
                settings.base_url
            )));
        }

        let mut base = settings.base_url.clone();
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let client = Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.timeout)
            .build()?;
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, TransportError> {
        Ok(self.base.join(path.trim_start_matches('/'))?)
    }

    async fn send(&self, argv: &Invocation) -> Result<Value, TransportError> {
        let mut url = self.endpoint(&argv.url)?;
        let sends_query = argv.method == Method::GET || argv.method == Method::DELETE;
        if sends_query {
            append_query(&mut url, &argv.input);
        }

        debug!(method = %argv.method, url = %url, route = argv.route.name(), "Sending request");

        let mut req = self.client.request(argv.method.clone(), url);
        if !sends_query {
            req = req.json(&argv.input);
        }
        let resp = req.send().await?;
        Self::handle(resp).await
    }

    async fn handle(resp: Response) -> Result<Value, TransportError> {
        let status = resp.status();
        let bytes = resp.bytes().await?;
        if !status.is_success() {
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|err| TransportError::Decode(err.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, argv: &Invocation) -> Result<Value, ContractError> {
        Ok(self.send(argv).await?)
    }
}

fn append_query(url: &mut Url, input: &Map<String, Value>) {
    if input.is_empty() {
        return;
    }
    let mut pairs = url.query_pairs_mut();
    for (key, value) in input {
        match value {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    pairs.append_pair(key, &query_text(item));
                }
            }
            other => {
                pairs.append_pair(key, &query_text(other));
            }
        }
    }
}

fn query_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
