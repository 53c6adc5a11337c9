//! HTTP transport for the registry protocol

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{RegistryService, ServiceError, SubjectVersion};

const REGISTRY_CONTENT_TYPE: &str = "application/vnd.schemaregistry.v1+json";
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct SchemaString {
    schema: String,
}

#[derive(Debug, Serialize)]
struct RegisterSchemaRequest<'a> {
    schema: &'a str,
}

#[derive(Debug, Deserialize)]
struct RegisterSchemaResponse {
    id: i64,
}

#[derive(Debug, Deserialize)]
struct ErrorMessage {
    error_code: i32,
    #[serde(default)]
    message: String,
}

/// Registry service spoken to over its REST API.
///
/// Accepts a single url or a comma separated list naming the members of a
/// registry cluster. Requests go to the first member and move on to the next
/// one only when a member cannot be reached.
#[derive(Debug, Clone)]
pub struct HttpRegistryService {
    base_urls: Vec<Url>,
    client: Client,
}

fn parse_base_url(raw: &str) -> Result<Url, ServiceError> {
    let url = Url::parse(raw)
        .map_err(|e| ServiceError::Transport(format!("Invalid registry url {}: {}", raw, e)))?;
    if url.cannot_be_a_base() || !matches!(url.scheme(), "http" | "https") {
        return Err(ServiceError::Transport(format!(
            "{} cannot be used as a registry base url",
            url
        )));
    }
    Ok(url)
}

/// Append path segments to `base`, encoding each one.
fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, ServiceError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| ServiceError::Transport(format!("{} cannot be used as a registry base url", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

impl HttpRegistryService {
    /// Create a service for the registry at `base_urls`. No request is made
    /// until the first operation.
    pub fn new(base_urls: &str) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ServiceError::Transport(e.to_string()))?;
        Self::with_client(base_urls, client)
    }

    /// Create a service that issues its requests through `client`.
    pub fn with_client(base_urls: &str, client: Client) -> Result<Self, ServiceError> {
        let base_urls = base_urls
            .split(',')
            .map(str::trim)
            .filter(|raw| !raw.is_empty())
            .map(parse_base_url)
            .collect::<Result<Vec<_>, _>>()?;
        if base_urls.is_empty() {
            return Err(ServiceError::Transport("No registry url given".to_string()));
        }
        Ok(Self { base_urls, client })
    }

    /// Cluster members in the order they are tried
    pub fn base_urls(&self) -> &[Url] {
        &self.base_urls
    }

    /// Send the request built by `build` to each member in turn until one
    /// answers.
    async fn send<F>(&self, segments: &[&str], build: F) -> Result<Response, ServiceError>
    where
        F: Fn(Url) -> RequestBuilder + Send + Sync,
    {
        let mut last_error = None;
        for base in &self.base_urls {
            let url = endpoint(base, segments)?;
            debug!("Registry request to {}", url);
            match build(url).send().await {
                Ok(response) => return Ok(response),
                Err(e) => {
                    warn!("Registry at {} could not be reached: {}", base, e);
                    last_error = Some(ServiceError::Transport(e.to_string()));
                }
            }
        }
        Err(last_error.unwrap_or_else(|| ServiceError::Transport("No registry url given".to_string())))
    }

    async fn get<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, ServiceError> {
        let response = self
            .send(segments, |url| {
                self.client.get(url).header(ACCEPT, REGISTRY_CONTENT_TYPE)
            })
            .await?;
        Self::read(response).await
    }

    async fn read<T: DeserializeOwned>(response: Response) -> Result<T, ServiceError> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| ServiceError::Decode(e.to_string()));
        }

        let body = response.text().await.unwrap_or_default();
        let error = serde_json::from_str::<ErrorMessage>(&body).unwrap_or(ErrorMessage {
            error_code: i32::from(status.as_u16()),
            message: body,
        });
        Err(ServiceError::Status {
            status: status.as_u16(),
            error_code: error.error_code,
            message: error.message,
        })
    }
}

#[async_trait]
impl RegistryService for HttpRegistryService {
    async fn schema_by_id(&self, id: i64) -> Result<String, ServiceError> {
        let id = id.to_string();
        let body: SchemaString = self.get(&["schemas", "ids", &id]).await?;
        Ok(body.schema)
    }

    async fn latest_by_subject(&self, subject: &str) -> Result<SubjectVersion, ServiceError> {
        self.get(&["subjects", subject, "versions", "latest"]).await
    }

    async fn register(&self, subject: &str, schema: &str) -> Result<i64, ServiceError> {
        let request = RegisterSchemaRequest { schema };
        let response = self
            .send(&["subjects", subject, "versions"], |url| {
                self.client
                    .post(url)
                    .header(ACCEPT, REGISTRY_CONTENT_TYPE)
                    .header(CONTENT_TYPE, REGISTRY_CONTENT_TYPE)
                    .json(&request)
            })
            .await?;
        let body: RegisterSchemaResponse = Self::read(response).await?;
        Ok(body.id)
    }

    async fn subjects(&self) -> Result<Vec<String>, ServiceError> {
        self.get(&["subjects"]).await
    }
}
