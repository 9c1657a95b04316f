//! Azure Blob Storage client scoped to one container
//!
//! Speaks the Blob service REST API directly. Requests are authorised either by
//! signing them with the account's shared key or by appending a SAS token.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine};
use bytes::Bytes;
use futures::stream::{BoxStream, StreamExt};
use hmac::{Hmac, Mac};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{Method, Response};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::core::config::StorageConfig;
use crate::core::errors::{DocChatError, Result};
use crate::core::models::UploadFile;

type HmacSha256 = Hmac<Sha256>;

/// Blob service REST version sent with every request
pub const STORAGE_API_VERSION: &str = "2021-08-06";

const ERROR_CODE_HEADER: &str = "x-ms-error-code";

/// How requests to the account are authorised
#[derive(Clone)]
pub enum StorageCredential {
    /// Decoded account key, used to sign each request
    SharedKey(Vec<u8>),
    /// Pre-signed query string, without the leading `?`
    Sas(String),
}

impl std::fmt::Debug for StorageCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageCredential::SharedKey(_) => f.write_str("SharedKey(..)"),
            StorageCredential::Sas(_) => f.write_str("Sas(..)"),
        }
    }
}

impl StorageCredential {
    /// Classify a credential string: SAS tokens carry a `sig=` parameter,
    /// anything else must be a base64 account key.
    pub fn parse(credential: &str) -> Result<Self> {
        let credential = credential.trim();
        if credential.is_empty() {
            return Err(DocChatError::config("storage credential is empty"));
        }

        let token = credential.trim_start_matches('?');
        if token.split('&').any(|pair| pair.starts_with("sig=")) {
            return Ok(StorageCredential::Sas(token.to_string()));
        }

        BASE64_STANDARD
            .decode(credential)
            .map(StorageCredential::SharedKey)
            .map_err(|e| DocChatError::config(format!("storage account key is not valid base64: {}", e)))
    }
}

/// Work out the account name from the endpoint.
///
/// Path-style endpoints (the local emulator) carry it as the first path
/// segment, service endpoints as the first label of the host.
pub fn account_name_from_url(url: &Url) -> Option<String> {
    if let Some(first) = url.path_segments().and_then(|mut s| s.next()) {
        if !first.is_empty() {
            return Some(first.to_string());
        }
    }

    url.host_str()
        .and_then(|host| host.split('.').next())
        .filter(|label| !label.is_empty() && url.domain().is_some())
        .map(str::to_string)
}

/// Canonicalized resource: `/{account}{path}` then one `\nname:value` line per
/// query parameter, sorted by lower-cased name, repeated values comma-joined.
pub fn canonicalized_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_lowercase())
            .or_default()
            .push(value.into_owned());
    }

    for (name, mut values) in params {
        values.sort();
        resource.push('\n');
        resource.push_str(&name);
        resource.push(':');
        resource.push_str(&values.join(","));
    }

    resource
}

/// Shared Key string-to-sign for a request carrying `headers`
pub fn string_to_sign(method: &Method, headers: &HeaderMap, resource: &str) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_string()
    };

    let content_length = match header("content-length").as_str() {
        "0" => String::new(),
        other => other.to_string(),
    };

    let mut ms_headers: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or("").trim().to_string(),
            )
        })
        .collect();
    ms_headers.sort();

    let mut lines = vec![
        method.as_str().to_string(),
        header("content-encoding"),
        header("content-language"),
        content_length,
        header("content-md5"),
        header("content-type"),
        header("date"),
        header("if-modified-since"),
        header("if-match"),
        header("if-none-match"),
        header("if-unmodified-since"),
        header("range"),
    ];
    lines.extend(ms_headers.into_iter().map(|(name, value)| format!("{}:{}", name, value)));
    lines.push(resource.to_string());

    lines.join("\n")
}

/// `List Blobs` response body
#[derive(Debug, Deserialize)]
struct EnumerationResults {
    #[serde(rename = "Blobs", default)]
    blobs: BlobList,
    #[serde(rename = "NextMarker", default)]
    next_marker: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct BlobList {
    #[serde(rename = "Blob", default)]
    items: Vec<BlobItem>,
}

#[derive(Debug, Deserialize)]
struct BlobItem {
    #[serde(rename = "Name")]
    name: String,
}

/// Upload, list and read blobs in one container
#[derive(Debug, Clone)]
pub struct BlobStorageManager {
    client: reqwest::Client,
    endpoint: Url,
    account: String,
    container: String,
    credential: StorageCredential,
}

impl BlobStorageManager {
    /// Create a manager; fails if the endpoint or credential cannot be used
    pub fn new(config: StorageConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.account_url)
            .map_err(|e| DocChatError::config(format!("invalid storage account URL '{}': {}", config.account_url, e)))?;

        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(DocChatError::config(format!(
                "storage account URL must be http(s): {}",
                config.account_url
            )));
        }

        if config.container.is_empty() {
            return Err(DocChatError::config("container name is required"));
        }

        let account = config
            .account_name
            .clone()
            .filter(|name| !name.is_empty())
            .or_else(|| account_name_from_url(&endpoint))
            .ok_or_else(|| {
                DocChatError::config(format!("cannot derive account name from {}", config.account_url))
            })?;

        let credential = StorageCredential::parse(&config.credential)?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        debug!("Blob storage manager for {}/{}", account, config.container);

        Ok(Self {
            client,
            endpoint,
            account,
            container: config.container,
            credential,
        })
    }

    /// Container this manager writes to
    pub fn container(&self) -> &str {
        &self.container
    }

    /// Account name requests are signed for
    pub fn account(&self) -> &str {
        &self.account
    }

    /// Write a document under its own name, replacing any blob of that name
    pub async fn upload(&self, file: UploadFile) -> Result<String> {
        if file.name.trim().is_empty() {
            return Err(DocChatError::invalid_input("blob name must not be empty"));
        }

        let url = self.blob_url(&file.name)?;
        let size = file.content.len();

        let mut extra = HeaderMap::new();
        extra.insert("x-ms-blob-type", HeaderValue::from_static("BlockBlob"));
        extra.insert(CONTENT_TYPE, HeaderValue::from_static("application/octet-stream"));
        extra.insert(CONTENT_LENGTH, HeaderValue::from(size));

        let response = self
            .send(Method::PUT, url, extra, Some(file.content))
            .await?;

        if !response.status().is_success() {
            return Err(storage_error(response).await);
        }

        info!("Uploaded {} ({} bytes) to {}", file.name, size, self.container);
        Ok(file.name)
    }

    /// Names of all blobs in the container, in the service's order
    pub async fn list(&self) -> Result<Vec<String>> {
        self.list_pages().await.map_err(|e| {
            warn!("Error listing blobs in {}: {}", self.container, e);
            e
        })
    }

    async fn list_pages(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;

        loop {
            let mut url = self.container_url()?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("restype", "container");
                query.append_pair("comp", "list");
                if let Some(marker) = &marker {
                    query.append_pair("marker", marker);
                }
            }

            let response = self.send(Method::GET, url, HeaderMap::new(), None).await?;
            if !response.status().is_success() {
                return Err(storage_error(response).await);
            }

            let body = response.text().await.map_err(transport_error)?;
            let page: EnumerationResults = quick_xml::de::from_str(&body)?;
            names.extend(page.blobs.items.into_iter().map(|blob| blob.name));

            match page.next_marker.filter(|m| !m.is_empty()) {
                Some(next) => marker = Some(next),
                None => break,
            }
        }

        debug!("Listed {} blobs in {}", names.len(), self.container);
        Ok(names)
    }

    /// Whole blob decoded as UTF-8
    pub async fn read(&self, name: &str) -> Result<String> {
        let response = self.get_blob(name).await?;
        let content = response.bytes().await.map_err(transport_error)?;

        String::from_utf8(content.to_vec()).map_err(|e| DocChatError::DecodeError {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    /// Blob content as a lazy sequence of byte chunks
    pub async fn read_stream(&self, name: &str) -> Result<BoxStream<'static, Result<Bytes>>> {
        let response = self.get_blob(name).await?;
        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(transport_error))
            .boxed())
    }

    async fn get_blob(&self, name: &str) -> Result<Response> {
        let url = self.blob_url(name)?;
        let response = self.send(Method::GET, url, HeaderMap::new(), None).await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DocChatError::NotFound {
                name: name.to_string(),
            });
        }
        if !response.status().is_success() {
            return Err(storage_error(response).await);
        }

        Ok(response)
    }

    fn container_url(&self) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| DocChatError::config("storage account URL cannot be a base"))?
            .pop_if_empty()
            .push(&self.container);
        Ok(url)
    }

    fn blob_url(&self, name: &str) -> Result<Url> {
        let mut url = self.container_url()?;
        url.path_segments_mut()
            .map_err(|_| DocChatError::config("storage account URL cannot be a base"))?
            .push(name);
        Ok(url)
    }

    /// Stamp the service headers, authorise and send one request
    async fn send(
        &self,
        method: Method,
        mut url: Url,
        mut headers: HeaderMap,
        body: Option<Bytes>,
    ) -> Result<Response> {
        let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        headers.insert(
            "x-ms-date",
            HeaderValue::from_str(&date).map_err(|e| DocChatError::InternalError(e.to_string()))?,
        );
        headers.insert("x-ms-version", HeaderValue::from_static(STORAGE_API_VERSION));

        match &self.credential {
            StorageCredential::SharedKey(key) => {
                let resource = canonicalized_resource(&self.account, &url);
                let to_sign = string_to_sign(&method, &headers, &resource);
                let mut mac = HmacSha256::new_from_slice(key)
                    .map_err(|e| DocChatError::config(format!("unusable account key: {}", e)))?;
                mac.update(to_sign.as_bytes());
                let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());

                let authorization = format!("SharedKey {}:{}", self.account, signature);
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&authorization)
                        .map_err(|e| DocChatError::InternalError(e.to_string()))?,
                );
            }
            StorageCredential::Sas(token) => {
                let query = match url.query() {
                    Some(existing) => format!("{}&{}", existing, token),
                    None => token.clone(),
                };
                url.set_query(Some(&query));
            }
        }

        debug!("{} {}", method, url.path());

        let mut request = self.client.request(method, url).headers(headers);
        if let Some(body) = body {
            request = request.body(body);
        }

        request.send().await.map_err(transport_error)
    }
}

/// A connection that failed before or while a response came back
fn transport_error(e: reqwest::Error) -> DocChatError {
    DocChatError::StorageError {
        status: None,
        code: None,
        message: e.to_string(),
    }
}

/// Turn a failed blob service response into a `StorageError`
async fn storage_error(response: Response) -> DocChatError {
    let status = response.status().as_u16();
    let code = response
        .headers()
        .get(ERROR_CODE_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let message = response.text().await.unwrap_or_default();

    DocChatError::StorageError {
        status: Some(status),
        code,
        message,
    }
}
