//! Document store and notifier backed by the Feishu open API

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use super::wire::{decode_block, encode_block};
use super::{DocumentHandle, DocumentMetadata, DocumentStore, Notifier};
use crate::config::{RemoteConfig, DEFAULT_PAGE_SIZE};
use crate::error::{Error, Result};
use crate::models::Block;
use crate::util::{compact_text, unix_millis_now};

/// Refresh the tenant token this long before it expires
const TOKEN_REFRESH_MARGIN_MS: i64 = 5 * 60 * 1000;

#[derive(Clone, PartialEq, Eq)]
struct TenantToken {
    token: String,
    expires_at: i64,
}

impl std::fmt::Debug for TenantToken {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("TenantToken")
            .field("token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    code: i64,
    #[serde(default)]
    msg: String,
    tenant_access_token: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    expire: i64,
}

/// Standard `{code, msg, data}` response envelope
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct DocumentData {
    document: WireDocument,
}

#[derive(Debug, Deserialize)]
struct WireDocument {
    document_id: String,
    #[serde(default)]
    revision_id: Option<i64>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    update_time: Option<i64>,
}

/// Blocks created by an append request, in request order
#[derive(Debug, Deserialize)]
struct AppendedChildren {
    #[serde(default)]
    children: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct BlockPage {
    #[serde(default)]
    items: Vec<Value>,
    #[serde(default)]
    page_token: Option<String>,
    #[serde(default)]
    has_more: bool,
}

/// Authenticated HTTP client shared by the document store and the notifier
pub struct ApiClient {
    config: RemoteConfig,
    client: reqwest::Client,
    token: Mutex<Option<TenantToken>>,
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ApiClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ApiClient {
    pub fn new(config: RemoteConfig) -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self {
            config,
            client,
            token: Mutex::new(None),
        })
    }

    pub const fn config(&self) -> &RemoteConfig {
        &self.config
    }

    fn url(&self, route: &str) -> String {
        format!("{}{route}", self.config.api_base_url)
    }

    /// Current tenant access token, exchanging credentials when needed
    async fn tenant_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - TOKEN_REFRESH_MARGIN_MS > unix_millis_now() {
                return Ok(token.token.clone());
            }
        }

        let response = self
            .client
            .post(self.url("/open-apis/auth/v3/tenant_access_token/internal"))
            .json(&json!({
                "app_id": self.config.app_id,
                "app_secret": self.config.app_secret,
            }))
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let payload = serde_json::from_str::<TokenResponse>(&body).map_err(|_| {
            Error::Remote(format!(
                "get tenant token: HTTP {} - {}",
                status.as_u16(),
                compact_text(&body)
            ))
        })?;
        if payload.code != 0 {
            return Err(Error::Remote(format!(
                "get tenant token: {} - {}",
                payload.code, payload.msg
            )));
        }
        let token = payload
            .tenant_access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| Error::Remote("get tenant token: response carried no token".into()))?;

        tracing::debug!(expires_in = payload.expire, "Obtained tenant access token");
        *cached = Some(TenantToken {
            token: token.clone(),
            expires_at: unix_millis_now() + payload.expire * 1000,
        });
        Ok(token)
    }

    /// Send an authenticated request and unwrap the response envelope
    async fn call<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<Option<T>> {
        let token = self.tenant_token().await?;
        let response = request
            .bearer_auth(token)
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let envelope = serde_json::from_str::<Envelope<T>>(&body).map_err(|error| {
            if status.is_success() {
                Error::Remote(format!("{operation}: invalid response - {error}"))
            } else {
                Error::Remote(format!(
                    "{operation}: HTTP {} - {}",
                    status.as_u16(),
                    compact_text(&body)
                ))
            }
        })?;

        if envelope.code != 0 {
            return Err(Error::Remote(format!(
                "{operation}: {} - {}",
                envelope.code, envelope.msg
            )));
        }
        Ok(envelope.data)
    }

    async fn call_required<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: RequestBuilder,
    ) -> Result<T> {
        self.call(operation, request)
            .await?
            .ok_or_else(|| Error::Remote(format!("{operation}: response carried no data")))
    }

    fn request(&self, method: Method, route: &str) -> RequestBuilder {
        self.client.request(method, self.url(route))
    }

    /// Collect every page of a block listing
    async fn list_blocks(&self, operation: &str, route: &str) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        let mut page_token: Option<String> = None;
        let page_size = DEFAULT_PAGE_SIZE.to_string();

        loop {
            let mut query = vec![
                ("page_size", page_size.clone()),
                ("document_revision_id", "-1".to_string()),
            ];
            if let Some(token) = page_token.take() {
                query.push(("page_token", token));
            }

            let page: BlockPage = self
                .call_required(operation, self.request(Method::GET, route).query(&query))
                .await?;
            blocks.extend(page.items.iter().map(decode_block));

            match page.page_token.filter(|token| !token.is_empty()) {
                Some(token) if page.has_more || page.items.len() >= DEFAULT_PAGE_SIZE => {
                    page_token = Some(token);
                }
                _ => break,
            }
        }

        Ok(blocks)
    }

    async fn share_publicly(&self, document_id: &str) -> Result<()> {
        let route = format!(
            "/open-apis/drive/v1/permissions/{}/public",
            urlencoding::encode(document_id)
        );
        self.call::<Value>(
            "set document permission",
            self.request(Method::PATCH, &route)
                .query(&[("type", "docx")])
                .json(&json!({
                    "external_access_entity": "open",
                    "link_share_entity": "anyone_can_edit",
                    "security_entity": "anyone_can_edit",
                    "comment_entity": "anyone_can_edit",
                    "share_entity": "anyone_can_edit",
                })),
        )
        .await?;
        Ok(())
    }
}

/// [`DocumentStore`] over the docx API
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    api: Arc<ApiClient>,
}

impl HttpDocumentStore {
    pub const fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

fn document_route(document_id: &str) -> String {
    format!(
        "/open-apis/docx/v1/documents/{}",
        urlencoding::encode(document_id)
    )
}

#[async_trait]
impl DocumentStore for HttpDocumentStore {
    async fn create_document(&self, title: &str) -> Result<DocumentHandle> {
        let data: DocumentData = self
            .api
            .call_required(
                "create document",
                self.api
                    .request(Method::POST, "/open-apis/docx/v1/documents")
                    .json(&json!({ "title": title })),
            )
            .await?;
        let document_id = data.document.document_id;
        tracing::info!(document_id = %document_id, "Created remote document");

        if self.api.config.share_publicly {
            if let Err(error) = self.api.share_publicly(&document_id).await {
                tracing::warn!(document_id = %document_id, %error, "Failed to open link sharing");
            }
        }

        Ok(DocumentHandle {
            url: self.api.config.document_url(&document_id),
            document_id,
        })
    }

    async fn append_blocks(
        &self,
        document_id: &str,
        parent_id: &str,
        blocks: &[Block],
        insert_index: Option<usize>,
    ) -> Result<Vec<String>> {
        let route = format!(
            "{}/blocks/{}/children",
            document_route(document_id),
            urlencoding::encode(parent_id)
        );
        let index = insert_index
            .and_then(|index| i64::try_from(index).ok())
            .unwrap_or(-1);
        let children: Vec<Value> = blocks.iter().map(encode_block).collect();

        let created: Option<AppendedChildren> = self
            .api
            .call(
                "append blocks",
                self.api
                    .request(Method::POST, &route)
                    .query(&[("document_revision_id", "-1")])
                    .json(&json!({ "children": children, "index": index })),
            )
            .await?;
        Ok(created
            .map(|created| {
                created
                    .children
                    .iter()
                    .map(|child| decode_block(child).block_id)
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_top_blocks(&self, document_id: &str) -> Result<Vec<Block>> {
        let route = format!("{}/blocks", document_route(document_id));
        self.api.list_blocks("list blocks", &route).await
    }

    async fn list_block_children(&self, document_id: &str, block_id: &str) -> Result<Vec<Block>> {
        let route = format!(
            "{}/blocks/{}/children",
            document_route(document_id),
            urlencoding::encode(block_id)
        );
        self.api.list_blocks("list block children", &route).await
    }

    async fn get_metadata(&self, document_id: &str) -> Result<DocumentMetadata> {
        let data: DocumentData = self
            .api
            .call_required(
                "get document",
                self.api.request(Method::GET, &document_route(document_id)),
            )
            .await?;
        Ok(DocumentMetadata {
            revision_id: data.document.revision_id,
            update_time: data.document.update_time,
            title: data.document.title.unwrap_or_default(),
        })
    }
}

/// [`Notifier`] that posts plain-text chat messages
#[derive(Debug, Clone)]
pub struct HttpNotifier {
    api: Arc<ApiClient>,
}

impl HttpNotifier {
    pub const fn new(api: Arc<ApiClient>) -> Self {
        Self { api }
    }
}

/// Group chats have `oc_` ids; anything else is addressed as a user
fn receive_id_type(chat_id: &str) -> &'static str {
    if chat_id.starts_with("oc_") {
        "chat_id"
    } else {
        "open_id"
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(&self, chat_id: &str, text: &str) -> Result<()> {
        let content = serde_json::to_string(&json!({ "text": text }))?;
        self.api
            .call::<Value>(
                "send message",
                self.api
                    .request(Method::POST, "/open-apis/im/v1/messages")
                    .query(&[("receive_id_type", receive_id_type(chat_id))])
                    .json(&json!({
                        "receive_id": chat_id,
                        "msg_type": "text",
                        "content": content,
                    })),
            )
            .await?;
        Ok(())
    }
}
