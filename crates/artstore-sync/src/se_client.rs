//! HTTP client for a Storage Element's public and file-listing surface.

use std::sync::Arc;

use artstore_model::{FileMetadata, Page, SeInfo};
use async_trait::async_trait;
use reqwest::Client;
use uuid::Uuid;

use crate::error::{SyncError, SyncResult};

/// Source of bearer tokens attached to Storage Element calls.
#[async_trait]
pub trait BearerProvider: Send + Sync {
    /// A currently valid access token.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure when no token can be produced.
    async fn bearer_token(&self) -> Result<String, String>;
}

/// Client over a Storage Element's info and file-listing endpoints.
#[derive(Clone)]
pub struct SeClient {
    http: Client,
    tokens: Arc<dyn BearerProvider>,
}

impl SeClient {
    /// Wrap an HTTP client and a token source.
    #[must_use]
    pub fn new(http: Client, tokens: Arc<dyn BearerProvider>) -> Self {
        Self { http, tokens }
    }

    /// Fetch the element's public info document.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`] on transport, status, or decode failure.
    pub async fn info(&self, base_url: &str) -> SyncResult<SeInfo> {
        let url = format!("{}/api/v1/info", base_url.trim_end_matches('/'));
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|source| SyncError::SeTransport {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::SeStatus {
                url,
                status: status.as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|source| SyncError::SeDecode { url, source })
    }

    /// Fetch one page of the element's file listing.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`] on token, transport, status, or decode
    /// failure.
    pub async fn list_files(
        &self,
        base_url: &str,
        limit: usize,
        offset: usize,
    ) -> SyncResult<Page<FileMetadata>> {
        let token = self
            .tokens
            .bearer_token()
            .await
            .map_err(|detail| SyncError::Token { detail })?;
        let url = format!(
            "{}/api/v1/files?limit={limit}&offset={offset}",
            base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| SyncError::SeTransport {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::SeStatus {
                url,
                status: status.as_u16(),
            });
        }
        response
            .json()
            .await
            .map_err(|source| SyncError::SeDecode { url, source })
    }

    /// Soft-delete a file on the element.
    ///
    /// # Errors
    ///
    /// Returns a [`SyncError`] on token, transport, or status failure.
    pub async fn delete_file(&self, base_url: &str, file_id: Uuid) -> SyncResult<()> {
        let token = self
            .tokens
            .bearer_token()
            .await
            .map_err(|detail| SyncError::Token { detail })?;
        let url = format!(
            "{}/api/v1/files/{file_id}",
            base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .delete(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| SyncError::SeTransport {
                url: url.clone(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::SeStatus {
                url,
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
