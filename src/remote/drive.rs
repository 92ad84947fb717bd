//! REST client for the remote object store holding exported artifacts.

use camino::Utf8Path;
use futures_util::StreamExt;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::store::{ObjectId, ObjectQuery, RemoteObject, RemoteStore, StoreFuture};

/// Errors raised by the object store client.
#[derive(Debug, Error)]
pub enum StoreApiError {
    /// Transport-level failure.
    #[error("object store transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// The store refused the request.
    #[error("object store refused the request ({status}): {message}")]
    Refused {
        /// HTTP status returned.
        status: StatusCode,
        /// Response body, as far as it could be read.
        message: String,
    },
    /// A local write failed mid-download.
    #[error("failed writing {path}: {message}")]
    LocalWrite {
        /// Destination being written.
        path: String,
        /// Human-readable error message.
        message: String,
    },
}

#[derive(Deserialize)]
struct FileEntry {
    id: String,
    name: String,
    // The store reports sizes as decimal strings.
    #[serde(default)]
    size: Option<String>,
}

#[derive(Deserialize)]
struct FileListing {
    #[serde(default)]
    files: Vec<FileEntry>,
}

/// Object store reached over HTTP with bearer-token auth.
#[derive(Clone, Debug)]
pub struct HttpObjectStore {
    client: Client,
    base_url: String,
    token: String,
    retry_attempts: u32,
}

impl HttpObjectStore {
    /// Creates a client for `base_url` authenticating with `token`.
    #[must_use]
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, retry_attempts: u32) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            client: Client::new(),
            base_url,
            token: token.into(),
            retry_attempts,
        }
    }

    fn query_expression(query: &ObjectQuery) -> String {
        let mut clauses = Vec::new();
        if let Some(mime) = &query.mime_type {
            clauses.push(format!("mimeType = '{mime}'"));
        }
        if let Some(mime) = &query.mime_type_not {
            clauses.push(format!("mimeType != '{mime}'"));
        }
        if let Some(fragment) = &query.name_contains {
            clauses.push(format!("name contains '{fragment}'"));
        }
        clauses.join(" and ")
    }

    async fn list_once(&self, query: &ObjectQuery) -> Result<Vec<RemoteObject>, StoreApiError> {
        let expression = Self::query_expression(query);
        let response = self
            .client
            .get(format!("{}/files", self.base_url))
            .bearer_auth(&self.token)
            .query(&[
                ("pageSize", "100"),
                ("q", expression.as_str()),
                ("fields", "files(id, name, size)"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(StoreApiError::Refused { status, message });
        }

        let listing: FileListing = response.json().await?;
        Ok(listing
            .files
            .into_iter()
            .map(|entry| RemoteObject {
                id: ObjectId(entry.id),
                name: entry.name,
                size: entry.size.and_then(|raw| raw.parse().ok()),
            })
            .collect())
    }

    async fn download_to(
        &self,
        object: &RemoteObject,
        dest: &Utf8Path,
    ) -> Result<u64, StoreApiError> {
        let response = self
            .client
            .get(format!("{}/files/{}", self.base_url, object.id))
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(StoreApiError::Refused { status, message });
        }

        let mut file =
            tokio::fs::File::create(dest)
                .await
                .map_err(|err| StoreApiError::LocalWrite {
                    path: dest.to_string(),
                    message: err.to_string(),
                })?;

        let mut written: u64 = 0;
        let mut last_decile: u64 = 0;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk)
                .await
                .map_err(|err| StoreApiError::LocalWrite {
                    path: dest.to_string(),
                    message: err.to_string(),
                })?;
            written += chunk.len() as u64;
            if let Some(total) = object.size.filter(|total| *total > 0) {
                let decile = written.saturating_mul(10) / total;
                if decile > last_decile {
                    last_decile = decile;
                    debug!(
                        name = %object.name,
                        percent = decile.saturating_mul(10),
                        "download progress"
                    );
                }
            }
        }
        file.flush().await.map_err(|err| StoreApiError::LocalWrite {
            path: dest.to_string(),
            message: err.to_string(),
        })?;
        Ok(written)
    }

    async fn delete_once(&self, id: &ObjectId) -> Result<(), StoreApiError> {
        let response = self
            .client
            .delete(format!("{}/files/{id}", self.base_url))
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let message = response.text().await.unwrap_or_default();
            return Err(StoreApiError::Refused { status, message });
        }
        Ok(())
    }
}

impl RemoteStore for HttpObjectStore {
    type Error = StoreApiError;

    fn list<'a>(
        &'a self,
        query: &'a ObjectQuery,
    ) -> StoreFuture<'a, Vec<RemoteObject>, Self::Error> {
        Box::pin(super::with_retries(
            self.retry_attempts,
            "storage listing",
            || self.list_once(query),
        ))
    }

    fn download<'a>(
        &'a self,
        object: &'a RemoteObject,
        dest: &'a Utf8Path,
    ) -> StoreFuture<'a, u64, Self::Error> {
        Box::pin(self.download_to(object, dest))
    }

    fn delete<'a>(&'a self, id: &'a ObjectId) -> StoreFuture<'a, (), Self::Error> {
        // Deletes are never retried blindly: the caller decides whether the
        // object should still exist before issuing another attempt.
        Box::pin(self.delete_once(id))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(ObjectQuery::rasters(), "mimeType = 'image/tiff'")]
    #[case(
        ObjectQuery::tables("SWIR-Custom-Change-Between"),
        "mimeType != 'image/tiff' and name contains 'SWIR-Custom-Change-Between'"
    )]
    fn query_expressions_follow_the_store_grammar(
        #[case] query: ObjectQuery,
        #[case] expected: &str,
    ) {
        assert_eq!(HttpObjectStore::query_expression(&query), expected);
    }

    #[test]
    fn listing_sizes_parse_from_decimal_strings() {
        let raw = r#"{"files":[{"id":"f1","name":"a.tif","size":"2048"},{"id":"f2","name":"b.csv"}]}"#;
        let listing: FileListing = serde_json::from_str(raw).expect("listing parses");
        let sizes: Vec<Option<u64>> = listing
            .files
            .into_iter()
            .map(|entry| entry.size.and_then(|value| value.parse().ok()))
            .collect();
        assert_eq!(sizes, vec![Some(2048), None]);
    }
}
