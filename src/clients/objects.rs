use super::{build_http_client, check_status, join_url, ClientError, Result};
use crate::config::types::ObjectStoreConfig;
use async_trait::async_trait;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Download `bucket/key` to `local_path`. The file appears only once complete.
    async fn download_object(&self, bucket: &str, key: &str, local_path: &Path) -> Result<u64>;
}

pub fn object_store_from_config(config: &ObjectStoreConfig) -> Result<Arc<dyn ObjectStore>> {
    Ok(match config {
        ObjectStoreConfig::Http { url, timeout } => Arc::new(HttpObjectStore::new(url, *timeout)?),
        ObjectStoreConfig::Local { root } => Arc::new(LocalObjectStore::new(root.clone())),
    })
}

fn partial_path(local_path: &Path) -> PathBuf {
    let mut name = local_path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn ensure_parent(local_path: &Path) -> Result<()> {
    if let Some(parent) = local_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() || key.split('/').any(|part| part == "..") {
        return Err(ClientError::InvalidRequest(format!("invalid object key '{}'", key)));
    }
    Ok(())
}

/// Object store reachable at `GET {url}/{bucket}/{key}`
#[derive(Debug)]
pub struct HttpObjectStore {
    base_url: String,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.to_string(),
            client: build_http_client(timeout)?,
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn download_object(&self, bucket: &str, key: &str, local_path: &Path) -> Result<u64> {
        validate_key(key)?;
        let url = join_url(&join_url(&self.base_url, bucket), key);
        let response = self.client.get(&url).send().await?;
        let response = check_status(response).await?;

        ensure_parent(local_path).await?;
        let part = partial_path(local_path);
        let mut file = tokio::fs::File::create(&part).await?;

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(body);

        let written = match tokio::io::copy(&mut reader, &mut file).await {
            Ok(n) => n,
            Err(e) => {
                drop(file);
                let _ = tokio::fs::remove_file(&part).await;
                return Err(e.into());
            }
        };
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&part, local_path).await?;
        tracing::info!(bucket, key, bytes = written, path = %local_path.display(), "Downloaded object");
        Ok(written)
    }
}

/// Object store backed by a local directory laid out as `{root}/{bucket}/{key}`
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn download_object(&self, bucket: &str, key: &str, local_path: &Path) -> Result<u64> {
        validate_key(key)?;
        let source = self.root.join(bucket).join(key);

        ensure_parent(local_path).await?;
        let part = partial_path(local_path);
        let written = tokio::fs::copy(&source, &part).await?;
        tokio::fs::rename(&part, local_path).await?;

        tracing::info!(bucket, key, bytes = written, path = %local_path.display(), "Copied object");
        Ok(written)
    }
}
