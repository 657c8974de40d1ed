//! S3 integration: a [`DocumentStore`] over one bucket, plus S3 event parsing.
//!
//! Keys are the identifiers. Listing pages through `ListObjectsV2` and drops
//! folder markers; digests are written with `Content-Type: text/markdown`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use serde::Deserialize;

use code_digest_core::contract::{DocumentStore, StoreError};

pub const MARKDOWN_CONTENT_TYPE: &str = "text/markdown";

pub struct S3Store {
    client: Client,
    bucket: String,
}

impl S3Store {
    pub async fn from_env(bucket: impl Into<String>) -> Self {
        let conf = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let bucket = bucket.into();
        tracing::info!(bucket = %bucket, "Initialized S3 store");
        Self::new(Client::new(&conf), bucket)
    }

    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }

    fn location(&self, key: &str) -> String {
        format!("s3://{}/{}", self.bucket, key)
    }

    /// GetObject as UTF-8 text; a missing key is `Ok(None)`.
    async fn fetch(&self, key: &str) -> Result<Option<String>, StoreError> {
        let resp = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) if e.as_service_error().is_some_and(|e| e.is_no_such_key()) => return Ok(None),
            Err(e) => {
                return Err(StoreError::backend(
                    self.location(key),
                    DisplayErrorContext(&e).to_string(),
                ))
            }
        };
        let bytes = resp
            .body
            .collect()
            .await
            .map_err(|e| StoreError::backend(self.location(key), e.to_string()))?
            .into_bytes();
        String::from_utf8(bytes.to_vec())
            .map(Some)
            .map_err(|_| StoreError::NotUtf8 {
                location: self.location(key),
            })
    }
}

#[async_trait]
impl DocumentStore for S3Store {
    async fn list(&self, root: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut continuation_token = None;
        loop {
            let mut req = self.client.list_objects_v2().bucket(&self.bucket);
            if !root.is_empty() {
                req = req.prefix(root);
            }
            if let Some(ref token) = continuation_token {
                req = req.continuation_token(token);
            }
            let resp = req.send().await.map_err(|e| {
                tracing::error!(bucket = %self.bucket, prefix = root, error = %DisplayErrorContext(&e), "Error listing files");
                StoreError::backend(self.location(root), DisplayErrorContext(&e).to_string())
            })?;
            if let Some(contents) = &resp.contents {
                for obj in contents {
                    if let Some(key) = obj.key() {
                        if !key.ends_with('/') {
                            keys.push(key.to_string());
                        }
                    }
                }
            }
            if resp.is_truncated == Some(true) {
                continuation_token = resp.next_continuation_token.clone();
            } else {
                break;
            }
        }
        tracing::info!(bucket = %self.bucket, prefix = root, count = keys.len(), "Found files in folder");
        Ok(keys)
    }

    async fn read(&self, id: &str) -> Result<String, StoreError> {
        self.fetch(id)
            .await?
            .ok_or_else(|| StoreError::backend(self.location(id), "NoSuchKey: object does not exist"))
    }

    async fn read_optional(&self, id: &str) -> Result<Option<String>, StoreError> {
        self.fetch(id).await
    }

    async fn write_markdown(&self, location: &str, body: &str) -> Result<(), StoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(location)
            .body(ByteStream::from(body.as_bytes().to_vec()))
            .content_type(MARKDOWN_CONTENT_TYPE)
            .send()
            .await
            .map_err(|e| {
                StoreError::backend(self.location(location), DisplayErrorContext(&e).to_string())
            })?;
        tracing::info!(bucket = %self.bucket, key = location, "Analysis saved to S3");
        Ok(())
    }
}

/// S3 event notification, as delivered to a bucket-triggered handler.
#[derive(Debug, Deserialize)]
pub struct S3Event {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Deserialize)]
pub struct S3EventRecord {
    pub s3: S3Entity,
}

#[derive(Debug, Deserialize)]
pub struct S3Entity {
    pub bucket: S3BucketEntity,
    pub object: S3ObjectEntity,
}

#[derive(Debug, Deserialize)]
pub struct S3BucketEntity {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct S3ObjectEntity {
    pub key: String,
}

/// The folder an event points at: the bucket and the prefix holding the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFolder {
    pub bucket: String,
    pub prefix: String,
}

impl S3Event {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse S3 event JSON")
    }

    /// Folder of the first record's object.
    pub fn folder(&self) -> Result<EventFolder> {
        let record = self
            .records
            .first()
            .context("S3 event contains no records")?;
        let key = decode_form_encoded_key(&record.s3.object.key)?;
        Ok(EventFolder {
            bucket: record.s3.bucket.name.clone(),
            prefix: folder_prefix(&key),
        })
    }
}

/// Decode an event object key: `+` is a space, then percent-decoding.
pub fn decode_form_encoded_key(input: &str) -> Result<String> {
    let with_spaces = input.replace('+', " ");
    let decoded = urlencoding::decode(&with_spaces)
        .with_context(|| format!("Object key {input:?} is not valid percent-encoded UTF-8"))?;
    Ok(decoded.into_owned())
}

/// Prefix of the folder containing `key`, with trailing `/`; empty at the bucket root.
pub fn folder_prefix(key: &str) -> String {
    match key.rfind('/') {
        Some(index) => key[..=index].to_string(),
        None => String::new(),
    }
}
