use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use log::{debug, info};
use reqwest::{Client, StatusCode, Url};
use rusty_s3::actions::ListObjectsV2;
use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};

use super::{ObjectStore, StorageError, StoredObject};
use crate::config::{StorageConfig, StorageCredentials};
use crate::models::ListingEntry;

// Presigned URLs are used immediately, so they only need to live long enough
// to survive clock skew with the storage provider.
const SIGN_DURATION: Duration = Duration::from_secs(60);

/// S3-compatible bucket client. Requests are presigned with `rusty-s3` and
/// sent through a shared `reqwest` client.
pub struct BucketClient {
    bucket: Bucket,
    credentials: Credentials,
    host_rewrite: Option<String>,
    client: Client,
}

impl BucketClient {
    pub fn new(
        config: &StorageConfig,
        credentials: &StorageCredentials,
        timeout: u64,
    ) -> Result<Self, StorageError> {
        let endpoint: Url = config.endpoint.parse().map_err(|e| {
            StorageError::Config(format!("invalid endpoint '{}': {}", config.endpoint, e))
        })?;

        let style = if config.path_style {
            UrlStyle::Path
        } else {
            UrlStyle::VirtualHost
        };

        let bucket = Bucket::new(endpoint, style, config.bucket.clone(), config.region.clone())
            .map_err(|e| StorageError::Config(format!("invalid bucket: {:?}", e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()?;

        info!(
            "Bucket client ready for '{}' in region '{}'",
            config.bucket, config.region
        );

        Ok(Self {
            bucket,
            credentials: Credentials::new(
                credentials.access_key.clone(),
                credentials.secret_key.clone(),
            ),
            host_rewrite: config.host_rewrite.clone(),
            client,
        })
    }

    fn presign<'a>(&self, action: impl S3Action<'a>) -> Result<Url, StorageError> {
        let url = action.sign(SIGN_DURATION);
        self.rewrite_host(url)
    }

    // Objects are served through the CDN domain rather than the raw endpoint
    fn rewrite_host(&self, mut url: Url) -> Result<Url, StorageError> {
        if let Some(host) = self.host_rewrite.as_deref() {
            url.set_host(Some(host)).map_err(|e| {
                StorageError::Config(format!("invalid host rewrite '{}': {}", host, e))
            })?;
        }
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for BucketClient {
    async fn get_object(&self, key: &str) -> Result<StoredObject, StorageError> {
        debug!("get_object: {}", key);
        let url = self.presign(self.bucket.get_object(Some(&self.credentials), key))?;

        let response = self.client.get(url).send().await?;
        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND => {
                return Err(StorageError::NotFound {
                    key: key.to_string(),
                })
            }
            status => return Err(StorageError::Status(status.as_u16())),
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?;

        Ok(StoredObject {
            bytes,
            content_type,
        })
    }

    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        debug!("put_object: {} ({} bytes)", key, bytes.len());
        let url = self.presign(self.bucket.put_object(Some(&self.credentials), key))?;

        let response = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(StorageError::Status(response.status().as_u16()));
        }

        Ok(())
    }

    async fn list_objects(&self) -> Result<Vec<ListingEntry>, StorageError> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut action = self.bucket.list_objects_v2(Some(&self.credentials));
            if let Some(token) = continuation.take() {
                action.query_mut().insert("continuation-token", token);
            }
            let url = self.presign(action)?;

            let response = self.client.get(url).send().await?;
            if !response.status().is_success() {
                return Err(StorageError::Status(response.status().as_u16()));
            }
            let body = response.text().await?;

            let (page, next) = parse_listing_page(&body)?;
            entries.extend(page);

            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        info!("Listed {} objects", entries.len());
        Ok(entries)
    }
}

/// Parses one ListObjectsV2 response page into entries plus the continuation
/// token of the next page.
pub(crate) fn parse_listing_page(
    body: &str,
) -> Result<(Vec<ListingEntry>, Option<String>), StorageError> {
    let page = ListObjectsV2::parse_response(body)
        .map_err(|e| StorageError::ParsingError(e.to_string()))?;

    let entries = page
        .contents
        .into_iter()
        .map(|content| ListingEntry {
            key: content.key,
            size: content.size,
            last_modified: DateTime::parse_from_rfc3339(&content.last_modified)
                .ok()
                .map(|t| t.with_timezone(&Utc)),
            etag: Some(content.etag.trim_matches('"').to_string()).filter(|e| !e.is_empty()),
        })
        .collect();

    Ok((entries, page.next_continuation_token))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<ListBucketResult xmlns="http://s3.amazonaws.com/doc/2006-03-01/">
  <Name>photos</Name>
  <Prefix></Prefix>
  <KeyCount>2</KeyCount>
  <MaxKeys>2</MaxKeys>
  <IsTruncated>true</IsTruncated>
  <NextContinuationToken>page-2</NextContinuationToken>
  <Contents>
    <Key>cat.jpg</Key>
    <LastModified>2023-04-01T10:00:00.000Z</LastModified>
    <ETag>"0cc175b9c0f1b6a831c399e269772661"</ETag>
    <Size>1024</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
  <Contents>
    <Key>albums/dog.png</Key>
    <LastModified>2023-04-02T11:30:00.000Z</LastModified>
    <ETag>"92eb5ffee6ae2fec3ad71c777531578f"</ETag>
    <Size>2048</Size>
    <StorageClass>STANDARD</StorageClass>
  </Contents>
</ListBucketResult>"#;

    #[test]
    fn parses_listing_page() {
        let (entries, next) = parse_listing_page(PAGE).unwrap();

        assert_eq!(next.as_deref(), Some("page-2"));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].key, "cat.jpg");
        assert_eq!(entries[0].size, 1024);
        assert_eq!(
            entries[0].etag.as_deref(),
            Some("0cc175b9c0f1b6a831c399e269772661")
        );
        assert_eq!(
            entries[1].last_modified.map(|t| t.to_rfc3339()),
            Some("2023-04-02T11:30:00+00:00".to_string())
        );
    }

    #[test]
    fn rewrites_presigned_host() {
        let config = StorageConfig {
            endpoint: "https://nyc3.digitaloceanspaces.com".to_string(),
            host_rewrite: Some("photos.nyc3.cdn.digitaloceanspaces.com".to_string()),
            bucket: "photos".to_string(),
            region: "nyc3".to_string(),
            path_style: false,
        };
        let credentials = StorageCredentials {
            access_key: "key".to_string(),
            secret_key: "secret".to_string(),
        };
        let client = BucketClient::new(&config, &credentials, 5).unwrap();

        let url = client
            .presign(client.bucket.get_object(Some(&client.credentials), "cat.jpg"))
            .unwrap();

        assert_eq!(url.host_str(), Some("photos.nyc3.cdn.digitaloceanspaces.com"));
        assert_eq!(url.path(), "/cat.jpg");
    }
}
