// Licensed under the Apache License, Version 2.0.
// See http://www.apache.org/licenses/LICENSE-2.0 for details.

//! Object-store abstraction. `ObjectStore` isolates the S3-compatible vendor the
//! core is handed through config so upload code never hardcodes a client type, and
//! `NullObjectStore` makes "no credentials configured" a real, uniform
//! implementation rather than an `Option<Client>` threaded through every call site.

use async_trait::async_trait;

use crate::errors::Result;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    async fn head(&self, key: &str) -> Result<bool>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// Local-only mode: every write is a silent no-op and every read misses. Used
/// whenever `DIGITALOCEAN_SPACES_*` env vars are absent.
pub struct NullObjectStore;

#[async_trait]
impl ObjectStore for NullObjectStore {
    async fn put(&self, _key: &str, _bytes: Vec<u8>) -> Result<()> { Ok(()) }
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>> { Ok(None) }
    async fn head(&self, _key: &str) -> Result<bool> { Ok(false) }
    async fn list(&self, _prefix: &str) -> Result<Vec<String>> { Ok(Vec::new()) }
}

#[cfg(feature = "s3")]
pub mod s3 {
    use super::*;
    use aws_config::Region;
    use aws_sdk_s3::{config::{Builder as S3ConfigBuilder, Credentials}, Client};
    use futures::TryStreamExt;
    use std::env;

    #[derive(Clone, Debug)]
    pub struct SpacesConfig {
        pub key: String,
        pub secret: String,
        pub endpoint: String,
        pub region: String,
        pub bucket: String,
    }

    impl SpacesConfig {
        /// Read `DIGITALOCEAN_SPACES_{KEY,SECRET,ENDPOINT,REGION,BUCKET}` from the
        /// environment. Returns `None` (meaning: run in local-only mode) unless all
        /// five are present.
        pub fn from_env() -> Option<Self> {
            Some(SpacesConfig {
                key: env::var("DIGITALOCEAN_SPACES_KEY").ok()?,
                secret: env::var("DIGITALOCEAN_SPACES_SECRET").ok()?,
                endpoint: env::var("DIGITALOCEAN_SPACES_ENDPOINT").ok()?,
                region: env::var("DIGITALOCEAN_SPACES_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                bucket: env::var("DIGITALOCEAN_SPACES_BUCKET").ok()?,
            })
        }
    }

    pub struct S3ObjectStore {
        client: Client,
        bucket: String,
    }

    impl S3ObjectStore {
        pub async fn connect(cfg: &SpacesConfig) -> Self {
            let creds = Credentials::new(&cfg.key, &cfg.secret, None, None, "radar-spaces");
            let base = aws_config::from_env()
                .region(Region::new(cfg.region.clone()))
                .credentials_provider(creds)
                .load()
                .await;
            let s3_config = S3ConfigBuilder::from(&base).endpoint_url(&cfg.endpoint).force_path_style(false).build();
            S3ObjectStore { client: Client::from_conf(s3_config), bucket: cfg.bucket.clone() }
        }
    }

    #[async_trait]
    impl ObjectStore for S3ObjectStore {
        async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
            self.client.put_object().bucket(&self.bucket).key(key).body(bytes.into()).send().await?;
            Ok(())
        }

        async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
            match self.client.get_object().bucket(&self.bucket).key(key).send().await {
                Ok(mut obj) => {
                    let mut buf = Vec::new();
                    while let Some(chunk) = obj.body.try_next().await? {
                        buf.extend_from_slice(&chunk);
                    }
                    Ok(Some(buf))
                }
                Err(e) => {
                    if e.as_service_error().map(|se| se.is_no_such_key()).unwrap_or(false) {
                        Ok(None)
                    } else {
                        Err(e.into())
                    }
                }
            }
        }

        async fn head(&self, key: &str) -> Result<bool> {
            match self.client.head_object().bucket(&self.bucket).key(key).send().await {
                Ok(_) => Ok(true),
                Err(e) => {
                    if e.as_service_error().map(|se| se.is_not_found()).unwrap_or(false) {
                        Ok(false)
                    } else {
                        Err(e.into())
                    }
                }
            }
        }

        async fn list(&self, prefix: &str) -> Result<Vec<String>> {
            let resp = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix).send().await?;
            Ok(resp.contents().iter().filter_map(|o| o.key().map(str::to_string)).collect())
        }
    }
}
