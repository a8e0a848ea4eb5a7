//! Source code artifact storage.
//!
//! Artifacts are addressed by string keys produced with [`artifact_key`].
//! Every upload receives a fresh key, so replacing an artifact never
//! overwrites the blob that is still referenced by a previous database row.

use std::{io, path::PathBuf};

use derive_more::{Display, Error, From};
use rand::{
    distributions::{Alphanumeric, DistString},
    thread_rng,
};
use tokio::fs;

#[cfg(feature = "s3")]
use aws_sdk_s3::{
    config::{Credentials, Region},
    primitives::ByteStream,
    Client,
};
#[cfg(feature = "s3")]
use tokio::io::AsyncReadExt;

use crate::config;

/// Length of the random key segment.
const KEY_NONCE_LENGTH: usize = 16;

/// Errors that may occur while accessing artifact storage.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    /// AWS S3-related error.
    #[cfg(feature = "s3")]
    S3(aws_sdk_s3::Error),

    /// IO-related error.
    Io(io::Error),

    /// Storage backend is not supported by the current build.
    #[display(fmt = "unsupported storage backend")]
    UnsupportedBackend,
}

/// Configured artifact storage.
pub enum ArtifactStore {
    /// AWS S3-compatible bucket.
    #[cfg(feature = "s3")]
    S3 {
        /// Configured S3 client.
        client: Client,

        /// Target bucket name.
        bucket: String,
    },

    /// Local directory.
    Filesystem {
        /// Root directory path.
        root: PathBuf,
    },
}

impl ArtifactStore {
    /// Create new [`ArtifactStore`] from the provided [`Storage`] configuration.
    ///
    /// [`Storage`]: config::Storage
    pub async fn new(config: &config::Storage) -> Result<Self, Error> {
        match config {
            #[cfg(feature = "s3")]
            config::Storage::S3 {
                access_key_id,
                secret_access_key,
                region,
                endpoint_url,
                artifact_bucket,
            } => {
                let sdk_config = aws_config::from_env()
                    .endpoint_url(endpoint_url)
                    .region(Region::new(region.clone()))
                    .credentials_provider(Credentials::new(
                        access_key_id,
                        secret_access_key,
                        None,
                        None,
                        "s3-client",
                    ))
                    .load()
                    .await;

                Ok(Self::S3 {
                    client: Client::new(&sdk_config),
                    bucket: artifact_bucket.clone(),
                })
            }
            #[cfg(not(feature = "s3"))]
            config::Storage::S3 { .. } => Err(Error::UnsupportedBackend),
            config::Storage::Filesystem { path } => {
                fs::create_dir_all(path).await?;

                Ok(Self::Filesystem { root: path.clone() })
            }
        }
    }

    /// Durably store artifact contents under the provided key.
    pub async fn put(&self, key: &str, data: Vec<u8>) -> Result<(), Error> {
        match self {
            #[cfg(feature = "s3")]
            Self::S3 { client, bucket } => {
                client
                    .put_object()
                    .bucket(bucket)
                    .key(key)
                    .body(ByteStream::from(data))
                    .send()
                    .await
                    .map_err(aws_sdk_s3::Error::from)?;
            }
            Self::Filesystem { root } => {
                let path = root.join(key);

                if let Some(parent) = path.parent() {
                    fs::create_dir_all(parent).await?;
                }

                // Write into a sibling file first, so that readers never observe
                // a partially written artifact.
                let tmp = path.with_extension(format!(
                    "tmp-{}",
                    Alphanumeric.sample_string(&mut thread_rng(), 8)
                ));

                fs::write(&tmp, data).await?;
                fs::rename(&tmp, &path).await?;
            }
        }

        Ok(())
    }

    /// Read artifact contents stored under the provided key.
    pub async fn get(&self, key: &str) -> Result<Vec<u8>, Error> {
        match self {
            #[cfg(feature = "s3")]
            Self::S3 { client, bucket } => {
                let object = client
                    .get_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(aws_sdk_s3::Error::from)?;

                let mut buf = Vec::new();
                object.body.into_async_read().read_to_end(&mut buf).await?;

                Ok(buf)
            }
            Self::Filesystem { root } => Ok(fs::read(root.join(key)).await?),
        }
    }

    /// Remove artifact stored under the provided key.
    ///
    /// Removing a missing artifact is not an error.
    pub async fn remove(&self, key: &str) -> Result<(), Error> {
        match self {
            #[cfg(feature = "s3")]
            Self::S3 { client, bucket } => {
                client
                    .delete_object()
                    .bucket(bucket)
                    .key(key)
                    .send()
                    .await
                    .map_err(aws_sdk_s3::Error::from)?;
            }
            Self::Filesystem { root } => {
                let path = root.join(key);

                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
                    Err(err) => return Err(err.into()),
                }

                // Each key owns its own directory.
                if let Some(parent) = path.parent() {
                    let _ = fs::remove_dir(parent).await;
                }
            }
        }

        Ok(())
    }
}

/// Generate a fresh storage key for an artifact of the provided API resource.
///
/// Characters outside of `[A-Za-z0-9._-]` in the file name are replaced with `_`.
pub fn artifact_key(api_id: i64, filename: &str) -> String {
    let filename: String = filename
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();

    format!(
        "apis/{api_id}/{}/{filename}",
        Alphanumeric.sample_string(&mut thread_rng(), KEY_NONCE_LENGTH)
    )
}
