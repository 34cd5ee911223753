use async_trait::async_trait;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::{Bucket, Region};

use super::{ObjectStream, RawStorage};
use crate::config::Settings;
use crate::error::{Error, Result};

/// S3-compatible raw storage (MinIO in production). Selected when
/// `MINIO_ENDPOINT` is configured.
pub struct S3RawStorage {
    bucket: Bucket,
}

impl S3RawStorage {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let endpoint = settings
            .minio_endpoint
            .clone()
            .ok_or_else(|| Error::Permanent("MINIO_ENDPOINT is not set".into()))?;

        let region = Region::Custom {
            region: settings.minio_region.clone(),
            endpoint,
        };
        let credentials = Credentials::new(
            settings.minio_access_key.as_deref(),
            settings.minio_secret_key.as_deref(),
            None,
            None,
            None,
        )
        .map_err(|e| Error::Permanent(format!("invalid object storage credentials: {e}")))?;

        let bucket = Bucket::new(&settings.minio_bucket_raw, region, credentials)
            .map_err(|e| Error::Permanent(format!("failed to configure bucket: {e}")))?
            .with_path_style();

        Ok(Self { bucket })
    }
}

fn map_error(err: S3Error, path: &str) -> Error {
    match err {
        S3Error::HttpFailWithBody(404, _) => Error::not_found("blob", path),
        S3Error::HttpFailWithBody(code, body) if (400..500).contains(&code) => {
            Error::Permanent(format!("object storage rejected {path}: {code} {body}"))
        }
        other => Error::Transient(format!("object storage unavailable: {other}")),
    }
}

#[async_trait]
impl RawStorage for S3RawStorage {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<()> {
        if self.exists(path).await? {
            return Err(Error::Internal(format!("blob path collision: {path}")));
        }
        self.bucket
            .put_object(path, bytes)
            .await
            .map_err(|e| map_error(e, path))?;
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Vec<u8>> {
        let response = self
            .bucket
            .get_object(path)
            .await
            .map_err(|e| map_error(e, path))?;
        Ok(response.bytes().to_vec())
    }

    async fn open(&self, path: &str) -> Result<ObjectStream> {
        let bytes = self.get(path).await?;
        Ok(ObjectStream {
            size: bytes.len() as u64,
            reader: Box::new(std::io::Cursor::new(bytes)),
        })
    }

    async fn delete(&self, path: &str) -> Result<()> {
        match self.bucket.delete_object(path).await {
            Ok(_) => Ok(()),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(()),
            Err(e) => Err(map_error(e, path)),
        }
    }

    async fn delete_prefix(&self, prefix: &str) -> Result<()> {
        let pages = self
            .bucket
            .list(prefix.to_string(), None)
            .await
            .map_err(|e| map_error(e, prefix))?;
        for page in pages {
            for object in page.contents {
                self.delete(&object.key).await?;
            }
        }
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        match self.bucket.head_object(path).await {
            Ok((_, 200)) => Ok(true),
            Ok((_, 404)) => Ok(false),
            Ok((_, code)) => Err(Error::Transient(format!(
                "unexpected status {code} from object storage head {path}"
            ))),
            Err(S3Error::HttpFailWithBody(404, _)) => Ok(false),
            Err(e) => Err(map_error(e, path)),
        }
    }
}
