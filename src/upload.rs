//! Blob uploader: optional post-load copy of a staged file to object storage.

use std::path::Path;

use aws_sdk_s3::primitives::ByteStream;
use tracing::{info, warn};

use crate::error::IngestError;

/// Object-storage providers the uploader knows about. Only S3 is wired up;
/// the other two are accepted and logged as not implemented so configuration
/// for them is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum BlobProvider {
    S3,
    Gcs,
    Azure,
}

/// Upload one local file to `bucket` under its own filename.
pub async fn upload_blob(
    provider: BlobProvider,
    bucket: &str,
    path: &Path,
) -> Result<(), IngestError> {
    match provider {
        BlobProvider::S3 => upload_to_s3(bucket, path).await,
        BlobProvider::Gcs => {
            let target = format!("gs://{}/{}", bucket, object_key(path));
            warn!(target, "gcs upload not implemented, skipping");
            Ok(())
        }
        BlobProvider::Azure => {
            let target = format!("azure://{}/{}", bucket, object_key(path));
            warn!(target, "azure upload not implemented, skipping");
            Ok(())
        }
    }
}

/// Credentials and region come from the ambient AWS environment.
async fn upload_to_s3(bucket: &str, path: &Path) -> Result<(), IngestError> {
    let target = format!("s3://{}/{}", bucket, object_key(path));
    let upload_err = |source: Box<dyn std::error::Error + Send + Sync>| IngestError::Upload {
        target: target.clone(),
        source,
    };

    let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let client = aws_sdk_s3::Client::new(&config);

    let body = ByteStream::from_path(path)
        .await
        .map_err(|e| upload_err(Box::new(e)))?;

    client
        .put_object()
        .bucket(bucket)
        .key(object_key(path))
        .body(body)
        .send()
        .await
        .map_err(|e| upload_err(Box::new(e)))?;

    info!(target, "upload complete");
    Ok(())
}

fn object_key(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn object_key_is_the_file_name() {
        let path = PathBuf::from("/tmp/data/unzipped_files/202001/202001-citibike-tripdata.csv");
        assert_eq!(object_key(&path), "202001-citibike-tripdata.csv");
    }

    #[tokio::test]
    async fn unimplemented_providers_are_accepted() {
        let path = PathBuf::from("/nonexistent/file.csv");
        upload_blob(BlobProvider::Gcs, "bucket", &path).await.unwrap();
        upload_blob(BlobProvider::Azure, "bucket", &path).await.unwrap();
    }
}
