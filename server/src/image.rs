use std::{path::PathBuf, sync::Arc};

use axum::body::Bytes;
use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Stable reference to an uploaded doctor avatar.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageRef {
    pub public_id: String,
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub content_type: String,
    pub file_name: Option<String>,
}

impl ImageUpload {
    pub fn extension(&self) -> Result<&'static str, Error> {
        match self.content_type.as_str() {
            "image/png" => Ok("png"),
            "image/jpeg" => Ok("jpg"),
            "image/webp" => Ok("webp"),
            other => Err(Error::InvalidInput(format!(
                "Unsupported image format {other:?}, expected png, jpeg or webp"
            ))),
        }
    }
}

#[axum::async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, upload: ImageUpload) -> Result<ImageRef, Error>;

    async fn remove(&self, image: &ImageRef) -> Result<(), Error>;
}

#[derive(Clone)]
pub struct ImageStore(pub Arc<dyn ImageHost>);

impl ImageStore {
    pub fn new(host: impl ImageHost + 'static) -> Self {
        Self(Arc::new(host))
    }
}

impl std::ops::Deref for ImageStore {
    type Target = dyn ImageHost;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

/// Writes uploads to a directory that the router serves under `public_url`.
pub struct LocalImageHost {
    dir: PathBuf,
    public_url: String,
}

impl LocalImageHost {
    pub fn new(dir: impl Into<PathBuf>, public_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            public_url: public_url.into(),
        }
    }
}

#[axum::async_trait]
impl ImageHost for LocalImageHost {
    async fn upload(&self, upload: ImageUpload) -> Result<ImageRef, Error> {
        let extension = upload.extension()?;
        if upload.bytes.is_empty() {
            return Err(Error::InvalidInput("Uploaded image is empty".to_string()));
        }

        let public_id = ObjectId::new().to_hex();
        let file_name = format!("{public_id}.{extension}");

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(self.dir.join(&file_name), &upload.bytes).await?;

        tracing::debug!(
            "stored image {} ({} bytes, original name {:?})",
            file_name,
            upload.bytes.len(),
            upload.file_name
        );

        Ok(ImageRef {
            public_id,
            url: format!("{}/{}", self.public_url.trim_end_matches('/'), file_name),
        })
    }

    async fn remove(&self, image: &ImageRef) -> Result<(), Error> {
        let file_name = image
            .url
            .rsplit('/')
            .next()
            .filter(|it| it.starts_with(&image.public_id))
            .ok_or(Error::NotFound("image"))?;

        tokio::fs::remove_file(self.dir.join(file_name)).await?;
        tracing::debug!("removed image {}", file_name);

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn upload(content_type: &str, bytes: &'static [u8]) -> ImageUpload {
        ImageUpload {
            bytes: Bytes::from_static(bytes),
            content_type: content_type.to_string(),
            file_name: Some("avatar".to_string()),
        }
    }

    #[tokio::test]
    async fn test_local_upload() {
        let dir = tempfile::tempdir().unwrap();
        let host = LocalImageHost::new(dir.path(), "/uploads/");

        let image = host.upload(upload("image/png", b"\x89PNG")).await.unwrap();

        assert_eq!(image.url, format!("/uploads/{}.png", image.public_id));
        let stored = std::fs::read(dir.path().join(format!("{}.png", image.public_id))).unwrap();
        assert_eq!(stored, b"\x89PNG");
    }

    #[tokio::test]
    async fn test_local_remove() {
        let dir = tempfile::tempdir().unwrap();
        let host = LocalImageHost::new(dir.path(), "/uploads");

        let image = host.upload(upload("image/webp", b"RIFF")).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);

        host.remove(&image).await.unwrap();
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        let foreign = ImageRef {
            public_id: image.public_id.clone(),
            url: "/uploads/someone-else.png".to_string(),
        };
        assert_matches!(host.remove(&foreign).await, Err(Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let host = LocalImageHost::new(dir.path(), "/uploads");

        let err = host.upload(upload("image/gif", b"GIF89a")).await.unwrap_err();
        assert_matches!(err, Error::InvalidInput(_));

        let err = host.upload(upload("image/jpeg", b"")).await.unwrap_err();
        assert_matches!(err, Error::InvalidInput(_));

        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
