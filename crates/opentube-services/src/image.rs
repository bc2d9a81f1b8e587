//! Standalone image uploads such as profile pictures

use bytes::Bytes;
use opentube_core::models::{MediaFile, MediaKind, Visibility};
use opentube_core::AppError;
use opentube_db::MediaCatalog;
use opentube_processing::MediaFamily;
use opentube_storage::{layout, Storage};
use std::sync::Arc;
use uuid::Uuid;

use crate::intake::{require_family, stored_extension};

#[derive(Clone)]
pub struct ImageService {
    storage: Arc<dyn Storage>,
    catalog: Arc<dyn MediaCatalog>,
}

impl ImageService {
    pub fn new(storage: Arc<dyn Storage>, catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { storage, catalog }
    }

    /// Store an image as `Images/<uuid>.<ext>` and register it.
    #[tracing::instrument(skip(self, data), fields(size_bytes = data.len()))]
    pub async fn store_image(
        &self,
        owner_id: Uuid,
        data: Bytes,
        client_filename: &str,
        visibility: Visibility,
    ) -> Result<MediaFile, AppError> {
        let sniffed = require_family(&data, MediaFamily::Image)?;
        let filename = format!(
            "{}.{}",
            Uuid::new_v4(),
            stored_extension(client_filename, &sniffed)
        );
        let key = layout::image_key(&filename)?;

        self.storage.put(&key, data).await?;

        let file = MediaFile::new(filename, MediaKind::Image, owner_id, visibility);
        if let Err(e) = self.catalog.create_media(&file).await {
            if let Err(cleanup) = self.storage.delete(&key).await {
                tracing::warn!(error = %cleanup, key = %key, "Failed to remove orphaned image");
            }
            return Err(e);
        }

        tracing::info!(filename = %file.filename, "Image stored");
        Ok(file)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_image(&self, filename: &str, caller: Uuid) -> Result<(), AppError> {
        let key = layout::image_key(filename)?;
        let file = self
            .catalog
            .find_media(filename)
            .await?
            .filter(|m| m.kind == MediaKind::Image)
            .ok_or_else(|| AppError::NotFound(format!("Image {} not found", filename)))?;

        if !file.is_owned_by(caller) {
            return Err(AppError::Forbidden(format!(
                "Only the owner may delete image {}",
                filename
            )));
        }

        self.catalog.delete_media(filename).await?;
        if let Err(e) = self.storage.delete(&key).await {
            tracing::warn!(error = %e, key = %key, "Failed to remove image file");
        }
        Ok(())
    }
}
