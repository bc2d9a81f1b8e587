//! Wiring services from configuration

use opentube_core::{AppError, Config};
use opentube_db::{MediaCatalog, MediaRepository};
use opentube_processing::{FFmpegToolkit, MediaToolkit};
use opentube_storage::{LocalStorage, Storage};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cdn::CdnService;
use crate::image::ImageService;
use crate::upload::VideoUploadService;
use crate::video::VideoService;

/// Every service, sharing one store and one catalog.
pub struct Services {
    pub uploads: VideoUploadService,
    pub cdn: CdnService,
    pub videos: VideoService,
    pub images: ImageService,
}

impl Services {
    pub fn new(
        storage: Arc<dyn Storage>,
        catalog: Arc<dyn MediaCatalog>,
        toolkit: Arc<dyn MediaToolkit>,
        temp_dir: impl Into<PathBuf>,
        max_concurrent_transcodes: usize,
    ) -> Self {
        Self {
            uploads: VideoUploadService::new(
                storage.clone(),
                catalog.clone(),
                toolkit,
                temp_dir,
            )
            .with_max_concurrent_transcodes(max_concurrent_transcodes),
            cdn: CdnService::new(storage.clone(), catalog.clone()),
            videos: VideoService::new(storage.clone(), catalog.clone()),
            images: ImageService::new(storage, catalog),
        }
    }
}

/// Connect the catalog, open the artifact store and detect the encoder.
pub async fn setup_services(config: &Config) -> Result<Services, AppError> {
    let pool = opentube_db::connect(config).await?;

    let storage = LocalStorage::new(&config.files_root).await?;
    tracing::info!(root = %storage.base_path().display(), "Artifact store ready");

    let toolkit = FFmpegToolkit::from_config(config).await?;
    tracing::info!(backend = %toolkit.settings().backend, "Encoder ready");

    Ok(Services::new(
        Arc::new(storage),
        Arc::new(MediaRepository::new(pool)),
        Arc::new(toolkit),
        config.temp_dir.clone(),
        config.max_concurrent_transcodes,
    ))
}
