use async_trait::async_trait;
use chrono::{DateTime, Utc};
use opentube_core::models::{
    MediaFile, MediaKind, NewVideo, PageRequest, Video, VideoRecord, Visibility,
};
use opentube_core::AppError;
use sqlx::{FromRow, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use super::transaction::TransactionGuard;
use crate::catalog::{MediaCatalog, VideoUpdate};

const VIDEO_SELECT: &str = r#"
    SELECT v.id, v.title, v.description, v.thumbnail_filename, v.created_at, v.updated_at,
           m.kind, m.owner_id, m.visibility, m.created_at AS media_created_at
    FROM videos v
    JOIN media_files m ON m.filename = v.id
"#;

/// Joined `videos` + `media_files` row.
#[derive(Debug, FromRow)]
struct VideoRow {
    id: String,
    title: String,
    description: String,
    thumbnail_filename: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    kind: MediaKind,
    owner_id: Uuid,
    visibility: Visibility,
    media_created_at: DateTime<Utc>,
}

impl From<VideoRow> for VideoRecord {
    fn from(row: VideoRow) -> Self {
        VideoRecord {
            media: MediaFile {
                filename: row.id.clone(),
                kind: row.kind,
                owner_id: row.owner_id,
                visibility: row.visibility,
                created_at: row.media_created_at,
            },
            video: Video {
                id: row.id,
                title: row.title,
                description: row.description,
                thumbnail_filename: row.thumbnail_filename,
                created_at: row.created_at,
                updated_at: row.updated_at,
            },
        }
    }
}

/// Postgres-backed media catalog
#[derive(Clone)]
pub struct MediaRepository {
    pool: PgPool,
}

impl MediaRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert_media(conn: &mut PgConnection, file: &MediaFile) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO media_files (filename, kind, owner_id, visibility, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&file.filename)
        .bind(file.kind)
        .bind(file.owner_id)
        .bind(file.visibility)
        .bind(file.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn select_video(
        conn: &mut PgConnection,
        id: &str,
    ) -> Result<Option<VideoRecord>, AppError> {
        let row: Option<VideoRow> =
            sqlx::query_as::<Postgres, VideoRow>(&format!("{} WHERE v.id = $1", VIDEO_SELECT))
                .bind(id)
                .fetch_optional(conn)
                .await?;
        Ok(row.map(VideoRecord::from))
    }
}

#[async_trait]
impl MediaCatalog for MediaRepository {
    #[tracing::instrument(skip(self), fields(db.table = "media_files", db.operation = "select"))]
    async fn find_media(&self, filename: &str) -> Result<Option<MediaFile>, AppError> {
        let row = sqlx::query_as::<Postgres, MediaFile>(
            r#"
            SELECT filename, kind, owner_id, visibility, created_at
            FROM media_files
            WHERE filename = $1
            "#,
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_files", db.operation = "select"))]
    async fn media_exists(&self, filename: &str) -> Result<bool, AppError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM media_files WHERE filename = $1)")
                .bind(filename)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "select", db.record_id = %id))]
    async fn find_video(&self, id: &str) -> Result<Option<VideoRecord>, AppError> {
        let mut conn = self.pool.acquire().await?;
        Self::select_video(&mut conn, id).await
    }

    #[tracing::instrument(skip(self), fields(db.table = "videos", db.operation = "select"))]
    async fn list_videos(
        &self,
        owner: Option<Uuid>,
        caller: Option<Uuid>,
        page: PageRequest,
    ) -> Result<Vec<VideoRecord>, AppError> {
        if page.limit() == 0 {
            return Ok(Vec::new());
        }

        let rows: Vec<VideoRow> = sqlx::query_as::<Postgres, VideoRow>(&format!(
            r#"{}
            WHERE (m.visibility = 'public' OR m.owner_id = $1)
              AND ($2::uuid IS NULL OR m.owner_id = $2)
            ORDER BY v.created_at DESC, v.id
            LIMIT $3 OFFSET $4
            "#,
            VIDEO_SELECT
        ))
        .bind(caller)
        .bind(owner)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(VideoRecord::from).collect())
    }

    #[tracing::instrument(skip(self, video), fields(db.table = "videos", db.operation = "insert", db.record_id = %video.id))]
    async fn create_video(&self, video: NewVideo) -> Result<VideoRecord, AppError> {
        let now = Utc::now();
        let media = MediaFile {
            filename: video.id.clone(),
            kind: MediaKind::Video,
            owner_id: video.owner_id,
            visibility: video.visibility,
            created_at: now,
        };

        let mut tx = TransactionGuard::begin(&self.pool, "create_video").await?;

        Self::insert_media(tx.conn()?, &media).await?;

        if let Some(thumbnail) = &video.thumbnail_filename {
            let thumbnail_media = MediaFile {
                filename: thumbnail.clone(),
                kind: MediaKind::Image,
                owner_id: video.owner_id,
                visibility: video.visibility,
                created_at: now,
            };
            Self::insert_media(tx.conn()?, &thumbnail_media).await?;
        }

        sqlx::query(
            r#"
            INSERT INTO videos (id, title, description, thumbnail_filename, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            "#,
        )
        .bind(&video.id)
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.thumbnail_filename)
        .bind(now)
        .execute(tx.conn()?)
        .await?;

        tx.commit().await?;

        tracing::info!(video_id = %video.id, "Video persisted");

        Ok(VideoRecord {
            video: Video {
                id: video.id,
                title: video.title,
                description: video.description,
                thumbnail_filename: video.thumbnail_filename,
                created_at: now,
                updated_at: now,
            },
            media,
        })
    }

    #[tracing::instrument(skip(self, file), fields(db.table = "media_files", db.operation = "insert", db.record_id = %file.filename))]
    async fn create_media(&self, file: &MediaFile) -> Result<(), AppError> {
        let mut conn = self.pool.acquire().await?;
        Self::insert_media(&mut conn, file).await
    }

    #[tracing::instrument(skip(self, update), fields(db.table = "videos", db.operation = "update", db.record_id = %update.id))]
    async fn update_video(&self, update: VideoUpdate) -> Result<VideoRecord, AppError> {
        let mut tx = TransactionGuard::begin(&self.pool, "update_video").await?;

        let updated: Option<(Option<String>,)> = sqlx::query_as(
            r#"
            UPDATE videos
            SET title = COALESCE($2, title),
                description = COALESCE($3, description),
                thumbnail_filename = COALESCE($4, thumbnail_filename),
                updated_at = NOW()
            WHERE id = $1
            RETURNING thumbnail_filename
            "#,
        )
        .bind(&update.id)
        .bind(&update.title)
        .bind(&update.description)
        .bind(&update.thumbnail_filename)
        .fetch_optional(tx.conn()?)
        .await?;

        let Some((thumbnail,)) = updated else {
            tx.rollback().await?;
            return Err(AppError::NotFound(format!("Video {} not found", update.id)));
        };

        if let Some(visibility) = update.visibility {
            sqlx::query(
                r#"
                UPDATE media_files
                SET visibility = $1
                WHERE filename = $2 OR filename = $3
                "#,
            )
            .bind(visibility)
            .bind(&update.id)
            .bind(&thumbnail)
            .execute(tx.conn()?)
            .await?;
        }

        let record = Self::select_video(tx.conn()?, &update.id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Video {} not found", update.id)))?;

        tx.commit().await?;
        Ok(record)
    }

    #[tracing::instrument(skip(self), fields(db.table = "media_files", db.operation = "delete"))]
    async fn delete_media(&self, filename: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM media_files WHERE filename = $1")
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
