//! File service backed by the chat database

use crate::core::models::{FileInfo, UploadFile};
use crate::core::traits::FileService;
use crate::infrastructure::database::DatabaseConnection;
use crate::infrastructure::entities::{StoredFile, Timestamp};
use anyhow::Context;
use async_trait::async_trait;
use di::{Ref, injectable};
use uuid::Uuid;

#[injectable(FileService)]
pub struct DbFileService {
    connection: Ref<DatabaseConnection>,
}

#[async_trait]
impl FileService for DbFileService {
    async fn upload_files(
        &self,
        files: Vec<UploadFile>,
        owner_type_id: i64,
        owner_id: Uuid,
    ) -> anyhow::Result<Vec<FileInfo>> {
        if files.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.connection.begin().await?;
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            let row: StoredFile = sqlx::query_as(
                "INSERT INTO files (id, owner_type_id, owner_id, file_name, content_type, size, data, created_at) \
                VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                RETURNING id, owner_type_id, owner_id, file_name, content_type, size, created_at",
            )
            .bind(Uuid::new_v4())
            .bind(owner_type_id)
            .bind(owner_id)
            .bind(&file.file_name)
            .bind(&file.content_type)
            .bind(file.data.len() as i64)
            .bind(&file.data)
            .bind(Timestamp::now())
            .fetch_one(&mut *tx)
            .await
            .with_context(|| format!("failed to store {}", file.file_name))?;

            stored.push(FileInfo::from(row));
        }
        tx.commit().await?;

        Ok(stored)
    }

    async fn list_files(&self, owner_type_id: i64, owner_id: Uuid) -> anyhow::Result<Vec<FileInfo>> {
        let rows: Vec<StoredFile> = sqlx::query_as(
            "SELECT id, owner_type_id, owner_id, file_name, content_type, size, created_at \
            FROM files WHERE owner_type_id = ? AND owner_id = ? ORDER BY created_at ASC",
        )
        .bind(owner_type_id)
        .bind(owner_id)
        .fetch_all(&**self.connection)
        .await?;

        Ok(rows.into_iter().map(FileInfo::from).collect())
    }
}
