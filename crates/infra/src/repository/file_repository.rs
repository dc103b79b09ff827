//! # FileRepository
//!
//! アップロードされたファイルの読み出しと削除を担当するリポジトリ。

use async_trait::async_trait;
use cleansing_domain::hierarchy::{DocumentId, File, FileId, SiteId};
use sqlx::PgPool;

use crate::error::InfraError;

/// ファイルリポジトリトレイト
#[async_trait]
pub trait FileRepository: Send + Sync {
    /// ドキュメントに属するファイルを検索する
    async fn find_by_document_id(&self, document_id: DocumentId) -> Result<Vec<File>, InfraError>;

    /// サイトに属するファイル行をすべて削除する
    async fn hard_delete_by_site_id(&self, site_id: SiteId) -> Result<u64, InfraError>;
}

/// PostgreSQL 実装の FileRepository
#[derive(Debug, Clone)]
pub struct PostgresFileRepository {
    pool: PgPool,
}

impl PostgresFileRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FileRepository for PostgresFileRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%document_id))]
    async fn find_by_document_id(&self, document_id: DocumentId) -> Result<Vec<File>, InfraError> {
        let rows = sqlx::query_as::<_, (i64, i64, String, i64)>(
            "SELECT id, document_id, name, size FROM file WHERE document_id = $1 ORDER BY id",
        )
        .bind(document_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, document_id, name, size)| {
                File::new(FileId::new(id), DocumentId::new(document_id), name, size)
            })
            .collect())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%site_id))]
    async fn hard_delete_by_site_id(&self, site_id: SiteId) -> Result<u64, InfraError> {
        let result = sqlx::query(
            r#"
            DELETE FROM file
            WHERE document_id IN (
                SELECT d.id
                FROM document d
                INNER JOIN document_group g ON g.id = d.group_id
                WHERE g.site_id = $1
            )
            "#,
        )
        .bind(site_id.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
