//! # DocumentRepository
//!
//! ドキュメントの読み出しと削除を担当するリポジトリ。
//!
//! ドキュメントはサイトを直接参照しないため、サイト単位の削除は
//! `document_group` を経由して対象を絞り込む。

use async_trait::async_trait;
use cleansing_domain::hierarchy::{Document, DocumentGroupId, DocumentId, SiteId};
use sqlx::PgPool;

use crate::error::InfraError;

/// ドキュメントリポジトリトレイト
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// ドキュメントグループに属するドキュメントを検索する
    async fn find_by_group_id(&self, group_id: DocumentGroupId)
    -> Result<Vec<Document>, InfraError>;

    /// サイトに属するドキュメント行をすべて削除する
    async fn hard_delete_by_site_id(&self, site_id: SiteId) -> Result<u64, InfraError>;
}

/// PostgreSQL 実装の DocumentRepository
#[derive(Debug, Clone)]
pub struct PostgresDocumentRepository {
    pool: PgPool,
}

impl PostgresDocumentRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentRepository for PostgresDocumentRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%group_id))]
    async fn find_by_group_id(
        &self,
        group_id: DocumentGroupId,
    ) -> Result<Vec<Document>, InfraError> {
        let rows = sqlx::query_as::<_, (i64, i64, String)>(
            "SELECT id, group_id, name FROM document WHERE group_id = $1 ORDER BY id",
        )
        .bind(group_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, group_id, name)| {
                Document::new(DocumentId::new(id), DocumentGroupId::new(group_id), name)
            })
            .collect())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%site_id))]
    async fn hard_delete_by_site_id(&self, site_id: SiteId) -> Result<u64, InfraError> {
        let result = sqlx::query(
            r#"
            DELETE FROM document
            WHERE group_id IN (SELECT id FROM document_group WHERE site_id = $1)
            "#,
        )
        .bind(site_id.as_i64())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}
