//! # DocumentGroupRepository
//!
//! ドキュメントグループの読み出しと削除を担当するリポジトリ。
//!
//! `category` は DB 上の文字列から [`DocumentCategory`] に変換する。
//! 規則表にないカテゴリもエラーにはしない。

use async_trait::async_trait;
use cleansing_domain::hierarchy::{DocumentCategory, DocumentGroup, DocumentGroupId, SiteId};
use sqlx::PgPool;

use crate::error::InfraError;

/// ドキュメントグループリポジトリトレイト
#[async_trait]
pub trait DocumentGroupRepository: Send + Sync {
    /// サイトに属するドキュメントグループを検索する
    async fn find_by_site_id(&self, site_id: SiteId) -> Result<Vec<DocumentGroup>, InfraError>;

    /// サイトに属するドキュメントグループ行をすべて削除する
    async fn hard_delete_by_site_id(&self, site_id: SiteId) -> Result<u64, InfraError>;
}

/// PostgreSQL 実装の DocumentGroupRepository
#[derive(Debug, Clone)]
pub struct PostgresDocumentGroupRepository {
    pool: PgPool,
}

impl PostgresDocumentGroupRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DocumentGroupRepository for PostgresDocumentGroupRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(%site_id))]
    async fn find_by_site_id(&self, site_id: SiteId) -> Result<Vec<DocumentGroup>, InfraError> {
        let rows = sqlx::query_as::<_, (i64, i64, String, String, i16, Option<String>)>(
            r#"
            SELECT id, site_id, name, category, progress, processed_name
            FROM document_group
            WHERE site_id = $1
            ORDER BY id
            "#,
        )
        .bind(site_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, site_id, name, category, progress, processed_name)| {
                DocumentGroup::new(
                    DocumentGroupId::new(id),
                    SiteId::new(site_id),
                    name,
                    DocumentCategory::parse(&category),
                    progress,
                    processed_name,
                )
            })
            .collect())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%site_id))]
    async fn hard_delete_by_site_id(&self, site_id: SiteId) -> Result<u64, InfraError> {
        let result = sqlx::query("DELETE FROM document_group WHERE site_id = $1")
            .bind(site_id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
