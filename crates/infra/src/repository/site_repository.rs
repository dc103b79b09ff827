//! # SiteRepository
//!
//! サイトの読み出しと削除を担当するリポジトリ。

use async_trait::async_trait;
use cleansing_domain::hierarchy::{ProjectId, Site, SiteId};
use sqlx::PgPool;

use crate::error::InfraError;

/// サイトリポジトリトレイト
#[async_trait]
pub trait SiteRepository: Send + Sync {
    /// ID でサイトを検索する
    async fn find_by_id(&self, id: SiteId) -> Result<Option<Site>, InfraError>;

    /// プロジェクトに属するサイトを検索する
    async fn find_by_project_id(&self, project_id: ProjectId) -> Result<Vec<Site>, InfraError>;

    /// サイト行を削除する
    async fn hard_delete(&self, id: SiteId) -> Result<(), InfraError>;

    /// プロジェクトに属するサイト行をすべて削除する
    async fn hard_delete_by_project_id(&self, project_id: ProjectId) -> Result<u64, InfraError>;
}

type SiteRow = (i64, i64, String, String);

fn into_site((id, project_id, code, name): SiteRow) -> Site {
    Site::new(SiteId::new(id), ProjectId::new(project_id), code, name)
}

/// PostgreSQL 実装の SiteRepository
#[derive(Debug, Clone)]
pub struct PostgresSiteRepository {
    pool: PgPool,
}

impl PostgresSiteRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SiteRepository for PostgresSiteRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(site_id = %id))]
    async fn find_by_id(&self, id: SiteId) -> Result<Option<Site>, InfraError> {
        let row = sqlx::query_as::<_, SiteRow>(
            "SELECT id, project_id, code, name FROM site WHERE id = $1",
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_site))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%project_id))]
    async fn find_by_project_id(&self, project_id: ProjectId) -> Result<Vec<Site>, InfraError> {
        let rows = sqlx::query_as::<_, SiteRow>(
            "SELECT id, project_id, code, name FROM site WHERE project_id = $1 ORDER BY id",
        )
        .bind(project_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_site).collect())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(site_id = %id))]
    async fn hard_delete(&self, id: SiteId) -> Result<(), InfraError> {
        sqlx::query("DELETE FROM site WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%project_id))]
    async fn hard_delete_by_project_id(&self, project_id: ProjectId) -> Result<u64, InfraError> {
        let result = sqlx::query("DELETE FROM site WHERE project_id = $1")
            .bind(project_id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
