//! # ProjectRepository
//!
//! プロジェクトの読み出し・削除・使用量更新を担当するリポジトリ。
//!
//! ## 関連テーブル
//!
//! プロジェクトは `contractor_project` を通じて契約者に属する。
//! プロジェクト行を削除する前に、以下の関連行を削除する必要がある:
//!
//! - `client_project`
//! - `uploader_project`
//! - `vessel_project`
//! - `contractor_project`

use async_trait::async_trait;
use cleansing_domain::hierarchy::{ContractorId, Project, ProjectId};
use sqlx::PgPool;

use crate::error::InfraError;

/// プロジェクト行より先に削除する関連テーブル
const ASSOCIATION_TABLES: [&str; 4] = [
    "client_project",
    "uploader_project",
    "vessel_project",
    "contractor_project",
];

/// プロジェクトリポジトリトレイト
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// ID でプロジェクトを検索する
    async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, InfraError>;

    /// 契約者に属するプロジェクトを検索する
    async fn find_by_contractor_id(
        &self,
        contractor_id: ContractorId,
    ) -> Result<Vec<Project>, InfraError>;

    /// 使用量を `size_delta` バイトだけ増減する（0 未満にはならない）
    async fn update_usage(&self, id: ProjectId, size_delta: i64) -> Result<(), InfraError>;

    /// プロジェクトを参照する関連行を削除する
    async fn cleanup_associations(&self, id: ProjectId) -> Result<u64, InfraError>;

    /// プロジェクト行を削除する
    async fn hard_delete(&self, id: ProjectId) -> Result<(), InfraError>;

    /// 契約者に属するプロジェクト行をすべて削除する
    ///
    /// 関連行とプロジェクト行を 1 トランザクションで削除し、削除したプロジェクト数を返す。
    async fn hard_delete_by_contractor_id(
        &self,
        contractor_id: ContractorId,
    ) -> Result<u64, InfraError>;
}

type ProjectRow = (i64, String, String, i64);

fn into_project((id, code, name, file_size_usage): ProjectRow) -> Project {
    Project::new(ProjectId::new(id), code, name, file_size_usage)
}

/// PostgreSQL 実装の ProjectRepository
#[derive(Debug, Clone)]
pub struct PostgresProjectRepository {
    pool: PgPool,
}

impl PostgresProjectRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(project_id = %id))]
    async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, InfraError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, code, name, file_size_usage
            FROM project
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_project))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%contractor_id))]
    async fn find_by_contractor_id(
        &self,
        contractor_id: ContractorId,
    ) -> Result<Vec<Project>, InfraError> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT p.id, p.code, p.name, p.file_size_usage
            FROM project p
            INNER JOIN contractor_project cp ON cp.project_id = p.id
            WHERE cp.contractor_id = $1
            ORDER BY p.id
            "#,
        )
        .bind(contractor_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(into_project).collect())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(project_id = %id, size_delta))]
    async fn update_usage(&self, id: ProjectId, size_delta: i64) -> Result<(), InfraError> {
        sqlx::query(
            r#"
            UPDATE project
            SET file_size_usage = GREATEST(file_size_usage + $2, 0),
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .bind(size_delta)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(project_id = %id))]
    async fn cleanup_associations(&self, id: ProjectId) -> Result<u64, InfraError> {
        let mut tx = self.pool.begin().await?;
        let mut deleted = 0;

        for table in ASSOCIATION_TABLES {
            let result = sqlx::query(&format!("DELETE FROM {table} WHERE project_id = $1"))
                .bind(id.as_i64())
                .execute(&mut *tx)
                .await?;
            deleted += result.rows_affected();
        }

        tx.commit().await?;

        Ok(deleted)
    }

    #[tracing::instrument(skip_all, level = "debug", fields(project_id = %id))]
    async fn hard_delete(&self, id: ProjectId) -> Result<(), InfraError> {
        sqlx::query("DELETE FROM project WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%contractor_id))]
    async fn hard_delete_by_contractor_id(
        &self,
        contractor_id: ContractorId,
    ) -> Result<u64, InfraError> {
        let mut tx = self.pool.begin().await?;

        // 関連行を消すと対象プロジェクトを特定できなくなるため、先に ID を確定させる
        let project_ids: Vec<i64> = sqlx::query_scalar(
            "SELECT project_id FROM contractor_project WHERE contractor_id = $1",
        )
        .bind(contractor_id.as_i64())
        .fetch_all(&mut *tx)
        .await?;

        if project_ids.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }

        for table in ASSOCIATION_TABLES {
            sqlx::query(&format!("DELETE FROM {table} WHERE project_id = ANY($1)"))
                .bind(&project_ids)
                .execute(&mut *tx)
                .await?;
        }

        let projects = sqlx::query("DELETE FROM project WHERE id = ANY($1)")
            .bind(&project_ids)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(projects.rows_affected())
    }
}
