//! # ContractorRepository
//!
//! 契約者の読み出しと削除を担当するリポジトリ。
//!
//! 契約者行を削除する前に、契約者を参照するメンバー行（`user_contractor`,
//! `viewer_contractor`）を削除する必要がある。

use async_trait::async_trait;
use cleansing_domain::hierarchy::{Contractor, ContractorId, ProjectId};
use sqlx::PgPool;

use crate::error::InfraError;

/// 契約者リポジトリトレイト
#[async_trait]
pub trait ContractorRepository: Send + Sync {
    /// ID で契約者を検索する
    async fn find_by_id(&self, id: ContractorId) -> Result<Option<Contractor>, InfraError>;

    /// プロジェクトを所有する契約者を `contractor_project` 経由で検索する
    async fn find_by_project_id(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<Contractor>, InfraError>;

    /// 契約者に紐づくメンバー行を削除する
    async fn hard_delete_members(&self, id: ContractorId) -> Result<u64, InfraError>;

    /// 契約者行を削除する
    async fn delete(&self, id: ContractorId) -> Result<(), InfraError>;
}

type ContractorRow = (i64, String, Option<String>, Option<String>);

fn into_contractor((id, name, bucket_name, bucket_region): ContractorRow) -> Contractor {
    Contractor::new(ContractorId::new(id), name, bucket_name, bucket_region)
}

/// PostgreSQL 実装の ContractorRepository
#[derive(Debug, Clone)]
pub struct PostgresContractorRepository {
    pool: PgPool,
}

impl PostgresContractorRepository {
    /// 新しいリポジトリインスタンスを作成
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ContractorRepository for PostgresContractorRepository {
    #[tracing::instrument(skip_all, level = "debug", fields(contractor_id = %id))]
    async fn find_by_id(&self, id: ContractorId) -> Result<Option<Contractor>, InfraError> {
        let row = sqlx::query_as::<_, ContractorRow>(
            r#"
            SELECT id, name, aws_bucket_name, aws_bucket_region
            FROM contractor
            WHERE id = $1
            "#,
        )
        .bind(id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_contractor))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(%project_id))]
    async fn find_by_project_id(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<Contractor>, InfraError> {
        let row = sqlx::query_as::<_, ContractorRow>(
            r#"
            SELECT c.id, c.name, c.aws_bucket_name, c.aws_bucket_region
            FROM contractor c
            INNER JOIN contractor_project cp ON cp.contractor_id = c.id
            WHERE cp.project_id = $1
            ORDER BY cp.id
            LIMIT 1
            "#,
        )
        .bind(project_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(into_contractor))
    }

    #[tracing::instrument(skip_all, level = "debug", fields(contractor_id = %id))]
    async fn hard_delete_members(&self, id: ContractorId) -> Result<u64, InfraError> {
        let mut tx = self.pool.begin().await?;

        let users = sqlx::query("DELETE FROM user_contractor WHERE contractor_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;

        let viewers = sqlx::query("DELETE FROM viewer_contractor WHERE contractor_id = $1")
            .bind(id.as_i64())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(users.rows_affected() + viewers.rows_affected())
    }

    #[tracing::instrument(skip_all, level = "debug", fields(contractor_id = %id))]
    async fn delete(&self, id: ContractorId) -> Result<(), InfraError> {
        sqlx::query("DELETE FROM contractor WHERE id = $1")
            .bind(id.as_i64())
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
