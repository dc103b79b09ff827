//! # ユースケース層
//!
//! 削除スコープの解決と、オブジェクト・DB 行の削除カスケードを実装する。
//!
//! ## 設計方針
//!
//! - **依存性注入**: リポジトリを `Arc<dyn Trait>` で外部から注入
//! - **結果で返す**: 削除の失敗は `Err` ではなく
//!   [`DeletionOutcome`](cleansing_domain::outcome::DeletionOutcome) に記録する
//!
//! ## モジュール構成
//!
//! - `resolver`: 階層を辿って削除対象のオブジェクトを列挙する
//! - `cleansing`: スコープ単位の削除カスケード

pub mod cleansing;
pub mod resolver;

use std::sync::Arc;

pub use cleansing::CleansingUseCaseImpl;
use cleansing_infra::repository::{
    ContractorRepository,
    DocumentGroupRepository,
    DocumentRepository,
    FileRepository,
    PostgresContractorRepository,
    PostgresDocumentGroupRepository,
    PostgresDocumentRepository,
    PostgresFileRepository,
    PostgresProjectRepository,
    PostgresSiteRepository,
    ProjectRepository,
    SiteRepository,
};
pub use resolver::{HierarchyResolver, ResolvedProject, ResolvedScope};
use sqlx::PgPool;

/// 包含階層のリポジトリ一式
#[derive(Clone)]
pub struct HierarchyRepositories {
    pub contractor: Arc<dyn ContractorRepository>,
    pub project:    Arc<dyn ProjectRepository>,
    pub site:       Arc<dyn SiteRepository>,
    pub group:      Arc<dyn DocumentGroupRepository>,
    pub document:   Arc<dyn DocumentRepository>,
    pub file:       Arc<dyn FileRepository>,
}

impl HierarchyRepositories {
    /// PostgreSQL 実装で組み立てる
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            contractor: Arc::new(PostgresContractorRepository::new(pool.clone())),
            project:    Arc::new(PostgresProjectRepository::new(pool.clone())),
            site:       Arc::new(PostgresSiteRepository::new(pool.clone())),
            group:      Arc::new(PostgresDocumentGroupRepository::new(pool.clone())),
            document:   Arc::new(PostgresDocumentRepository::new(pool.clone())),
            file:       Arc::new(PostgresFileRepository::new(pool)),
        }
    }
}
