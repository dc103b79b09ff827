//! # リポジトリ実装
//!
//! 包含階層（Contractor → Project → Site → DocumentGroup → Document → File）の
//! 読み出しと、削除カスケードが必要とする更新操作を提供する。
//!
//! スキーマは FK に ON DELETE CASCADE を持たない。呼び出し側は葉から根の順
//! （File → Document → DocumentGroup → Site → Project → Contractor）で削除する。

pub mod contractor_repository;
pub mod document_group_repository;
pub mod document_repository;
pub mod file_repository;
pub mod project_repository;
pub mod site_repository;

pub use contractor_repository::{ContractorRepository, PostgresContractorRepository};
pub use document_group_repository::{DocumentGroupRepository, PostgresDocumentGroupRepository};
pub use document_repository::{DocumentRepository, PostgresDocumentRepository};
pub use file_repository::{FileRepository, PostgresFileRepository};
pub use project_repository::{PostgresProjectRepository, ProjectRepository};
pub use site_repository::{PostgresSiteRepository, SiteRepository};
