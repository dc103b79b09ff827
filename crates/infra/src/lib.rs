//! # クレンジングワーカー インフラ層
//!
//! 外部システムとの接続・通信を担当するインフラストラクチャ層。
//!
//! ## 責務
//!
//! - **データベース接続**: PostgreSQL への接続プール管理
//! - **リポジトリ実装**: 包含階層の読み取りとカスケード削除
//! - **オブジェクトストレージ**: S3 バックエンドと削除エンジン
//! - **メッセージキュー**: Redis リストからの削除リクエストの受信
//!
//! ## 依存関係
//!
//! ```text
//! cleansing-worker → infra → domain
//! ```
//!
//! ドメイン層はインフラ層に依存しない。
//!
//! ## モジュール構成
//!
//! - [`db`] - PostgreSQL データベース接続管理
//! - [`error`] - インフラ層エラー定義
//! - [`queue`] - Redis メッセージキュー
//! - [`repository`] - リポジトリ実装
//! - [`s3`] - AWS S3 バックエンド
//! - [`storage`] - 削除エンジンとその構成要素
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use cleansing_infra::{db, queue::RedisMessageQueue};
//!
//! async fn setup() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = db::create_pool("postgres://localhost/wadugs", 5).await?;
//!     let queue = RedisMessageQueue::new("redis://localhost", "data-cleansing").await?;
//!     Ok(())
//! }
//! ```

pub mod db;
pub mod error;
#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod queue;
pub mod repository;
pub mod s3;
pub mod storage;

pub use error::InfraError;
