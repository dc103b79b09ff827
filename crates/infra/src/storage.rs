//! # オブジェクトストレージ削除基盤
//!
//! オブジェクトストレージ上のキーを一括削除するための基盤モジュール。
//!
//! ## 構成
//!
//! - [`ObjectStorageBackend`]: ストレージサービスへの 1 回の API 呼び出しを抽象化する
//! - [`RegionClientCache`]: リージョンごとのバックエンドを遅延生成してキャッシュする
//! - [`StorageRateLimiter`]: すべてのバッチ呼び出しで共有するトークンバケット
//! - [`RetryPolicy`]: 一時的エラーに対する指数バックオフ
//! - [`DeletionEngine`]: 上記を組み合わせ、(リージョン, バケット) ごとに分割したバッチを
//!   並行度上限のもとで実行する
//!
//! バッチサイズはストレージサービスの上限である [`MAX_BATCH_SIZE`] で固定。

mod client_cache;
mod engine;
mod rate_limiter;
mod retry;

use std::sync::Arc;

use async_trait::async_trait;
pub use client_cache::{BackendFactory, RegionClientCache};
pub use engine::{DeletionEngine, DeletionEngineConfig, DeletionReport};
pub use rate_limiter::StorageRateLimiter;
pub use retry::RetryPolicy;

use crate::error::InfraError;

/// 1 回のバッチ削除・一覧取得で扱えるオブジェクト数の上限
pub const MAX_BATCH_SIZE: usize = 1000;

/// 一覧取得の 1 ページ
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    /// このページに含まれるキー
    pub keys: Vec<String>,
    /// 次ページの継続トークン（最終ページでは `None`）
    pub next_continuation_token: Option<String>,
}

/// キー単位の削除失敗
///
/// バッチ呼び出し自体は成功したが、個別のキーが削除できなかったことを表す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDeletionError {
    pub key:     String,
    pub code:    Option<String>,
    pub message: Option<String>,
}

/// バッチ削除の結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteOutput {
    /// ストレージが削除を確認したキー
    pub deleted: Vec<String>,
    /// 削除に失敗したキー
    pub errors:  Vec<KeyDeletionError>,
}

/// オブジェクトストレージのバックエンド
///
/// 1 つのリージョンに接続されたクライアントを表す。
/// 各メソッドはストレージサービスへの 1 回の呼び出しに対応し、
/// レート制限や再試行は行わない（[`DeletionEngine`] の責務）。
///
/// 返すエラーは [`InfraError::is_transient`] で再試行可否を判定できること。
#[async_trait]
pub trait ObjectStorageBackend: Send + Sync {
    /// バケット内のオブジェクトを 1 ページ分列挙する
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        max_keys: usize,
    ) -> Result<ObjectPage, InfraError>;

    /// 最大 [`MAX_BATCH_SIZE`] 件のオブジェクトを 1 回の呼び出しで削除する
    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutput, InfraError>;

    /// 空のバケットを削除する
    async fn delete_bucket(&self, bucket: &str) -> Result<(), InfraError>;

    /// バケット名の一覧を取得する（起動時の疎通確認用）
    async fn list_buckets(&self) -> Result<Vec<String>, InfraError>;
}

/// 何も削除しないバックエンド
///
/// `STORAGE_BACKEND=null` で選択する検証用のバックエンド。
/// 渡されたキーをすべて削除済みとして返すため、DB の行だけが削除される。
#[derive(Debug, Clone, Default)]
pub struct NullObjectStorage;

#[async_trait]
impl ObjectStorageBackend for NullObjectStorage {
    async fn list_objects(
        &self,
        bucket: &str,
        _prefix: Option<&str>,
        _continuation_token: Option<String>,
        _max_keys: usize,
    ) -> Result<ObjectPage, InfraError> {
        tracing::warn!(bucket, "NullObjectStorage: オブジェクト一覧は常に空");
        Ok(ObjectPage::default())
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutput, InfraError> {
        tracing::warn!(
            bucket,
            key_count = keys.len(),
            "NullObjectStorage: オブジェクトは削除されません"
        );
        Ok(BatchDeleteOutput {
            deleted: keys.to_vec(),
            errors:  Vec::new(),
        })
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), InfraError> {
        tracing::warn!(bucket, "NullObjectStorage: バケットは削除されません");
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>, InfraError> {
        Ok(Vec::new())
    }
}

/// どのリージョンに対しても [`NullObjectStorage`] を返す
#[async_trait]
impl BackendFactory for NullObjectStorage {
    async fn create(&self, region: &str) -> Result<Arc<dyn ObjectStorageBackend>, InfraError> {
        tracing::warn!(region, "NullObjectStorage: リージョン別クライアントも削除を行いません");
        Ok(Arc::new(Self))
    }
}
