//! # ドメイン層エラー定義
//!
//! 削除リクエストの検証失敗やドメイン固有の例外状態を表現するエラー型。
//!
//! ## 設計方針
//!
//! - **型による分類**: エラーの種類を列挙型で明示し、パターンマッチで処理可能に
//! - **thiserror 活用**: `#[error(...)]` マクロでエラーメッセージを自動生成
//! - **再試行可否の判定**: `Validation` は再試行しても結果が変わらないため、
//!   キュー側で再配信せずに破棄する
//!
//! ## 使用例
//!
//! ```rust
//! use cleansing_domain::DomainError;
//!
//! fn validate_id(id: i64) -> Result<(), DomainError> {
//!     if id <= 0 {
//!         return Err(DomainError::Validation(format!("不正な ID: {id}")));
//!     }
//!     Ok(())
//! }
//! ```

use thiserror::Error;

/// ドメイン層で発生するエラー
#[derive(Debug, Error)]
pub enum DomainError {
    /// バリデーションエラー
    ///
    /// 削除リクエストの種別や ID が不正な場合に使用する。
    #[error("バリデーションエラー: {0}")]
    Validation(String),

    /// エンティティが見つからない
    ///
    /// `entity_type` にはエンティティの種類（"Project", "Site" など）を指定する。
    #[error("{entity_type} が見つかりません: {id}")]
    NotFound {
        /// エンティティの種類
        entity_type: &'static str,
        /// 検索に使用した識別子
        id:          String,
    },
}
