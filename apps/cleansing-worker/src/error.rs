//! # ワーカーのエラー定義
//!
//! 削除の失敗そのものは [`DeletionOutcome`](cleansing_domain::outcome::DeletionOutcome)
//! に記録して返すため、ここで扱うのはメッセージの解釈や階層の解決、
//! キュー操作で発生するエラーに限られる。

use cleansing_domain::DomainError;
use cleansing_infra::InfraError;
use thiserror::Error;

/// ワーカーで発生するエラー
#[derive(Debug, Error)]
pub enum WorkerError {
    /// メッセージ本文を JSON として解釈できない
    #[error("メッセージのデコードに失敗しました: {0}")]
    Decode(#[from] serde_json::Error),

    /// 削除対象が存在しないなど、ドメイン上の不整合
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// DB・ストレージ・キューとの通信エラー
    #[error(transparent)]
    Infra(#[from] InfraError),
}

/// 設定の読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// 必須の環境変数が未設定
    #[error("{0} が設定されていません")]
    Missing(&'static str),

    /// 値を解釈できない
    #[error("{var} の値が不正です: {value:?}")]
    Invalid { var: &'static str, value: String },
}
