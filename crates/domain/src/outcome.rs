//! # 削除結果
//!
//! 1 つのスコープ削除の結果を表す。
//!
//! [`DeletionOutcome`] は削除開始時に空で作られ、各段階の完了に合わせて更新され、
//! 最後に一度だけ返される。永続化はせず、内部で再試行もしない。
//!
//! `success = false` かつ `files_deleted > 0` は部分的な削除を表す。
//! 確認済みの削除件数は失敗時でも破棄しない。

use serde::{Deserialize, Serialize};

use crate::scope::{CleansingMessage, ScopeType};

/// 失敗の分類
///
/// キュー側はこの分類だけを見て再配信するかを決める。
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// 不正な種別・ID（再試行しても結果は変わらない）
    Validation,
    /// 削除対象のスコープ自体を読み出せない
    Resolution,
    /// オブジェクトストレージからの削除に失敗
    ObjectDeletion,
    /// スコープ自身の行の削除に失敗
    Cascade,
    /// タイムアウトまたはシャットダウンによる中断
    Cancelled,
}

impl FailureKind {
    /// 再配信すべき失敗かどうか
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Validation)
    }
}

/// スコープ削除の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeletionOutcome {
    scope_type:    String,
    scope_id:      i64,
    success:       bool,
    files_deleted: u64,
    error:         Option<String>,
    failure:       Option<FailureKind>,
}

impl DeletionOutcome {
    /// 削除開始時の空の結果を作る
    pub fn started(scope_type: ScopeType, scope_id: i64) -> Self {
        Self::for_raw(scope_type.as_ref(), scope_id)
    }

    /// 検証前のメッセージに対する結果を作る（種別が不正な場合に使う）
    pub fn for_message(message: &CleansingMessage) -> Self {
        Self::for_raw(&message.scope_type, message.id)
    }

    fn for_raw(scope_type: &str, scope_id: i64) -> Self {
        Self {
            scope_type: scope_type.to_string(),
            scope_id,
            success: false,
            files_deleted: 0,
            error: None,
            failure: None,
        }
    }

    /// ストレージエンジンが確認した削除件数を記録する
    pub fn record_files_deleted(&mut self, count: u64) {
        self.files_deleted = count;
    }

    /// 失敗として確定する
    pub fn fail(&mut self, kind: FailureKind, error: impl Into<String>) {
        self.success = false;
        self.failure = Some(kind);
        self.error = Some(error.into());
    }

    /// 成功として確定する
    ///
    /// 既に失敗が記録されている場合は何もしない。
    pub fn succeed(&mut self) {
        if self.failure.is_none() {
            self.success = true;
        }
    }

    pub fn scope_type(&self) -> &str {
        &self.scope_type
    }

    pub fn scope_id(&self) -> i64 {
        self.scope_id
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn files_deleted(&self) -> u64 {
        self.files_deleted
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    /// 一部のオブジェクトだけが削除された状態か
    pub fn is_partial(&self) -> bool {
        !self.success && self.files_deleted > 0
    }

    /// 再配信すべき結果か
    pub fn is_retryable(&self) -> bool {
        self.failure.is_some_and(FailureKind::is_retryable)
    }

    /// ログ・テレメトリ向けの結果レコードに変換する
    pub fn to_result(&self) -> CleansingResult {
        let message = self
            .scope_type
            .parse::<ScopeType>()
            .map_or(crate::scope::UNKNOWN_SCOPE_DESCRIPTION, ScopeType::description);

        CleansingResult {
            scope_type:    self.scope_type.clone(),
            id:            self.scope_id,
            success:       self.success,
            message:       message.to_string(),
            files_deleted: self.files_deleted,
            error:         self.error.clone(),
        }
    }
}

/// 結果レコード
///
/// ```json
/// { "type": "site", "id": 42, "success": true, "message": "...", "files_deleted": 2 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleansingResult {
    #[serde(rename = "type")]
    pub scope_type:    String,
    pub id:            i64,
    pub success:       bool,
    pub message:       String,
    pub files_deleted: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error:         Option<String>,
}
