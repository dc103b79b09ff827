//! # 削除カスケードユースケース
//!
//! 1 つの削除リクエストを次の順で処理する。各段階の結果は
//! [`DeletionOutcome`] に記録し、最後に一度だけ返す。
//!
//! 1. 種別と ID を検証する（不正なら副作用なしで終了）
//! 2. 階層を辿って削除対象のオブジェクトを列挙する
//! 3. 削除エンジンでオブジェクトを削除し、確認できた件数を記録する
//! 4. プロジェクト・サイトの場合、プロジェクトの使用量を削除したサイズ分だけ減らす
//! 5. DB の行を葉から根の順に削除する
//!
//! ## 失敗の扱い
//!
//! | 段階 | 失敗時 |
//! |------|--------|
//! | 検証 | 終了（再試行しない） |
//! | 解決（スコープ自身） | 終了 |
//! | オブジェクト削除 | 終了（使用量と行は残す） |
//! | 使用量の更新 | ログのみ |
//! | 子孫の行の削除 | ログのみ |
//! | スコープ自身の行の削除 | 終了 |
//!
//! オブジェクト削除に失敗した場合に行を残すのは、再配信されたリクエストが
//! 同じ行からキーを導出し直せるようにするため。

use std::sync::Arc;

use cleansing_domain::{
    DomainError,
    hierarchy::{ContractorId, ProjectId, SiteId},
    outcome::{DeletionOutcome, FailureKind},
    scope::{CleansingMessage, ScopeRequest, ScopeType},
    storage_key::StorageLocation,
};
use cleansing_infra::storage::DeletionEngine;
use tokio_util::sync::CancellationToken;

use super::{HierarchyRepositories, HierarchyResolver, ResolvedProject, ResolvedScope};

/// 削除カスケードユースケース
pub struct CleansingUseCaseImpl {
    repos:    HierarchyRepositories,
    resolver: HierarchyResolver,
    engine:   Arc<DeletionEngine>,
}

impl CleansingUseCaseImpl {
    /// ユースケースを作成する
    ///
    /// `default_bucket` は契約者がバケットを持たない場合の格納先。
    /// 既定リージョンは削除エンジンから引き継ぐ。
    pub fn new(
        repos: HierarchyRepositories,
        engine: Arc<DeletionEngine>,
        default_bucket: impl Into<String>,
    ) -> Self {
        let default_location = StorageLocation::new(engine.default_region(), default_bucket);
        Self {
            resolver: HierarchyResolver::new(repos.clone(), default_location),
            repos,
            engine,
        }
    }

    /// キューから受け取ったメッセージを処理する
    #[tracing::instrument(skip_all, fields(scope_type = %message.scope_type, scope_id = message.id))]
    pub async fn process(
        &self,
        message: &CleansingMessage,
        cancel: &CancellationToken,
    ) -> DeletionOutcome {
        tracing::info!("削除メッセージを処理します");

        let request = match validate(message) {
            Ok(request) => request,
            Err(error) => {
                tracing::warn!(%error, "削除メッセージが不正です");
                let mut outcome = DeletionOutcome::for_message(message);
                outcome.fail(FailureKind::Validation, error);
                return outcome;
            }
        };

        let id = request.scope_id();
        match request.scope_type() {
            ScopeType::Contractor => self.delete_contractor(ContractorId::new(id), cancel).await,
            ScopeType::Project => self.delete_project(ProjectId::new(id), cancel).await,
            ScopeType::Site => self.delete_site(SiteId::new(id), cancel).await,
        }
    }

    /// 契約者と、その配下のすべてのプロジェクト・サイトを削除する
    ///
    /// 使用量はプロジェクト単位で、プロジェクトの行ごと削除されるため更新しない。
    pub async fn delete_contractor(
        &self,
        contractor_id: ContractorId,
        cancel: &CancellationToken,
    ) -> DeletionOutcome {
        let scope_type = ScopeType::Contractor;
        let mut outcome = DeletionOutcome::started(scope_type, contractor_id.as_i64());
        tracing::info!(%contractor_id, "契約者のファイル削除を開始します");

        let resolved = match self.resolver.resolve_contractor(contractor_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                outcome.fail(
                    FailureKind::Resolution,
                    format!("failed to list {scope_type} files: {e}"),
                );
                return outcome;
            }
        };

        if self
            .delete_objects(scope_type, &resolved, cancel, &mut outcome)
            .await
            .is_none()
        {
            return outcome;
        }
        if !ensure_not_cancelled(cancel, scope_type, &mut outcome) {
            return outcome;
        }

        for project in &resolved.projects {
            self.cascade_project_children(project).await;
        }
        tolerate(
            "契約者のプロジェクト",
            self.repos
                .project
                .hard_delete_by_contractor_id(contractor_id)
                .await,
        );
        tolerate(
            "契約者のメンバー",
            self.repos.contractor.hard_delete_members(contractor_id).await,
        );

        if let Err(e) = self.repos.contractor.delete(contractor_id).await {
            outcome.fail(
                FailureKind::Cascade,
                format!("failed to delete contractor record: {e}"),
            );
            return outcome;
        }

        finish(outcome)
    }

    /// プロジェクトと、その配下のすべてのサイトを削除する
    pub async fn delete_project(
        &self,
        project_id: ProjectId,
        cancel: &CancellationToken,
    ) -> DeletionOutcome {
        let scope_type = ScopeType::Project;
        let mut outcome = DeletionOutcome::started(scope_type, project_id.as_i64());
        tracing::info!(%project_id, "プロジェクトのファイル削除を開始します");

        let resolved = match self.resolver.resolve_project(project_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                outcome.fail(
                    FailureKind::Resolution,
                    format!("failed to list {scope_type} files: {e}"),
                );
                return outcome;
            }
        };

        let Some(deleted_bytes) = self
            .delete_objects(scope_type, &resolved, cancel, &mut outcome)
            .await
        else {
            return outcome;
        };
        self.update_usage(project_id, deleted_bytes).await;
        if !ensure_not_cancelled(cancel, scope_type, &mut outcome) {
            return outcome;
        }

        for project in &resolved.projects {
            self.cascade_project_children(project).await;
        }
        tolerate(
            "プロジェクトの関連",
            self.repos.project.cleanup_associations(project_id).await,
        );

        if let Err(e) = self.repos.project.hard_delete(project_id).await {
            outcome.fail(
                FailureKind::Cascade,
                format!("failed to delete project record: {e}"),
            );
            return outcome;
        }

        finish(outcome)
    }

    /// 単一のサイトを削除する
    pub async fn delete_site(&self, site_id: SiteId, cancel: &CancellationToken) -> DeletionOutcome {
        let scope_type = ScopeType::Site;
        let mut outcome = DeletionOutcome::started(scope_type, site_id.as_i64());
        tracing::info!(%site_id, "サイトのファイル削除を開始します");

        let resolved = match self.resolver.resolve_site(site_id).await {
            Ok(resolved) => resolved,
            Err(e) => {
                outcome.fail(
                    FailureKind::Resolution,
                    format!("failed to list {scope_type} files: {e}"),
                );
                return outcome;
            }
        };

        let Some(deleted_bytes) = self
            .delete_objects(scope_type, &resolved, cancel, &mut outcome)
            .await
        else {
            return outcome;
        };
        for project in &resolved.projects {
            self.update_usage(project.project.id(), deleted_bytes).await;
        }
        if !ensure_not_cancelled(cancel, scope_type, &mut outcome) {
            return outcome;
        }

        self.cascade_site_children(site_id).await;

        if let Err(e) = self.repos.site.hard_delete(site_id).await {
            outcome.fail(
                FailureKind::Cascade,
                format!("failed to delete site record: {e}"),
            );
            return outcome;
        }

        finish(outcome)
    }

    /// オブジェクトを削除し、削除を確認できたサイズ合計を返す
    ///
    /// 失敗した場合は結果に記録して `None` を返す。
    async fn delete_objects(
        &self,
        scope_type: ScopeType,
        resolved: &ResolvedScope,
        cancel: &CancellationToken,
        outcome: &mut DeletionOutcome,
    ) -> Option<i64> {
        tracing::info!(
            file_count = resolved.objects.len(),
            "削除対象のファイルを取得しました"
        );

        let mut report = self.engine.delete_objects(&resolved.objects, cancel).await;
        outcome.record_files_deleted(report.deleted_count);

        if let Some(err) = report.error.take() {
            let kind = if err.is_cancelled() {
                FailureKind::Cancelled
            } else {
                FailureKind::ObjectDeletion
            };
            tracing::error!(
                files_deleted = report.deleted_count,
                error = %err,
                "ファイルの削除に失敗しました"
            );
            outcome.fail(kind, format!("failed to delete {scope_type} files: {err}"));
            return None;
        }

        if report.failed_keys > 0 {
            tracing::warn!(
                failed_keys = report.failed_keys,
                "一部のファイルはストレージ側で削除できませんでした"
            );
        }
        Some(report.deleted_bytes)
    }

    /// プロジェクトの使用量を減らす（失敗してもログのみ）
    async fn update_usage(&self, project_id: ProjectId, deleted_bytes: i64) {
        if deleted_bytes == 0 {
            tracing::debug!(%project_id, "削除したサイズが 0 のため使用量は更新しません");
            return;
        }
        match self.repos.project.update_usage(project_id, -deleted_bytes).await {
            Ok(()) => tracing::info!(%project_id, deleted_bytes, "プロジェクトの使用量を更新しました"),
            Err(e) => tracing::warn!(
                %project_id,
                deleted_bytes,
                error = %e,
                "プロジェクトの使用量を更新できませんでした"
            ),
        }
    }

    /// プロジェクト配下のサイトと、その子孫の行を削除する
    async fn cascade_project_children(&self, resolved: &ResolvedProject) {
        for site in &resolved.sites {
            self.cascade_site_children(site.id()).await;
        }
        let project_id = resolved.project.id();
        tolerate(
            "プロジェクトのサイト",
            self.repos.site.hard_delete_by_project_id(project_id).await,
        );
    }

    /// サイト配下の行をファイル・ドキュメント・グループの順に削除する
    async fn cascade_site_children(&self, site_id: SiteId) {
        tracing::debug!(%site_id, "サイト配下の行を削除します");
        tolerate(
            "サイトのファイル",
            self.repos.file.hard_delete_by_site_id(site_id).await,
        );
        tolerate(
            "サイトのドキュメント",
            self.repos.document.hard_delete_by_site_id(site_id).await,
        );
        tolerate(
            "サイトのグループ",
            self.repos.group.hard_delete_by_site_id(site_id).await,
        );
    }
}

/// 子孫の行の削除結果をログに残す
fn tolerate<T: std::fmt::Debug, E: std::fmt::Display>(target: &str, result: Result<T, E>) {
    match result {
        Ok(deleted) => tracing::debug!(target_rows = target, ?deleted, "行を削除しました"),
        Err(e) => tracing::warn!(
            target_rows = target,
            error = %e,
            "行を削除できませんでした。処理を続けます"
        ),
    }
}

fn finish(mut outcome: DeletionOutcome) -> DeletionOutcome {
    outcome.succeed();
    tracing::info!(
        files_deleted = outcome.files_deleted(),
        "スコープの削除が完了しました"
    );
    outcome
}

/// 種別と ID を検証する
///
/// 結果レコードにはバリデーションエラーの接頭辞を付けずに理由だけを残す。
fn validate(message: &CleansingMessage) -> Result<ScopeRequest, String> {
    ScopeRequest::try_from(message).map_err(|e| match e {
        DomainError::Validation(reason) => reason,
        other => other.to_string(),
    })
}

/// 行の削除に入る前に中断されていないか確認する
fn ensure_not_cancelled(
    cancel: &CancellationToken,
    scope_type: ScopeType,
    outcome: &mut DeletionOutcome,
) -> bool {
    if cancel.is_cancelled() {
        outcome.fail(
            FailureKind::Cancelled,
            format!("{scope_type} deletion cancelled before removing records"),
        );
        return false;
    }
    true
}
