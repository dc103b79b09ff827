//! # テスト用モック
//!
//! ユースケーステストで使用するインメモリ実装。
//! `test-utils` feature を有効にすることで、他クレートからも利用可能。
//!
//! ```toml
//! [dev-dependencies]
//! cleansing-infra = { workspace = true, features = ["test-utils"] }
//! ```
//!
//! - [`MockHierarchyStore`]: 全リポジトリトレイトを実装するインメモリの階層。
//!   すべての呼び出しを順に記録し、任意の操作を失敗させられる
//! - [`MockObjectStorage`]: バケットをインメモリで保持するストレージバックエンド。
//!   呼び出しを記録し、一時的・恒久的・キー単位の失敗を注入できる
//! - [`MockMessageQueue`]: 再投入とデッドレターを記録するキュー

use std::{
    collections::{BTreeMap, BTreeSet, HashSet, VecDeque},
    sync::{
        Arc,
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use cleansing_domain::hierarchy::{
    Contractor,
    ContractorId,
    Document,
    DocumentGroup,
    DocumentGroupId,
    DocumentId,
    File,
    Project,
    ProjectId,
    Site,
    SiteId,
};

use crate::{
    error::InfraError,
    repository::{
        ContractorRepository,
        DocumentGroupRepository,
        DocumentRepository,
        FileRepository,
        ProjectRepository,
        SiteRepository,
    },
    queue::{Delivery, MessageQueue},
    storage::{BatchDeleteOutput, KeyDeletionError, ObjectPage, ObjectStorageBackend},
};

// =========================================================================
// MockHierarchyStore
// =========================================================================

/// リポジトリ操作の種別
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepoOperation {
    FindContractor,
    FindContractorByProject,
    DeleteContractorMembers,
    DeleteContractor,
    FindProject,
    FindProjectsByContractor,
    UpdateProjectUsage,
    CleanupProjectAssociations,
    DeleteProject,
    DeleteProjectsByContractor,
    FindSite,
    FindSitesByProject,
    DeleteSite,
    DeleteSitesByProject,
    FindGroupsBySite,
    DeleteGroupsBySite,
    FindDocumentsByGroup,
    DeleteDocumentsBySite,
    FindFilesByDocument,
    DeleteFilesBySite,
}

impl RepoOperation {
    /// 更新系の操作か
    pub fn is_mutation(self) -> bool {
        !matches!(
            self,
            Self::FindContractor
                | Self::FindContractorByProject
                | Self::FindProject
                | Self::FindProjectsByContractor
                | Self::FindSite
                | Self::FindSitesByProject
                | Self::FindGroupsBySite
                | Self::FindDocumentsByGroup
                | Self::FindFilesByDocument
        )
    }
}

/// 記録されたリポジトリ呼び出し
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoCall {
    pub operation: RepoOperation,
    /// 引数に渡された ID
    pub id:        i64,
}

#[derive(Default)]
struct HierarchyState {
    contractors:        Vec<Contractor>,
    contractor_members: Vec<ContractorId>,
    projects:           Vec<Project>,
    contractor_project: Vec<(ContractorId, ProjectId)>,
    sites:              Vec<Site>,
    groups:             Vec<DocumentGroup>,
    documents:          Vec<Document>,
    files:              Vec<File>,
    calls:              Vec<RepoCall>,
    failures:           HashSet<(RepoOperation, Option<i64>)>,
}

impl HierarchyState {
    fn group_ids_of_site(&self, site_id: SiteId) -> HashSet<DocumentGroupId> {
        self.groups
            .iter()
            .filter(|g| g.site_id() == site_id)
            .map(DocumentGroup::id)
            .collect()
    }

    fn document_ids_of_site(&self, site_id: SiteId) -> HashSet<DocumentId> {
        let groups = self.group_ids_of_site(site_id);
        self.documents
            .iter()
            .filter(|d| groups.contains(&d.group_id()))
            .map(Document::id)
            .collect()
    }
}

/// インメモリの包含階層
///
/// 6 つのリポジトリトレイトをすべて実装する。クローンは同じ状態を共有する。
#[derive(Clone, Default)]
pub struct MockHierarchyStore {
    state: Arc<Mutex<HierarchyState>>,
}

impl MockHierarchyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_contractor(&self, contractor: Contractor) {
        self.state.lock().unwrap().contractors.push(contractor);
    }

    /// 契約者のメンバー行（`user_contractor` / `viewer_contractor`）を追加する
    pub fn add_contractor_member(&self, contractor_id: ContractorId) {
        self.state
            .lock()
            .unwrap()
            .contractor_members
            .push(contractor_id);
    }

    /// プロジェクトを追加し、`contractor` が指定されれば関連付ける
    pub fn add_project(&self, project: Project, contractor: Option<ContractorId>) {
        let mut state = self.state.lock().unwrap();
        if let Some(contractor_id) = contractor {
            state.contractor_project.push((contractor_id, project.id()));
        }
        state.projects.push(project);
    }

    pub fn add_site(&self, site: Site) {
        self.state.lock().unwrap().sites.push(site);
    }

    pub fn add_group(&self, group: DocumentGroup) {
        self.state.lock().unwrap().groups.push(group);
    }

    pub fn add_document(&self, document: Document) {
        self.state.lock().unwrap().documents.push(document);
    }

    pub fn add_file(&self, file: File) {
        self.state.lock().unwrap().files.push(file);
    }

    /// 指定した操作を常に失敗させる
    pub fn fail(&self, operation: RepoOperation) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((operation, None));
    }

    /// 指定した操作を、特定の ID に対してのみ失敗させる
    pub fn fail_for(&self, operation: RepoOperation, id: i64) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert((operation, Some(id)));
    }

    /// 記録されたすべての呼び出し
    pub fn calls(&self) -> Vec<RepoCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// 記録された更新系の呼び出し
    pub fn mutations(&self) -> Vec<RepoCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.operation.is_mutation())
            .collect()
    }

    /// 指定した操作が最初に記録された位置
    pub fn position_of(&self, operation: RepoOperation, id: i64) -> Option<usize> {
        self.calls()
            .iter()
            .position(|c| c.operation == operation && c.id == id)
    }

    pub fn project(&self, id: ProjectId) -> Option<Project> {
        self.state
            .lock()
            .unwrap()
            .projects
            .iter()
            .find(|p| p.id() == id)
            .cloned()
    }

    pub fn contractor_exists(&self, id: ContractorId) -> bool {
        self.state
            .lock()
            .unwrap()
            .contractors
            .iter()
            .any(|c| c.id() == id)
    }

    pub fn site_exists(&self, id: SiteId) -> bool {
        self.state
            .lock()
            .unwrap()
            .sites
            .iter()
            .any(|s| s.id() == id)
    }

    pub fn file_count(&self) -> usize {
        self.state.lock().unwrap().files.len()
    }

    pub fn document_count(&self) -> usize {
        self.state.lock().unwrap().documents.len()
    }

    pub fn group_count(&self) -> usize {
        self.state.lock().unwrap().groups.len()
    }

    /// 呼び出しを記録し、失敗が注入されていればエラーを返す
    fn record(&self, operation: RepoOperation, id: i64) -> Result<(), InfraError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(RepoCall { operation, id });
        if state.failures.contains(&(operation, None))
            || state.failures.contains(&(operation, Some(id)))
        {
            return Err(InfraError::unexpected(format!(
                "{operation:?}({id}) の失敗を注入"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ContractorRepository for MockHierarchyStore {
    async fn find_by_id(&self, id: ContractorId) -> Result<Option<Contractor>, InfraError> {
        self.record(RepoOperation::FindContractor, id.as_i64())?;
        let state = self.state.lock().unwrap();
        Ok(state.contractors.iter().find(|c| c.id() == id).cloned())
    }

    async fn find_by_project_id(
        &self,
        project_id: ProjectId,
    ) -> Result<Option<Contractor>, InfraError> {
        self.record(RepoOperation::FindContractorByProject, project_id.as_i64())?;
        let state = self.state.lock().unwrap();
        let contractor_id = state
            .contractor_project
            .iter()
            .find(|(_, p)| *p == project_id)
            .map(|(c, _)| *c);
        Ok(contractor_id.and_then(|id| state.contractors.iter().find(|c| c.id() == id).cloned()))
    }

    async fn hard_delete_members(&self, id: ContractorId) -> Result<u64, InfraError> {
        self.record(RepoOperation::DeleteContractorMembers, id.as_i64())?;
        let mut state = self.state.lock().unwrap();
        let before = state.contractor_members.len();
        state.contractor_members.retain(|c| *c != id);
        Ok((before - state.contractor_members.len()) as u64)
    }

    async fn delete(&self, id: ContractorId) -> Result<(), InfraError> {
        self.record(RepoOperation::DeleteContractor, id.as_i64())?;
        self.state
            .lock()
            .unwrap()
            .contractors
            .retain(|c| c.id() != id);
        Ok(())
    }
}

#[async_trait]
impl ProjectRepository for MockHierarchyStore {
    async fn find_by_id(&self, id: ProjectId) -> Result<Option<Project>, InfraError> {
        self.record(RepoOperation::FindProject, id.as_i64())?;
        Ok(self.project(id))
    }

    async fn find_by_contractor_id(
        &self,
        contractor_id: ContractorId,
    ) -> Result<Vec<Project>, InfraError> {
        self.record(RepoOperation::FindProjectsByContractor, contractor_id.as_i64())?;
        let state = self.state.lock().unwrap();
        let ids: Vec<ProjectId> = state
            .contractor_project
            .iter()
            .filter(|(c, _)| *c == contractor_id)
            .map(|(_, p)| *p)
            .collect();
        Ok(state
            .projects
            .iter()
            .filter(|p| ids.contains(&p.id()))
            .cloned()
            .collect())
    }

    async fn update_usage(&self, id: ProjectId, size_delta: i64) -> Result<(), InfraError> {
        self.record(RepoOperation::UpdateProjectUsage, id.as_i64())?;
        let mut state = self.state.lock().unwrap();
        if let Some(project) = state.projects.iter_mut().find(|p| p.id() == id) {
            let usage = (project.file_size_usage() + size_delta).max(0);
            *project = Project::new(id, project.code(), project.name(), usage);
        }
        Ok(())
    }

    async fn cleanup_associations(&self, id: ProjectId) -> Result<u64, InfraError> {
        self.record(RepoOperation::CleanupProjectAssociations, id.as_i64())?;
        let mut state = self.state.lock().unwrap();
        let before = state.contractor_project.len();
        state.contractor_project.retain(|(_, p)| *p != id);
        Ok((before - state.contractor_project.len()) as u64)
    }

    async fn hard_delete(&self, id: ProjectId) -> Result<(), InfraError> {
        self.record(RepoOperation::DeleteProject, id.as_i64())?;
        self.state.lock().unwrap().projects.retain(|p| p.id() != id);
        Ok(())
    }

    async fn hard_delete_by_contractor_id(
        &self,
        contractor_id: ContractorId,
    ) -> Result<u64, InfraError> {
        self.record(RepoOperation::DeleteProjectsByContractor, contractor_id.as_i64())?;
        let mut state = self.state.lock().unwrap();
        let ids: HashSet<ProjectId> = state
            .contractor_project
            .iter()
            .filter(|(c, _)| *c == contractor_id)
            .map(|(_, p)| *p)
            .collect();
        state.contractor_project.retain(|(_, p)| !ids.contains(p));
        let before = state.projects.len();
        state.projects.retain(|p| !ids.contains(&p.id()));
        Ok((before - state.projects.len()) as u64)
    }
}

#[async_trait]
impl SiteRepository for MockHierarchyStore {
    async fn find_by_id(&self, id: SiteId) -> Result<Option<Site>, InfraError> {
        self.record(RepoOperation::FindSite, id.as_i64())?;
        let state = self.state.lock().unwrap();
        Ok(state.sites.iter().find(|s| s.id() == id).cloned())
    }

    async fn find_by_project_id(&self, project_id: ProjectId) -> Result<Vec<Site>, InfraError> {
        self.record(RepoOperation::FindSitesByProject, project_id.as_i64())?;
        let state = self.state.lock().unwrap();
        Ok(state
            .sites
            .iter()
            .filter(|s| s.project_id() == project_id)
            .cloned()
            .collect())
    }

    async fn hard_delete(&self, id: SiteId) -> Result<(), InfraError> {
        self.record(RepoOperation::DeleteSite, id.as_i64())?;
        self.state.lock().unwrap().sites.retain(|s| s.id() != id);
        Ok(())
    }

    async fn hard_delete_by_project_id(&self, project_id: ProjectId) -> Result<u64, InfraError> {
        self.record(RepoOperation::DeleteSitesByProject, project_id.as_i64())?;
        let mut state = self.state.lock().unwrap();
        let before = state.sites.len();
        state.sites.retain(|s| s.project_id() != project_id);
        Ok((before - state.sites.len()) as u64)
    }
}

#[async_trait]
impl DocumentGroupRepository for MockHierarchyStore {
    async fn find_by_site_id(&self, site_id: SiteId) -> Result<Vec<DocumentGroup>, InfraError> {
        self.record(RepoOperation::FindGroupsBySite, site_id.as_i64())?;
        let state = self.state.lock().unwrap();
        Ok(state
            .groups
            .iter()
            .filter(|g| g.site_id() == site_id)
            .cloned()
            .collect())
    }

    async fn hard_delete_by_site_id(&self, site_id: SiteId) -> Result<u64, InfraError> {
        self.record(RepoOperation::DeleteGroupsBySite, site_id.as_i64())?;
        let mut state = self.state.lock().unwrap();
        let before = state.groups.len();
        state.groups.retain(|g| g.site_id() != site_id);
        Ok((before - state.groups.len()) as u64)
    }
}

#[async_trait]
impl DocumentRepository for MockHierarchyStore {
    async fn find_by_group_id(
        &self,
        group_id: DocumentGroupId,
    ) -> Result<Vec<Document>, InfraError> {
        self.record(RepoOperation::FindDocumentsByGroup, group_id.as_i64())?;
        let state = self.state.lock().unwrap();
        Ok(state
            .documents
            .iter()
            .filter(|d| d.group_id() == group_id)
            .cloned()
            .collect())
    }

    async fn hard_delete_by_site_id(&self, site_id: SiteId) -> Result<u64, InfraError> {
        self.record(RepoOperation::DeleteDocumentsBySite, site_id.as_i64())?;
        let mut state = self.state.lock().unwrap();
        let groups = state.group_ids_of_site(site_id);
        let before = state.documents.len();
        state.documents.retain(|d| !groups.contains(&d.group_id()));
        Ok((before - state.documents.len()) as u64)
    }
}

#[async_trait]
impl FileRepository for MockHierarchyStore {
    async fn find_by_document_id(&self, document_id: DocumentId) -> Result<Vec<File>, InfraError> {
        self.record(RepoOperation::FindFilesByDocument, document_id.as_i64())?;
        let state = self.state.lock().unwrap();
        Ok(state
            .files
            .iter()
            .filter(|f| f.document_id() == document_id)
            .cloned()
            .collect())
    }

    async fn hard_delete_by_site_id(&self, site_id: SiteId) -> Result<u64, InfraError> {
        self.record(RepoOperation::DeleteFilesBySite, site_id.as_i64())?;
        let mut state = self.state.lock().unwrap();
        let documents = state.document_ids_of_site(site_id);
        let before = state.files.len();
        state.files.retain(|f| !documents.contains(&f.document_id()));
        Ok((before - state.files.len()) as u64)
    }
}

// =========================================================================
// MockObjectStorage
// =========================================================================

/// 記録されたストレージ呼び出し
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageCall {
    ListObjects {
        bucket:             String,
        continuation_token: Option<String>,
    },
    DeleteObjects {
        bucket: String,
        keys:   Vec<String>,
    },
    DeleteBucket {
        bucket: String,
    },
    ListBuckets,
}

#[derive(Default)]
struct StorageState {
    buckets:         BTreeMap<String, BTreeSet<String>>,
    deleted_buckets: HashSet<String>,
    rejected_keys:   HashSet<String>,
    calls:           Vec<StorageCall>,
}

/// インメモリのオブジェクトストレージ
pub struct MockObjectStorage {
    state:                  Mutex<StorageState>,
    transient_delete_fails: AtomicUsize,
    transient_list_fails:   AtomicUsize,
    /// この回数を超えたバッチ削除は恒久的に失敗する
    delete_success_budget:  AtomicUsize,
    delete_latency:         Option<Duration>,
    in_flight:              AtomicUsize,
    max_in_flight:          AtomicUsize,
}

impl Default for MockObjectStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MockObjectStorage {
    pub fn new() -> Self {
        Self {
            state:                  Mutex::new(StorageState::default()),
            transient_delete_fails: AtomicUsize::new(0),
            transient_list_fails:   AtomicUsize::new(0),
            delete_success_budget:  AtomicUsize::new(usize::MAX),
            delete_latency:         None,
            in_flight:              AtomicUsize::new(0),
            max_in_flight:          AtomicUsize::new(0),
        }
    }

    /// バッチ削除のたびに指定時間だけ待機する
    pub fn with_delete_latency(mut self, latency: Duration) -> Self {
        self.delete_latency = Some(latency);
        self
    }

    /// バケットにオブジェクトを配置する
    pub fn put_objects(&self, bucket: &str, keys: impl IntoIterator<Item = String>) {
        self.state
            .lock()
            .unwrap()
            .buckets
            .entry(bucket.to_string())
            .or_default()
            .extend(keys);
    }

    /// 次の `count` 回のバッチ削除を一時的エラーにする
    pub fn fail_next_deletes_transiently(&self, count: usize) {
        self.transient_delete_fails.store(count, Ordering::SeqCst);
    }

    /// 次の `count` 回の一覧取得を一時的エラーにする
    pub fn fail_next_lists_transiently(&self, count: usize) {
        self.transient_list_fails.store(count, Ordering::SeqCst);
    }

    /// `successes` 回成功した後のバッチ削除をすべて恒久的エラーにする
    pub fn fail_deletes_after(&self, successes: usize) {
        self.delete_success_budget.store(successes, Ordering::SeqCst);
    }

    /// 指定したキーをキー単位の失敗として返す
    pub fn reject_key(&self, key: &str) {
        self.state
            .lock()
            .unwrap()
            .rejected_keys
            .insert(key.to_string());
    }

    pub fn calls(&self) -> Vec<StorageCall> {
        self.state.lock().unwrap().calls.clone()
    }

    /// バッチ削除で削除を確認したキーの総数
    pub fn deleted_key_count(&self) -> usize {
        self.calls()
            .iter()
            .map(|call| match call {
                StorageCall::DeleteObjects { keys, .. } => keys.len(),
                _ => 0,
            })
            .sum()
    }

    pub fn bucket_deleted(&self, bucket: &str) -> bool {
        self.state.lock().unwrap().deleted_buckets.contains(bucket)
    }

    /// 同時に実行されていたバッチ削除の最大数
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ObjectStorageBackend for MockObjectStorage {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: Option<&str>,
        continuation_token: Option<String>,
        max_keys: usize,
    ) -> Result<ObjectPage, InfraError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StorageCall::ListObjects {
            bucket:             bucket.to_string(),
            continuation_token: continuation_token.clone(),
        });
        if Self::take_failure(&self.transient_list_fails) {
            return Err(InfraError::storage_transient("SlowDown"));
        }

        let Some(objects) = state.buckets.get(bucket) else {
            return Err(InfraError::storage_permanent(format!("NoSuchBucket: {bucket}")));
        };

        // 継続トークンは直前のページの最後のキー
        let mut matching = objects
            .iter()
            .filter(|key| prefix.is_none_or(|p| key.starts_with(p)))
            .filter(|key| continuation_token.as_ref().is_none_or(|t| *key > t));

        let keys: Vec<String> = matching.by_ref().take(max_keys).cloned().collect();
        let next_continuation_token = if matching.next().is_some() {
            keys.last().cloned()
        } else {
            None
        };

        Ok(ObjectPage {
            keys,
            next_continuation_token,
        })
    }

    async fn delete_objects(
        &self,
        bucket: &str,
        keys: &[String],
    ) -> Result<BatchDeleteOutput, InfraError> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.delete_latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mut state = self.state.lock().unwrap();
        state.calls.push(StorageCall::DeleteObjects {
            bucket: bucket.to_string(),
            keys:   keys.to_vec(),
        });

        if Self::take_failure(&self.transient_delete_fails) {
            return Err(InfraError::storage_transient("SlowDown"));
        }
        if !Self::take_failure(&self.delete_success_budget) {
            return Err(InfraError::storage_permanent("AccessDenied"));
        }

        let mut output = BatchDeleteOutput::default();
        for key in keys {
            if state.rejected_keys.contains(key) {
                output.errors.push(KeyDeletionError {
                    key:     key.clone(),
                    code:    Some("AccessDenied".to_string()),
                    message: Some("Access Denied".to_string()),
                });
            } else {
                if let Some(objects) = state.buckets.get_mut(bucket) {
                    objects.remove(key);
                }
                output.deleted.push(key.clone());
            }
        }
        Ok(output)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<(), InfraError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StorageCall::DeleteBucket {
            bucket: bucket.to_string(),
        });
        if state.buckets.get(bucket).is_some_and(|o| !o.is_empty()) {
            return Err(InfraError::storage_permanent(format!("BucketNotEmpty: {bucket}")));
        }
        state.buckets.remove(bucket);
        state.deleted_buckets.insert(bucket.to_string());
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>, InfraError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(StorageCall::ListBuckets);
        Ok(state.buckets.keys().cloned().collect())
    }
}

// =========================================================================
// MockMessageQueue
// =========================================================================

#[derive(Default)]
struct QueueState {
    pending:      VecDeque<Delivery>,
    requeued:     Vec<Delivery>,
    dead_letters: Vec<Delivery>,
}

/// インメモリのメッセージキュー
///
/// 再投入したメッセージは配信回数を進めて末尾に戻り、再び取り出される。
#[derive(Clone, Default)]
pub struct MockMessageQueue {
    state: Arc<Mutex<QueueState>>,
}

impl MockMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 初回配信のメッセージを投入する
    pub fn push(&self, body: impl Into<String>) {
        self.state
            .lock()
            .unwrap()
            .pending
            .push_back(Delivery::first(body));
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().pending.len()
    }

    /// 再投入されたメッセージ（再投入後の配信回数）
    pub fn requeued(&self) -> Vec<Delivery> {
        self.state.lock().unwrap().requeued.clone()
    }

    pub fn dead_letters(&self) -> Vec<Delivery> {
        self.state.lock().unwrap().dead_letters.clone()
    }
}

#[async_trait]
impl MessageQueue for MockMessageQueue {
    async fn receive(&self) -> Result<Option<Delivery>, InfraError> {
        Ok(self.state.lock().unwrap().pending.pop_front())
    }

    async fn requeue(&self, delivery: &Delivery) -> Result<(), InfraError> {
        let next = delivery.next_attempt();
        let mut state = self.state.lock().unwrap();
        state.requeued.push(next.clone());
        state.pending.push_back(next);
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery) -> Result<(), InfraError> {
        self.state
            .lock()
            .unwrap()
            .dead_letters
            .push(delivery.clone());
        Ok(())
    }
}
