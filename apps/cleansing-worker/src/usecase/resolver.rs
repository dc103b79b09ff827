//! # 階層リゾルバ
//!
//! 削除スコープ（契約者・プロジェクト・サイト）を起点に
//! Project → Site → DocumentGroup → Document → File と辿り、
//! 削除すべきオブジェクトの一覧を組み立てる。
//!
//! ## 部分的な解決
//!
//! スコープ自身の読み出しに失敗した場合だけをエラーとする。
//! 途中の枝（あるサイトのグループ一覧など）を読み出せない場合は、その枝を
//! 飛ばしてログに残し、残りの解決を続ける。一部のキーだけでも削除できれば前進になる。
//!
//! ## 格納先
//!
//! プロジェクトのオブジェクトは契約者の専用バケットに置かれる。
//! 契約者が見つからない、またはバケットが未設定の場合は既定のバケットとリージョンを使う。

use cleansing_domain::{
    DomainError,
    hierarchy::{Contractor, ContractorId, Project, ProjectId, Site, SiteId},
    storage_key::{self, StorageLocation, StorageObjectRef},
};

use super::HierarchyRepositories;
use crate::error::WorkerError;

/// 解決済みのプロジェクトと、カスケード対象のサイト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedProject {
    pub project: Project,
    pub sites:   Vec<Site>,
}

/// スコープの解決結果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedScope {
    /// 削除対象のオブジェクト
    pub objects:  Vec<StorageObjectRef>,
    /// 解決に使ったプロジェクトとサイト
    pub projects: Vec<ResolvedProject>,
}

/// 階層リゾルバ
pub struct HierarchyResolver {
    repos:            HierarchyRepositories,
    default_location: StorageLocation,
}

impl HierarchyResolver {
    pub fn new(repos: HierarchyRepositories, default_location: StorageLocation) -> Self {
        Self {
            repos,
            default_location,
        }
    }

    /// 契約者配下のすべてのプロジェクトを解決する
    ///
    /// プロジェクトのサイト一覧を読み出せない場合、そのプロジェクトは
    /// サイトなしとして扱う（行の削除対象には残る）。
    #[tracing::instrument(skip_all, fields(%contractor_id))]
    pub async fn resolve_contractor(
        &self,
        contractor_id: ContractorId,
    ) -> Result<ResolvedScope, WorkerError> {
        let contractor = self
            .repos
            .contractor
            .find_by_id(contractor_id)
            .await?
            .ok_or_else(|| not_found("Contractor", contractor_id))?;
        let location = self.location_of(Some(&contractor));

        let projects = self
            .repos
            .project
            .find_by_contractor_id(contractor_id)
            .await?;
        tracing::info!(project_count = projects.len(), "契約者のプロジェクトを取得しました");

        let mut scope = ResolvedScope::default();
        for project in projects {
            let sites = match self.repos.site.find_by_project_id(project.id()).await {
                Ok(sites) => sites,
                Err(e) => {
                    tracing::warn!(
                        project_id = %project.id(),
                        error = %e,
                        "プロジェクトのサイト一覧を取得できないため、スキップします"
                    );
                    Vec::new()
                }
            };
            self.collect_project(&project, &sites, &location, &mut scope.objects)
                .await;
            scope.projects.push(ResolvedProject { project, sites });
        }

        Ok(scope)
    }

    /// プロジェクト配下のすべてのサイトを解決する
    #[tracing::instrument(skip_all, fields(%project_id))]
    pub async fn resolve_project(&self, project_id: ProjectId) -> Result<ResolvedScope, WorkerError> {
        let project = self
            .repos
            .project
            .find_by_id(project_id)
            .await?
            .ok_or_else(|| not_found("Project", project_id))?;
        let sites = self.repos.site.find_by_project_id(project_id).await?;
        tracing::debug!(site_count = sites.len(), "プロジェクトのサイトを取得しました");

        let location = self.location_for_project(project_id).await;

        let mut scope = ResolvedScope::default();
        self.collect_project(&project, &sites, &location, &mut scope.objects)
            .await;
        scope.projects.push(ResolvedProject { project, sites });

        Ok(scope)
    }

    /// 単一のサイトを解決する
    #[tracing::instrument(skip_all, fields(%site_id))]
    pub async fn resolve_site(&self, site_id: SiteId) -> Result<ResolvedScope, WorkerError> {
        let site = self
            .repos
            .site
            .find_by_id(site_id)
            .await?
            .ok_or_else(|| not_found("Site", site_id))?;

        // キーの先頭はプロジェクトコードなので、プロジェクトなしでは導出できない
        let project = self
            .repos
            .project
            .find_by_id(site.project_id())
            .await?
            .ok_or_else(|| not_found("Project", site.project_id()))?;

        let location = self.location_for_project(project.id()).await;

        let mut scope = ResolvedScope::default();
        self.collect_site(&project, &site, &location, &mut scope.objects)
            .await;
        scope.projects.push(ResolvedProject {
            project,
            sites: vec![site],
        });

        Ok(scope)
    }

    async fn location_for_project(&self, project_id: ProjectId) -> StorageLocation {
        match self.repos.contractor.find_by_project_id(project_id).await {
            Ok(contractor) => self.location_of(contractor.as_ref()),
            Err(e) => {
                tracing::warn!(
                    %project_id,
                    error = %e,
                    "契約者のバケットを取得できないため、既定のバケットを使います"
                );
                self.default_location.clone()
            }
        }
    }

    fn location_of(&self, contractor: Option<&Contractor>) -> StorageLocation {
        let bucket = contractor
            .and_then(Contractor::bucket_name)
            .unwrap_or(self.default_location.bucket.as_str());
        let region = contractor
            .and_then(Contractor::bucket_region)
            .unwrap_or(self.default_location.region.as_str());
        StorageLocation::new(region, bucket)
    }

    async fn collect_project(
        &self,
        project: &Project,
        sites: &[Site],
        location: &StorageLocation,
        objects: &mut Vec<StorageObjectRef>,
    ) {
        for site in sites {
            self.collect_site(project, site, location, objects).await;
        }
    }

    async fn collect_site(
        &self,
        project: &Project,
        site: &Site,
        location: &StorageLocation,
        objects: &mut Vec<StorageObjectRef>,
    ) {
        let groups = match self.repos.group.find_by_site_id(site.id()).await {
            Ok(groups) => groups,
            Err(e) => {
                tracing::warn!(
                    site_id = %site.id(),
                    error = %e,
                    "サイトのグループ一覧を取得できないため、スキップします"
                );
                return;
            }
        };

        for group in &groups {
            objects.extend(
                storage_key::processed_keys(project, site, group)
                    .into_iter()
                    .map(|key| StorageObjectRef::new(location, key, None)),
            );

            let documents = match self.repos.document.find_by_group_id(group.id()).await {
                Ok(documents) => documents,
                Err(e) => {
                    tracing::warn!(
                        group_id = %group.id(),
                        error = %e,
                        "グループのドキュメント一覧を取得できないため、スキップします"
                    );
                    continue;
                }
            };

            for document in &documents {
                let files = match self.repos.file.find_by_document_id(document.id()).await {
                    Ok(files) => files,
                    Err(e) => {
                        tracing::warn!(
                            document_id = %document.id(),
                            error = %e,
                            "ドキュメントのファイル一覧を取得できないため、スキップします"
                        );
                        continue;
                    }
                };

                for file in &files {
                    if group.category().splits_file_name() && !file.name().contains('/') {
                        tracing::debug!(
                            file_id = %file.id(),
                            file_name = file.name(),
                            category = group.category().as_str(),
                            "ファイル名を分割できないため、元の名前でキーを導出します"
                        );
                    }
                    let key = storage_key::upload_key(project, site, group, file);
                    objects.push(StorageObjectRef::new(location, key, Some(file.size())));
                }
            }
        }

        tracing::debug!(site_id = %site.id(), group_count = groups.len(), "サイトを解決しました");
    }
}

fn not_found(entity_type: &'static str, id: impl ToString) -> WorkerError {
    WorkerError::Domain(DomainError::NotFound {
        entity_type,
        id: id.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use cleansing_domain::hierarchy::{DocumentCategory, File, FileId};
    use cleansing_infra::mock::{MockHierarchyStore, RepoOperation};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::test_utils::{self, Fixture};

    fn sut(store: &MockHierarchyStore) -> HierarchyResolver {
        HierarchyResolver::new(
            test_utils::repositories(store),
            StorageLocation::new(test_utils::DEFAULT_REGION, test_utils::DEFAULT_BUCKET),
        )
    }

    fn keys(scope: &ResolvedScope) -> HashSet<String> {
        scope.objects.iter().map(|o| o.key.clone()).collect()
    }

    #[tokio::test]
    async fn test_サイトのアップロード原本と処理済み成果物を列挙できる() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);

        let scope = sut(&store).resolve_site(fixture.site_id).await.unwrap();

        assert_eq!(
            keys(&scope),
            HashSet::from([
                "PRJ/S01/00_Upload/line_01/Raw/route.shp".to_string(),
                "PRJ/S01/00_Upload/photo.jpg".to_string(),
                "PRJ/S01/01_Processed/mosaic.geojson".to_string(),
                "PRJ/S01/01_Processed/mosaic_B01.tif".to_string(),
                "PRJ/S01/01_Processed/mosaic_B02.tif".to_string(),
                "PRJ/S01/01_Processed/mosaic_B03.tif".to_string(),
            ])
        );
        assert_eq!(scope.projects.len(), 1);
        assert_eq!(scope.projects[0].sites.len(), 1);
    }

    #[tokio::test]
    async fn test_契約者のバケットとリージョンが格納先になる() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);

        let scope = sut(&store).resolve_site(fixture.site_id).await.unwrap();

        assert!(scope.objects.iter().all(|o| {
            o.bucket == test_utils::TENANT_BUCKET && o.region == test_utils::TENANT_REGION
        }));
    }

    #[tokio::test]
    async fn test_契約者がいないプロジェクトは既定のバケットを使う() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed_without_contractor(&store);

        let scope = sut(&store)
            .resolve_project(fixture.project_id)
            .await
            .unwrap();

        assert!(!scope.objects.is_empty());
        assert!(scope.objects.iter().all(|o| {
            o.bucket == test_utils::DEFAULT_BUCKET && o.region == test_utils::DEFAULT_REGION
        }));
    }

    #[tokio::test]
    async fn test_契約者の取得に失敗しても既定のバケットで解決を続ける() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);
        store.fail(RepoOperation::FindContractorByProject);

        let scope = sut(&store).resolve_site(fixture.site_id).await.unwrap();

        assert!(scope.objects.iter().all(|o| o.bucket == test_utils::DEFAULT_BUCKET));
    }

    #[tokio::test]
    async fn test_アップロード原本はファイルサイズを持ち処理済み成果物は持たない() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);

        let scope = sut(&store).resolve_site(fixture.site_id).await.unwrap();

        let upload_bytes: i64 = scope
            .objects
            .iter()
            .filter(|o| o.key.contains("/00_Upload/"))
            .map(|o| o.size.unwrap())
            .sum();
        assert_eq!(upload_bytes, 1500);
        assert!(
            scope
                .objects
                .iter()
                .filter(|o| o.key.contains("/01_Processed/"))
                .all(|o| o.size.is_none())
        );
    }

    #[tokio::test]
    async fn test_分割できないファイル名は元の名前でキーになる() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);
        store.add_file(File::new(
            FileId::new(9001),
            fixture.boundary_document_id,
            "single.shp",
            10,
        ));

        let scope = sut(&store).resolve_site(fixture.site_id).await.unwrap();

        assert!(keys(&scope).contains("PRJ/S01/00_Upload/single.shp"));
    }

    #[tokio::test]
    async fn test_グループの読み出しに失敗したサイトは飛ばして解決を続ける() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);
        let second_site = fixture.add_site(&store, "S02", DocumentCategory::Image);
        store.fail_for(RepoOperation::FindGroupsBySite, fixture.site_id.as_i64());

        let scope = sut(&store)
            .resolve_project(fixture.project_id)
            .await
            .unwrap();

        assert!(!scope.objects.is_empty());
        assert!(scope.objects.iter().all(|o| o.key.starts_with("PRJ/S02/")));
        assert_eq!(scope.projects[0].sites.len(), 2);
        assert!(
            store
                .position_of(RepoOperation::FindGroupsBySite, second_site.as_i64())
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_ファイルの読み出しに失敗したドキュメントは飛ばす() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);
        store.fail_for(
            RepoOperation::FindFilesByDocument,
            fixture.boundary_document_id.as_i64(),
        );

        let scope = sut(&store).resolve_site(fixture.site_id).await.unwrap();

        let found = keys(&scope);
        assert!(!found.contains("PRJ/S01/00_Upload/line_01/Raw/route.shp"));
        assert!(found.contains("PRJ/S01/00_Upload/photo.jpg"));
    }

    #[tokio::test]
    async fn test_存在しないサイトは解決エラーになる() {
        let store = MockHierarchyStore::new();

        let result = sut(&store).resolve_site(SiteId::new(404)).await;

        assert!(matches!(
            result,
            Err(WorkerError::Domain(DomainError::NotFound {
                entity_type: "Site",
                ..
            }))
        ));
    }

    #[tokio::test]
    async fn test_スコープ自身の読み出し失敗はエラーになる() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);
        store.fail(RepoOperation::FindProject);

        let result = sut(&store).resolve_project(fixture.project_id).await;

        assert!(matches!(result, Err(WorkerError::Infra(_))));
    }

    #[tokio::test]
    async fn test_契約者配下のすべてのプロジェクトを解決できる() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);
        let second = fixture.add_project(&store, "PRJ2");

        let scope = sut(&store)
            .resolve_contractor(fixture.contractor_id)
            .await
            .unwrap();

        let project_ids: Vec<ProjectId> =
            scope.projects.iter().map(|p| p.project.id()).collect();
        assert_eq!(project_ids, vec![fixture.project_id, second]);
        assert!(keys(&scope).iter().any(|k| k.starts_with("PRJ/")));
        assert!(keys(&scope).iter().any(|k| k.starts_with("PRJ2/")));
    }

    #[tokio::test]
    async fn test_サイト一覧を取得できないプロジェクトもカスケード対象に残る() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);
        store.fail_for(RepoOperation::FindSitesByProject, fixture.project_id.as_i64());

        let scope = sut(&store)
            .resolve_contractor(fixture.contractor_id)
            .await
            .unwrap();

        assert!(scope.objects.is_empty());
        assert_eq!(scope.projects.len(), 1);
        assert!(scope.projects[0].sites.is_empty());
    }

    #[tokio::test]
    async fn test_同じ階層を2回解決すると同じキー集合になる() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);
        fixture.add_project(&store, "PRJ2");
        let resolver = sut(&store);

        let first = resolver
            .resolve_contractor(fixture.contractor_id)
            .await
            .unwrap();
        let second = resolver
            .resolve_contractor(fixture.contractor_id)
            .await
            .unwrap();

        assert_eq!(keys(&first), keys(&second));
    }

    #[tokio::test]
    async fn test_解決は読み出しだけを行う() {
        let store = MockHierarchyStore::new();
        let fixture = Fixture::seed(&store);

        sut(&store)
            .resolve_contractor(fixture.contractor_id)
            .await
            .unwrap();

        assert!(store.mutations().is_empty());
    }
}
