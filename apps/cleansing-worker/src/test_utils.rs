//! ユースケース・ハンドラのテストで共有するフィクスチャ

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicI64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use cleansing_domain::hierarchy::{
    Contractor,
    ContractorId,
    Document,
    DocumentCategory,
    DocumentGroup,
    DocumentGroupId,
    DocumentId,
    File,
    FileId,
    Project,
    ProjectId,
    Site,
    SiteId,
};
use cleansing_infra::{
    InfraError,
    mock::{MockHierarchyStore, MockObjectStorage},
    storage::{
        BackendFactory,
        DeletionEngine,
        DeletionEngineConfig,
        ObjectStorageBackend,
        RegionClientCache,
        RetryPolicy,
    },
};

use crate::usecase::HierarchyRepositories;

pub const DEFAULT_REGION: &str = "ap-southeast-1";
pub const DEFAULT_BUCKET: &str = "wadugs-default";
pub const TENANT_REGION: &str = "eu-west-1";
pub const TENANT_BUCKET: &str = "tenant-bucket";

/// 追加分の ID（シード分と重ならない範囲から払い出す）
static NEXT_ID: AtomicI64 = AtomicI64::new(10_000);

fn next_id() -> i64 {
    NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

pub fn repositories(store: &MockHierarchyStore) -> HierarchyRepositories {
    HierarchyRepositories {
        contractor: Arc::new(store.clone()),
        project:    Arc::new(store.clone()),
        site:       Arc::new(store.clone()),
        group:      Arc::new(store.clone()),
        document:   Arc::new(store.clone()),
        file:       Arc::new(store.clone()),
    }
}

struct RegionalFactory(HashMap<String, Arc<MockObjectStorage>>);

#[async_trait]
impl BackendFactory for RegionalFactory {
    async fn create(&self, region: &str) -> Result<Arc<dyn ObjectStorageBackend>, InfraError> {
        self.0
            .get(region)
            .map(|b| Arc::clone(b) as Arc<dyn ObjectStorageBackend>)
            .ok_or_else(|| InfraError::unexpected(format!("未知のリージョン: {region}")))
    }
}

/// 待ち時間を短くした削除エンジン設定
pub fn fast_engine_config() -> DeletionEngineConfig {
    DeletionEngineConfig {
        max_concurrent_deletes: 3,
        rate_limit_per_second:  10_000,
        rate_limit_burst:       10_000,
        retry:                  RetryPolicy {
            max_retries: 3,
            base_delay:  Duration::from_millis(1),
            max_delay:   Duration::from_millis(2),
        },
    }
}

/// 既定リージョンと契約者のリージョンにモックを割り当てた削除エンジン
pub fn engine(
    default: Arc<MockObjectStorage>,
    tenant: Arc<MockObjectStorage>,
) -> Arc<DeletionEngine> {
    let factory = RegionalFactory(HashMap::from([(TENANT_REGION.to_string(), tenant)]));
    let cache = RegionClientCache::new(DEFAULT_REGION, default, Arc::new(factory));
    Arc::new(DeletionEngine::new(Arc::new(cache), fast_engine_config()).unwrap())
}

/// シード済みの階層
///
/// ```text
/// Contractor(1, tenant-bucket@eu-west-1)
/// └── Project(10, "PRJ", usage 10000)
///     └── Site(100, "S01")
///         ├── Group(1000, Boundary, 未処理)
///         │   └── Document(2000)
///         │       └── File(3000, "line_01/route.shp", 1000 bytes)
///         └── Group(1001, Image, progress 40, "mosaic")
///             └── Document(2001)
///                 └── File(3001, "photo.jpg", 500 bytes)
/// ```
#[derive(Debug, Clone, Copy)]
pub struct Fixture {
    pub contractor_id:        ContractorId,
    pub project_id:           ProjectId,
    pub site_id:              SiteId,
    pub boundary_document_id: DocumentId,
}

impl Fixture {
    pub const INITIAL_USAGE: i64 = 10_000;

    pub fn seed(store: &MockHierarchyStore) -> Self {
        let fixture = Self::seed_without_contractor(store);
        store.add_contractor(Contractor::new(
            fixture.contractor_id,
            "Contractor",
            Some(TENANT_BUCKET.to_string()),
            Some(TENANT_REGION.to_string()),
        ));
        store.add_contractor_member(fixture.contractor_id);
        fixture
    }

    /// 契約者の行を持たない階層（プロジェクトは既定のバケットに解決される）
    pub fn seed_without_contractor(store: &MockHierarchyStore) -> Self {
        let fixture = Self {
            contractor_id:        ContractorId::new(1),
            project_id:           ProjectId::new(10),
            site_id:              SiteId::new(100),
            boundary_document_id: DocumentId::new(2000),
        };

        store.add_project(
            Project::new(fixture.project_id, "PRJ", "Project", Self::INITIAL_USAGE),
            Some(fixture.contractor_id),
        );
        store.add_site(Site::new(fixture.site_id, fixture.project_id, "S01", "Site 1"));

        store.add_group(DocumentGroup::new(
            DocumentGroupId::new(1000),
            fixture.site_id,
            "boundary",
            DocumentCategory::Boundary,
            0,
            None,
        ));
        store.add_document(Document::new(
            fixture.boundary_document_id,
            DocumentGroupId::new(1000),
            "boundary.shp",
        ));
        store.add_file(File::new(
            FileId::new(3000),
            fixture.boundary_document_id,
            "line_01/route.shp",
            1000,
        ));

        store.add_group(DocumentGroup::new(
            DocumentGroupId::new(1001),
            fixture.site_id,
            "image",
            DocumentCategory::Image,
            40,
            Some("mosaic".to_string()),
        ));
        store.add_document(Document::new(
            DocumentId::new(2001),
            DocumentGroupId::new(1001),
            "photo",
        ));
        store.add_file(File::new(
            FileId::new(3001),
            DocumentId::new(2001),
            "photo.jpg",
            500,
        ));

        fixture
    }

    /// シード済みプロジェクトにサイトを追加する（100 bytes のファイル 1 件）
    pub fn add_site(&self, store: &MockHierarchyStore, code: &str, category: DocumentCategory) -> SiteId {
        add_site_to(store, self.project_id, code, category)
    }

    /// 契約者にプロジェクトを追加する（サイト "S01" と 100 bytes のファイル 1 件）
    pub fn add_project(&self, store: &MockHierarchyStore, code: &str) -> ProjectId {
        let project_id = ProjectId::new(next_id());
        store.add_project(
            Project::new(project_id, code, code, 100),
            Some(self.contractor_id),
        );
        add_site_to(store, project_id, "S01", DocumentCategory::Image);
        project_id
    }
}

fn add_site_to(
    store: &MockHierarchyStore,
    project_id: ProjectId,
    code: &str,
    category: DocumentCategory,
) -> SiteId {
    let site_id = SiteId::new(next_id());
    let group_id = DocumentGroupId::new(next_id());
    let document_id = DocumentId::new(next_id());

    store.add_site(Site::new(site_id, project_id, code, code));
    store.add_group(DocumentGroup::new(group_id, site_id, "group", category, 0, None));
    store.add_document(Document::new(document_id, group_id, "document"));
    store.add_file(File::new(FileId::new(next_id()), document_id, "img.tif", 100));
    site_id
}
