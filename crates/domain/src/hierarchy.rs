//! # 包含階層
//!
//! 削除対象となるエンティティの包含階層を表現する。
//!
//! ```text
//! Contractor 1─* Project（contractor_project 経由）
//!                  1─* Site
//!                        1─* DocumentGroup
//!                              1─* Document
//!                                    1─* File
//! ```
//!
//! ## 不変条件
//!
//! - File / Document / DocumentGroup / Site はちょうど 1 つの Project に辿り着く
//! - Project は関連テーブルを通じてちょうど 1 つの Contractor に辿り着く
//!
//! このため関係データの削除は必ず葉から根の順で行う（FK に ON DELETE CASCADE がない）。
//!
//! 各エンティティは DB から読み出した行を表し、このクレートでは生成・更新しない。

use crate::macros::define_i64_id;

define_i64_id! {
    /// 契約者 ID
    pub struct ContractorId;
}

define_i64_id! {
    /// プロジェクト ID
    pub struct ProjectId;
}

define_i64_id! {
    /// サイト ID
    pub struct SiteId;
}

define_i64_id! {
    /// ドキュメントグループ ID
    pub struct DocumentGroupId;
}

define_i64_id! {
    /// ドキュメント ID
    pub struct DocumentId;
}

define_i64_id! {
    /// ファイル ID
    pub struct FileId;
}

/// 処理済み成果物が存在することを示す `progress` の値
///
/// 40 は処理完了、11 は再処理完了を表す。
pub const PROCESSED_PROGRESS_VALUES: [i16; 2] = [40, 11];

// =========================================================================
// Contractor
// =========================================================================

/// 契約者
///
/// 契約者ごとに専用のバケットを持つ場合がある。
/// バケット名が空の場合は既定のバケットが使われる。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contractor {
    id:            ContractorId,
    name:          String,
    bucket_name:   Option<String>,
    bucket_region: Option<String>,
}

impl Contractor {
    pub fn new(
        id: ContractorId,
        name: impl Into<String>,
        bucket_name: Option<String>,
        bucket_region: Option<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            bucket_name,
            bucket_region,
        }
    }

    pub fn id(&self) -> ContractorId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 専用バケット名（空文字列は未設定として扱う）
    pub fn bucket_name(&self) -> Option<&str> {
        self.bucket_name.as_deref().filter(|b| !b.trim().is_empty())
    }

    /// 専用バケットのリージョン（空文字列は未設定として扱う）
    pub fn bucket_region(&self) -> Option<&str> {
        self.bucket_region.as_deref().filter(|r| !r.trim().is_empty())
    }
}

// =========================================================================
// Project
// =========================================================================

/// プロジェクト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    id:              ProjectId,
    code:            String,
    name:            String,
    file_size_usage: i64,
}

impl Project {
    pub fn new(
        id: ProjectId,
        code: impl Into<String>,
        name: impl Into<String>,
        file_size_usage: i64,
    ) -> Self {
        Self {
            id,
            code: code.into(),
            name: name.into(),
            file_size_usage,
        }
    }

    pub fn id(&self) -> ProjectId {
        self.id
    }

    /// オブジェクトキーの先頭セグメントになるコード
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 使用中のストレージ容量（バイト）
    pub fn file_size_usage(&self) -> i64 {
        self.file_size_usage
    }
}

// =========================================================================
// Site
// =========================================================================

/// サイト
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    id:         SiteId,
    project_id: ProjectId,
    code:       String,
    name:       String,
}

impl Site {
    pub fn new(
        id: SiteId,
        project_id: ProjectId,
        code: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            id,
            project_id,
            code: code.into(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> SiteId {
        self.id
    }

    pub fn project_id(&self) -> ProjectId {
        self.project_id
    }

    /// オブジェクトキーの 2 番目のセグメントになるコード
    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

// =========================================================================
// DocumentCategory
// =========================================================================

/// ドキュメントグループのカテゴリ
///
/// キー導出の規則表に現れるカテゴリだけを列挙し、それ以外は [`Other`](Self::Other)
/// に元の文字列のまま保持する。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentCategory {
    Boundary,
    LineRoute,
    Sbest,
    Sbp,
    SoilSample,
    Sss,
    RasterD,
    RasterO,
    Image,
    Other(String),
}

impl DocumentCategory {
    /// DB に格納された文字列からカテゴリを復元する
    ///
    /// 規則表にない値はエラーにせず [`Other`](Self::Other) として保持する。
    pub fn parse(value: &str) -> Self {
        match value {
            "Boundary" => Self::Boundary,
            "LineRoute" => Self::LineRoute,
            "SBEST" => Self::Sbest,
            "SBP" => Self::Sbp,
            "SoilSample" => Self::SoilSample,
            "SSS" => Self::Sss,
            "RasterD" => Self::RasterD,
            "RasterO" => Self::RasterO,
            "Image" => Self::Image,
            other => Self::Other(other.to_string()),
        }
    }

    /// DB 表現の文字列を返す
    pub fn as_str(&self) -> &str {
        match self {
            Self::Boundary => "Boundary",
            Self::LineRoute => "LineRoute",
            Self::Sbest => "SBEST",
            Self::Sbp => "SBP",
            Self::SoilSample => "SoilSample",
            Self::Sss => "SSS",
            Self::RasterD => "RasterD",
            Self::RasterO => "RasterO",
            Self::Image => "Image",
            Self::Other(value) => value,
        }
    }
}

impl std::fmt::Display for DocumentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =========================================================================
// DocumentGroup
// =========================================================================

/// ドキュメントグループ
///
/// 処理パイプラインを通過したグループは `processed_name` を持ち、
/// `01_Processed/` 配下に成果物が出力されている。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentGroup {
    id:             DocumentGroupId,
    site_id:        SiteId,
    name:           String,
    category:       DocumentCategory,
    progress:       i16,
    processed_name: Option<String>,
}

impl DocumentGroup {
    pub fn new(
        id: DocumentGroupId,
        site_id: SiteId,
        name: impl Into<String>,
        category: DocumentCategory,
        progress: i16,
        processed_name: Option<String>,
    ) -> Self {
        Self {
            id,
            site_id,
            name: name.into(),
            category,
            progress,
            processed_name,
        }
    }

    pub fn id(&self) -> DocumentGroupId {
        self.id
    }

    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn category(&self) -> &DocumentCategory {
        &self.category
    }

    pub fn progress(&self) -> i16 {
        self.progress
    }

    /// 処理済み成果物の名前（空文字列は未設定として扱う）
    pub fn processed_name(&self) -> Option<&str> {
        self.processed_name.as_deref().filter(|n| !n.is_empty())
    }

    /// 処理済み成果物が存在するかどうか
    ///
    /// `progress` が処理完了を示し、かつ `processed_name` が空でない場合のみ true。
    pub fn has_processed_artifacts(&self) -> bool {
        PROCESSED_PROGRESS_VALUES.contains(&self.progress) && self.processed_name().is_some()
    }
}

// =========================================================================
// Document / File
// =========================================================================

/// ドキュメント
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    id:       DocumentId,
    group_id: DocumentGroupId,
    name:     String,
}

impl Document {
    pub fn new(id: DocumentId, group_id: DocumentGroupId, name: impl Into<String>) -> Self {
        Self {
            id,
            group_id,
            name: name.into(),
        }
    }

    pub fn id(&self) -> DocumentId {
        self.id
    }

    pub fn group_id(&self) -> DocumentGroupId {
        self.group_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// アップロードされたファイル
///
/// `name` はアップロード時の相対パス（例: `line_01/data.sgy`）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct File {
    id:          FileId,
    document_id: DocumentId,
    name:        String,
    size:        i64,
}

impl File {
    pub fn new(id: FileId, document_id: DocumentId, name: impl Into<String>, size: i64) -> Self {
        Self {
            id,
            document_id,
            name: name.into(),
            size,
        }
    }

    pub fn id(&self) -> FileId {
        self.id
    }

    pub fn document_id(&self) -> DocumentId {
        self.document_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// ファイルサイズ（バイト）
    pub fn size(&self) -> i64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("Boundary", DocumentCategory::Boundary)]
    #[case("SBEST", DocumentCategory::Sbest)]
    #[case("SSS", DocumentCategory::Sss)]
    #[case("RasterO", DocumentCategory::RasterO)]
    #[case("Vector", DocumentCategory::Other("Vector".to_string()))]
    fn test_カテゴリ文字列をパースできる(
        #[case] input: &str,
        #[case] expected: DocumentCategory,
    ) {
        let category = DocumentCategory::parse(input);
        assert_eq!(category, expected);
        assert_eq!(category.as_str(), input);
    }

    #[test]
    fn test_カテゴリのパースは大文字小文字を区別する() {
        assert_eq!(
            DocumentCategory::parse("boundary"),
            DocumentCategory::Other("boundary".to_string())
        );
    }

    #[rstest]
    #[case(40, Some("result"), true)]
    #[case(11, Some("result"), true)]
    #[case(30, Some("result"), false)]
    #[case(40, Some(""), false)]
    #[case(40, None, false)]
    fn test_処理済み成果物の有無はprogressとprocessed_nameで決まる(
        #[case] progress: i16,
        #[case] processed_name: Option<&str>,
        #[case] expected: bool,
    ) {
        let group = DocumentGroup::new(
            DocumentGroupId::new(1),
            SiteId::new(1),
            "group",
            DocumentCategory::Image,
            progress,
            processed_name.map(String::from),
        );

        assert_eq!(group.has_processed_artifacts(), expected);
    }

    #[test]
    fn test_契約者の空のバケット設定は未設定として扱われる() {
        let contractor = Contractor::new(
            ContractorId::new(1),
            "Acme",
            Some("  ".to_string()),
            Some(String::new()),
        );

        assert_eq!(contractor.bucket_name(), None);
        assert_eq!(contractor.bucket_region(), None);
    }

    #[test]
    fn test_idはserdeで数値としてシリアライズされる() {
        let json = serde_json::to_string(&SiteId::new(42)).unwrap();
        assert_eq!(json, "42");
    }
}
