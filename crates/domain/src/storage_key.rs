//! # オブジェクトキー導出
//!
//! 階層上の位置（Project, Site, DocumentGroup, File）からオブジェクトストレージの
//! キーを導出する純粋関数群。I/O を行わず、失敗もしない。
//!
//! ## キーの構造
//!
//! ```text
//! {project.code}/{site.code}/00_Upload/{file_name}
//! {project.code}/{site.code}/01_Processed/{processed_name}.geojson
//! {project.code}/{site.code}/01_Processed/{processed_name}_B01.tif   (ラスタ系のみ)
//! ```
//!
//! 分割命名カテゴリではファイル名 `a/b` が `a/Raw/b` になる。
//! セグメントが 2 つ未満の場合は元の名前のまま使う。

use serde::{Deserialize, Serialize};

use crate::hierarchy::{DocumentCategory, DocumentGroup, File, Project, Site};

/// アップロード原本を置くディレクトリ
pub const UPLOAD_DIR: &str = "00_Upload";

/// 処理済み成果物を置くディレクトリ
pub const PROCESSED_DIR: &str = "01_Processed";

/// ラスタ系カテゴリで追加される帯域ファイルのサフィックス
pub const RASTER_BAND_SUFFIXES: [&str; 3] = ["_B01.tif", "_B02.tif", "_B03.tif"];

/// ファイル名の変換規則
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NamingRule {
    /// 保存名をそのまま使う
    Verbatim,
    /// `{seg0}/Raw/{seg1}` に変換する
    SplitRaw,
}

impl DocumentCategory {
    fn naming_rule(&self) -> NamingRule {
        match self {
            Self::Boundary
            | Self::LineRoute
            | Self::Sbest
            | Self::Sbp
            | Self::SoilSample
            | Self::Sss => NamingRule::SplitRaw,
            _ => NamingRule::Verbatim,
        }
    }

    /// ファイル名を `{seg0}/Raw/{seg1}` に分割して格納するカテゴリか
    pub fn splits_file_name(&self) -> bool {
        self.naming_rule() == NamingRule::SplitRaw
    }

    /// 処理済み成果物にラスタ帯域ファイルが含まれるか
    pub fn has_raster_bands(&self) -> bool {
        matches!(self, Self::RasterD | Self::RasterO | Self::Image)
    }
}

/// オブジェクトの格納先（リージョンとバケット）
///
/// `region` が空文字列の場合は既定リージョンを意味する。
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StorageLocation {
    pub region: String,
    pub bucket: String,
}

impl StorageLocation {
    pub fn new(region: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            bucket: bucket.into(),
        }
    }
}

/// 削除対象の 1 オブジェクト
///
/// 同一性は (region, bucket, key) で決まる。`size` は使用量の減算にのみ使い、
/// 処理済み成果物のようにサイズが DB にないものは `None`。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageObjectRef {
    pub region: String,
    pub bucket: String,
    pub key:    String,
    pub size:   Option<i64>,
}

impl StorageObjectRef {
    pub fn new(location: &StorageLocation, key: impl Into<String>, size: Option<i64>) -> Self {
        Self {
            region: location.region.clone(),
            bucket: location.bucket.clone(),
            key: key.into(),
            size,
        }
    }

    /// 格納先を取り出す
    pub fn location(&self) -> StorageLocation {
        StorageLocation::new(&self.region, &self.bucket)
    }
}

/// アップロード原本のキーを導出する
pub fn upload_key(project: &Project, site: &Site, group: &DocumentGroup, file: &File) -> String {
    format!(
        "{}/{}/{UPLOAD_DIR}/{}",
        project.code(),
        site.code(),
        object_name(group.category(), file.name())
    )
}

/// カテゴリの規則に従ってファイル名を変換する
///
/// 分割が必要でもセグメントが足りない場合は元の名前を返す。
/// 3 つ目以降のセグメントは使わない。
pub fn object_name(category: &DocumentCategory, file_name: &str) -> String {
    match category.naming_rule() {
        NamingRule::Verbatim => file_name.to_string(),
        NamingRule::SplitRaw => {
            let mut segments = file_name.split('/');
            match (segments.next(), segments.next()) {
                (Some(first), Some(second)) => format!("{first}/Raw/{second}"),
                _ => file_name.to_string(),
            }
        }
    }
}

/// 処理済み成果物のキーを導出する
///
/// 成果物が存在しないグループでは空を返す。
pub fn processed_keys(project: &Project, site: &Site, group: &DocumentGroup) -> Vec<String> {
    let Some(name) = group
        .processed_name()
        .filter(|_| group.has_processed_artifacts())
    else {
        return Vec::new();
    };

    let base = format!("{}/{}/{PROCESSED_DIR}/{name}", project.code(), site.code());

    let mut keys = vec![format!("{base}.geojson")];
    if group.category().has_raster_bands() {
        keys.extend(RASTER_BAND_SUFFIXES.iter().map(|suffix| format!("{base}{suffix}")));
    }
    keys
}
