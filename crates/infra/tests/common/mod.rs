//! テスト共通フィクスチャ
//!
//! 包含階層の行を直接 SQL で投入するヘルパー。Rust の統合テスト規約に従い
//! `tests/common/mod.rs` に配置。

// 各テストファイルが独立したクレートとしてコンパイルされるため、
// 使用しない関数に dead_code 警告が出る。モジュール全体で抑制する。
#![allow(dead_code)]

use sqlx::PgPool;

/// 投入した階層の ID 一式
#[derive(Debug, Clone, Copy)]
pub struct SeededHierarchy {
    pub contractor_id: i64,
    pub project_id:    i64,
    pub site_id:       i64,
    pub group_id:      i64,
    pub document_id:   i64,
    pub file_id:       i64,
}

pub async fn insert_contractor(pool: &PgPool, bucket: Option<&str>, region: Option<&str>) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO contractor (name, aws_bucket_name, aws_bucket_region)
        VALUES ('テスト契約者', $1, $2)
        RETURNING id
        "#,
    )
    .bind(bucket)
    .bind(region)
    .fetch_one(pool)
    .await
    .expect("契約者の作成に失敗")
}

pub async fn insert_project(pool: &PgPool, contractor_id: i64, code: &str, usage: i64) -> i64 {
    let project_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO project (name, code, file_size_usage)
        VALUES ('テストプロジェクト', $1, $2)
        RETURNING id
        "#,
    )
    .bind(code)
    .bind(usage)
    .fetch_one(pool)
    .await
    .expect("プロジェクトの作成に失敗");

    sqlx::query("INSERT INTO contractor_project (contractor_id, project_id) VALUES ($1, $2)")
        .bind(contractor_id)
        .bind(project_id)
        .execute(pool)
        .await
        .expect("契約者とプロジェクトの関連付けに失敗");

    project_id
}

pub async fn insert_site(pool: &PgPool, project_id: i64, code: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO site (project_id, code, name) VALUES ($1, $2, 'テストサイト') RETURNING id",
    )
    .bind(project_id)
    .bind(code)
    .fetch_one(pool)
    .await
    .expect("サイトの作成に失敗")
}

pub async fn insert_group(pool: &PgPool, site_id: i64, category: &str) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO document_group (site_id, name, category, progress, processed_name)
        VALUES ($1, 'テストグループ', $2, 40, 'processed')
        RETURNING id
        "#,
    )
    .bind(site_id)
    .bind(category)
    .fetch_one(pool)
    .await
    .expect("ドキュメントグループの作成に失敗")
}

pub async fn insert_document(pool: &PgPool, group_id: i64) -> i64 {
    sqlx::query_scalar("INSERT INTO document (group_id, name) VALUES ($1, 'doc') RETURNING id")
        .bind(group_id)
        .fetch_one(pool)
        .await
        .expect("ドキュメントの作成に失敗")
}

pub async fn insert_file(pool: &PgPool, document_id: i64, name: &str, size: i64) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO file (document_id, name, size) VALUES ($1, $2, $3) RETURNING id",
    )
    .bind(document_id)
    .bind(name)
    .bind(size)
    .fetch_one(pool)
    .await
    .expect("ファイルの作成に失敗")
}

/// 契約者から 1 ファイルまでの一本の階層を投入する
pub async fn seed_hierarchy(pool: &PgPool) -> SeededHierarchy {
    let contractor_id = insert_contractor(pool, Some("tenant-bucket"), Some("eu-west-1")).await;
    let project_id = insert_project(pool, contractor_id, "PRJ", 1_000).await;
    let site_id = insert_site(pool, project_id, "S01").await;
    let group_id = insert_group(pool, site_id, "Image").await;
    let document_id = insert_document(pool, group_id).await;
    let file_id = insert_file(pool, document_id, "photo.jpg", 300).await;

    SeededHierarchy {
        contractor_id,
        project_id,
        site_id,
        group_id,
        document_id,
        file_id,
    }
}

/// テーブルの行数を数える
pub async fn count_rows(pool: &PgPool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("行数の取得に失敗")
}
