//! # 削除スコープ
//!
//! キューから受け取った削除リクエストを検証済みのスコープに変換する。
//!
//! - [`CleansingMessage`]: キューのペイロードそのもの（未検証）
//! - [`ScopeRequest`]: 種別と ID が検証済みのリクエスト
//!
//! 種別の比較は大文字小文字を区別する（`"Contractor"` は不正）。

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, IntoStaticStr};

use crate::DomainError;

/// 削除スコープの種別
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
    IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ScopeType {
    /// 契約者と、その配下のすべてのプロジェクト・サイト
    Contractor,
    /// プロジェクトと、その配下のすべてのサイト
    Project,
    /// 単一のサイト
    Site,
}

impl ScopeType {
    /// 結果レコードの `message` に使う説明文
    pub fn description(self) -> &'static str {
        match self {
            Self::Contractor => {
                "Deleting all files for contractor and its related projects and sites"
            }
            Self::Project => "Deleting all files for project and its related sites",
            Self::Site => "Deleting all files for site",
        }
    }
}

/// 種別が不正なメッセージに対する説明文
pub const UNKNOWN_SCOPE_DESCRIPTION: &str = "Unknown cleansing operation";

/// キューから受け取る削除メッセージ
///
/// ```json
/// { "type": "site", "id": 42 }
/// ```
///
/// `type` は検証前の生文字列として保持する。検証は [`ScopeRequest::try_from`] で行う。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleansingMessage {
    #[serde(rename = "type")]
    pub scope_type: String,
    pub id:         i64,
}

impl CleansingMessage {
    pub fn new(scope_type: impl Into<String>, id: i64) -> Self {
        Self {
            scope_type: scope_type.into(),
            id,
        }
    }
}

/// 検証済みの削除リクエスト
///
/// 生成後は不変。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeRequest {
    scope_type: ScopeType,
    scope_id:   i64,
}

impl ScopeRequest {
    /// 種別と ID から作成する
    ///
    /// # Errors
    ///
    /// `scope_id` が正でない場合は [`DomainError::Validation`]。
    pub fn new(scope_type: ScopeType, scope_id: i64) -> Result<Self, DomainError> {
        if scope_id <= 0 {
            return Err(DomainError::Validation(format!(
                "{scope_type} の ID は正の整数である必要があります: {scope_id}"
            )));
        }
        Ok(Self {
            scope_type,
            scope_id,
        })
    }

    pub fn scope_type(&self) -> ScopeType {
        self.scope_type
    }

    pub fn scope_id(&self) -> i64 {
        self.scope_id
    }
}

impl TryFrom<&CleansingMessage> for ScopeRequest {
    type Error = DomainError;

    fn try_from(message: &CleansingMessage) -> Result<Self, Self::Error> {
        let scope_type = message.scope_type.parse::<ScopeType>().map_err(|_| {
            DomainError::Validation(format!("invalid cleansing type: {}", message.scope_type))
        })?;
        Self::new(scope_type, message.id)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("contractor", ScopeType::Contractor)]
    #[case("project", ScopeType::Project)]
    #[case("site", ScopeType::Site)]
    fn test_有効な種別からスコープを作成できる(
        #[case] raw: &str,
        #[case] expected: ScopeType,
    ) {
        let request = ScopeRequest::try_from(&CleansingMessage::new(raw, 7)).unwrap();

        assert_eq!(request.scope_type(), expected);
        assert_eq!(request.scope_id(), 7);
        assert_eq!(request.scope_type().to_string(), raw);
    }

    #[rstest]
    #[case("")]
    #[case("bogus")]
    #[case("Contractor")]
    #[case("PROJECT")]
    fn test_不正な種別はバリデーションエラーになる(#[case] raw: &str) {
        let result = ScopeRequest::try_from(&CleansingMessage::new(raw, 1));

        let Err(DomainError::Validation(message)) = result else {
            panic!("バリデーションエラーになるべき: {result:?}");
        };
        assert_eq!(message, format!("invalid cleansing type: {raw}"));
    }

    #[rstest]
    #[case(0)]
    #[case(-1)]
    fn test_正でないidはバリデーションエラーになる(#[case] id: i64) {
        let result = ScopeRequest::try_from(&CleansingMessage::new("site", id));

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[rstest]
    #[case(ScopeType::Contractor, "Deleting all files for contractor and its related projects and sites")]
    #[case(ScopeType::Project, "Deleting all files for project and its related sites")]
    #[case(ScopeType::Site, "Deleting all files for site")]
    fn test_種別ごとの説明文(#[case] scope_type: ScopeType, #[case] expected: &str) {
        assert_eq!(scope_type.description(), expected);
    }

    #[test]
    fn test_メッセージをjsonからデシリアライズできる() {
        let message: CleansingMessage =
            serde_json::from_str(r#"{"type":"project","id":456}"#).unwrap();

        assert_eq!(message, CleansingMessage::new("project", 456));
    }

    #[test]
    fn test_idが数値でないjsonはデシリアライズに失敗する() {
        let result = serde_json::from_str::<CleansingMessage>(r#"{"type":"site","id":"42"}"#);

        assert!(result.is_err());
    }
}
