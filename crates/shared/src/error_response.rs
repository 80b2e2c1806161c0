//! # エラーレスポンス（JSON:API Error Objects）
//!
//! 自己応答型の例外（HTTP 例外・バリデーション例外）が送出するエラー文書を提供する。
//!
//! ## 設計
//!
//! - `ErrorResponse` は純粋なデータ構造（`Serialize` / `Deserialize` のみ）
//! - レスポンスへの書き込みは呼び出し側の責務（shared に http / axum 依存を入れない）
//! - エラー文書は常に `{"errors": [...]}` の封筒に包む
//! - よく使うエラー種別は便利コンストラクタで提供する

use serde::{Deserialize, Serialize};

/// エラーの発生源（JSON Pointer）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSource {
    pub pointer: String,
}

/// エラーオブジェクト（JSON:API）
///
/// `status` は HTTP ステータスコード、`code` はアプリケーション固有のエラーコード。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code:   Option<String>,
    pub title:  String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ErrorSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta:   Option<serde_json::Value>,
}

impl ErrorResponse {
    /// 汎用コンストラクタ
    pub fn new(status: u16, title: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            title: title.into(),
            detail: None,
            source: None,
            meta: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// 発生源のポインタを設定する（例: `/data/attributes/email`）
    pub fn with_pointer(mut self, pointer: impl Into<String>) -> Self {
        self.source = Some(ErrorSource {
            pointer: pointer.into(),
        });
        self
    }

    pub fn with_meta(mut self, meta: serde_json::Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// 400 Bad Request
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(400, "Bad Request").with_detail(detail)
    }

    /// 401 Unauthorized
    pub fn unauthorized(detail: impl Into<String>) -> Self {
        Self::new(401, "Unauthorized").with_detail(detail)
    }

    /// 403 Forbidden
    pub fn forbidden(detail: impl Into<String>) -> Self {
        Self::new(403, "Forbidden").with_detail(detail)
    }

    /// 404 Not Found
    pub fn not_found(detail: impl Into<String>) -> Self {
        Self::new(404, "Not Found").with_detail(detail)
    }

    /// 422 Validation Error
    ///
    /// `field` は `/data/attributes/{field}` のポインタとして設定される。
    pub fn validation_error(field: &str, detail: impl Into<String>) -> Self {
        Self::new(422, "Validation Error")
            .with_detail(detail)
            .with_pointer(format!("/data/attributes/{field}"))
    }

    /// 500 Internal Server Error
    ///
    /// detail は固定値（内部情報を漏らさないため）。
    pub fn internal_error() -> Self {
        Self::new(500, "Internal Server Error").with_detail("An unexpected error occurred")
    }
}

/// エラー文書
///
/// 1 件のみでも必ず配列に包んで返す。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDocument {
    pub errors: Vec<ErrorResponse>,
}

impl ErrorDocument {
    pub fn single(error: ErrorResponse) -> Self {
        Self {
            errors: vec![error],
        }
    }
}

impl From<Vec<ErrorResponse>> for ErrorDocument {
    fn from(errors: Vec<ErrorResponse>) -> Self {
        Self { errors }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_new_で必須フィールドのみ設定される() {
        let error = ErrorResponse::new(418, "I'm a teapot");

        assert_eq!(error.status, 418);
        assert_eq!(error.title, "I'm a teapot");
        assert_eq!(error.code, None);
        assert_eq!(error.detail, None);
        assert_eq!(error.source, None);
    }

    #[test]
    fn test_validation_error_がポインタを組み立てる() {
        let error = ErrorResponse::validation_error("email", "must not be empty");

        assert_eq!(error.status, 422);
        assert_eq!(
            error.source,
            Some(ErrorSource {
                pointer: "/data/attributes/email".to_string(),
            })
        );
        assert_eq!(error.detail.as_deref(), Some("must not be empty"));
    }

    #[test]
    fn test_全便利コンストラクタのstatusが正しい() {
        assert_eq!(ErrorResponse::bad_request("").status, 400);
        assert_eq!(ErrorResponse::unauthorized("").status, 401);
        assert_eq!(ErrorResponse::forbidden("").status, 403);
        assert_eq!(ErrorResponse::not_found("").status, 404);
        assert_eq!(ErrorResponse::validation_error("f", "").status, 422);
        assert_eq!(ErrorResponse::internal_error().status, 500);
    }

    #[test]
    fn test_jsonシリアライズで未設定フィールドが省略される() {
        let document = ErrorDocument::single(ErrorResponse::not_found("no such user"));
        let json = serde_json::to_value(&document).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "errors": [{
                    "status": 404,
                    "title": "Not Found",
                    "detail": "no such user"
                }]
            })
        );
    }

    #[test]
    fn test_jsonデシリアライズが正しく動作する() {
        let json = r#"{
            "errors": [{
                "status": 422,
                "code": "E42",
                "title": "Validation Error",
                "source": {"pointer": "/data/attributes/name"}
            }]
        }"#;
        let document: ErrorDocument = serde_json::from_str(json).unwrap();

        assert_eq!(document.errors.len(), 1);
        assert_eq!(document.errors[0].code.as_deref(), Some("E42"));
        assert_eq!(
            document.errors[0].source.as_ref().map(|s| s.pointer.as_str()),
            Some("/data/attributes/name")
        );
    }
}
