//! # ヘルスチェックハンドラ
//!
//! ```text
//! GET /health
//! ```
//!
//! ## レスポンス例
//!
//! ```json
//! {
//!   "status": "healthy",
//!   "version": "0.1.0",
//!   "debug": false
//! }
//! ```

use std::sync::Arc;

use axum::{Json, extract::State};
use rootapi_fault::FaultBoundary;
use serde::Serialize;

/// ヘルスチェックレスポンス
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// 稼働状態（常に `"healthy"`）
    pub status:  &'static str,
    /// アプリケーションバージョン（Cargo.toml から取得）
    pub version: &'static str,
    /// 想定外の例外の詳細を応答に含めるか
    pub debug:   bool,
}

/// ヘルスチェックエンドポイント
///
/// 常に 200 OK を返す。`debug` でデバッグ応答が有効な環境かを確認できる。
pub async fn health_check(State(boundary): State<Arc<FaultBoundary>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status:  "healthy",
        version: env!("CARGO_PKG_VERSION"),
        debug:   boundary.config().debug_app,
    })
}

#[cfg(test)]
mod tests {
    use rootapi_fault::BoundaryConfig;

    use super::*;

    #[tokio::test]
    async fn test_デバッグ設定を含めて稼働状態を返す() {
        let boundary = Arc::new(FaultBoundary::new(BoundaryConfig {
            debug_app: true,
            ..BoundaryConfig::default()
        }));

        let Json(response) = health_check(State(boundary)).await;

        assert_eq!(response.status, "healthy");
        assert_eq!(response.version, env!("CARGO_PKG_VERSION"));
        assert!(response.debug);
    }
}
