//! # アプリケーション構築
//!
//! アプリケーションのルーターに fault boundary のレイヤーを組み付ける。
//! `main.rs` は設定の読み込みとサーバー起動に集中する。

use std::sync::Arc;

use axum::{Router, middleware::from_fn_with_state, routing::get};
use rootapi_fault::FaultBoundary;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

use crate::{
    handler::health_check,
    middleware::{fault_boundary, handle_panic},
};

/// ルーターに `/health` とリクエスト単位の境界を追加する
///
/// レイヤーは後に追加したものほど外側になる:
/// `TraceLayer` → `fault_boundary` → `CatchPanicLayer` → ハンドラ。
pub fn build_app(routes: Router, boundary: Arc<FaultBoundary>) -> Router {
    let health = Router::new()
        .route("/health", get(health_check))
        .with_state(Arc::clone(&boundary));

    routes
        .merge(health)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(from_fn_with_state(boundary, fault_boundary))
        .layer(TraceLayer::new_for_http())
}
