//! # リクエスト単位の fault boundary
//!
//! ハンドラが返した [`ApiFault`] と、ハンドラ内の panic を
//! [`FaultBoundary`] に渡して最終応答を決める。
//!
//! ## 処理結果と応答
//!
//! | Disposition | 応答 |
//! |-------------|------|
//! | `Delegated` | 既知の例外が書いた応答 |
//! | `Terminate` | フォーマッタが書いた 500 |
//! | `Suppressed` | 本文なしの 500 |
//!
//! ## panic の扱い
//!
//! ミドルウェアはハンドラを [`REQUEST_SCOPE`] の中で実行する。
//! プロセスの panic フックは [`in_request_scope`] で判定して処理を委ね、
//! `CatchPanicLayer` が [`handle_panic`] で panic を `ApiFault` に変換する。
//! 発生位置とトレースは panic フックが発生地点で記録したものを使う。

use std::{any::Any, sync::Arc};

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use rootapi_fault::{BufferedResponse, Disposition, Fault, FaultBoundary, hooks::take_panic_site};

use crate::error::{ApiFault, PendingFault};

tokio::task_local! {
    static REQUEST_SCOPE: ();
}

/// 現在のタスクがリクエスト処理中か
pub fn in_request_scope() -> bool {
    REQUEST_SCOPE.try_with(|_| ()).is_ok()
}

/// ハンドラの応答に載った障害を [`FaultBoundary`] に渡す
pub async fn fault_boundary(
    State(boundary): State<Arc<FaultBoundary>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut response = REQUEST_SCOPE.scope((), next.run(request)).await;
    let Some(PendingFault(fault)) = response.extensions_mut().remove::<PendingFault>() else {
        return response;
    };

    let mut sink = BufferedResponse::default();
    let disposition = match fault.as_ref() {
        ApiFault::Exception(uncaught) => boundary.handle_exception(uncaught, &mut sink),
        ApiFault::Runtime(error) => boundary.handle_runtime_error(error, &mut sink),
    };
    tracing::debug!(%method, %path, ?disposition, "リクエストの障害を処理しました");

    match disposition {
        Disposition::Delegated | Disposition::Terminate { .. } => sink.into_http().map(Body::from),
        Disposition::Suppressed | Disposition::Clean => response,
    }
}

/// `CatchPanicLayer::custom` に渡す panic ハンドラ
pub fn handle_panic(payload: Box<dyn Any + Send + 'static>) -> Response {
    let fault = Fault::from_panic(payload.as_ref(), take_panic_site());
    ApiFault::from(fault).into_response()
}
