//! # API エラーハンドリング
//!
//! ハンドラが返すエラー（[`ApiFault`]）と、起動時の設定エラー（[`ConfigError`]）を定義する。
//!
//! ## 設計方針
//!
//! - ハンドラは応答本文を自分で組み立てない。`ApiFault` をそのまま返す
//! - `IntoResponse` は空の 500 を返し、`ApiFault` をレスポンスの extensions に載せる
//! - 本文は [`fault_boundary`](crate::middleware::fault_boundary) ミドルウェアが
//!   [`FaultBoundary`](rootapi_fault::FaultBoundary) を通して書き直す
//!
//! ## エラーの流れ
//!
//! ```text
//! ハンドラ: Err(ApiFault)
//!        ↓ IntoResponse
//! 500 + PendingFault（extensions）
//!        ↓ fault_boundary ミドルウェア
//! 委譲 / フォーマッタ / 抑制
//! ```
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use rootapi_api::error::ApiFault;
//! use rootapi_fault::HttpException;
//!
//! async fn get_item(Path(id): Path<u64>) -> Result<Json<Item>, ApiFault> {
//!     let item = store
//!         .find(id)
//!         .ok_or_else(|| HttpException::new(StatusCode::NOT_FOUND, "Item not found"))?;
//!     Ok(Json(item))
//! }
//! ```

use std::{fmt, sync::Arc};

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use rootapi_fault::{Fault, HttpException, RuntimeError, Uncaught, ValidationException};
use thiserror::Error;

/// 設定読み込みエラー
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("環境変数 {key} の値が不正です: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// ハンドラからリクエスト境界へ伝播する障害
#[derive(Debug)]
pub enum ApiFault {
    /// 例外（既知の API 例外または想定外の例外）
    Exception(Uncaught),
    /// 例外を伴わないランタイムエラー
    Runtime(RuntimeError),
}

impl fmt::Display for ApiFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exception(uncaught) => fmt::Display::fmt(uncaught.as_exception(), f),
            Self::Runtime(error) => fmt::Display::fmt(error, f),
        }
    }
}

impl From<Uncaught> for ApiFault {
    fn from(uncaught: Uncaught) -> Self {
        Self::Exception(uncaught)
    }
}

impl From<HttpException> for ApiFault {
    fn from(e: HttpException) -> Self {
        Self::Exception(e.into())
    }
}

impl From<ValidationException> for ApiFault {
    fn from(e: ValidationException) -> Self {
        Self::Exception(e.into())
    }
}

impl From<Fault> for ApiFault {
    fn from(fault: Fault) -> Self {
        Self::Exception(fault.into())
    }
}

impl From<RuntimeError> for ApiFault {
    fn from(error: RuntimeError) -> Self {
        Self::Runtime(error)
    }
}

/// `?` で伝播した任意のエラーは想定外の例外として扱う
impl From<anyhow::Error> for ApiFault {
    #[track_caller]
    fn from(err: anyhow::Error) -> Self {
        Self::Exception(Uncaught::unexpected(Fault::from_error(&*err)))
    }
}

/// ミドルウェアに引き渡す前の障害
///
/// レスポンスの extensions は `Clone` を要求するため `Arc` で包む。
#[derive(Debug, Clone)]
pub struct PendingFault(pub Arc<ApiFault>);

impl IntoResponse for ApiFault {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(PendingFault(Arc::new(self)));
        response
    }
}
