//! # rootapi 共有ユーティリティ
//!
//! このクレートは、rootapi の各クレートで使用される共通ユーティリティを提供する。
//!
//! ## 設計方針
//!
//! - fault / api の両クレートから依存される
//! - フレームワーク（axum）に依存しない純粋なデータ構造のみを配置
//! - 外部クレートへの依存は最小限に抑える

pub mod error_response;
pub mod observability;

pub use error_response::{ErrorDocument, ErrorResponse, ErrorSource};
