//! # HTTP リクエストハンドラ
//!
//! axum のルートに対応するハンドラ関数を定義する。
//!
//! ## モジュール構成
//!
//! ```text
//! handler.rs          # 親モジュール（re-export）
//! └── handler/
//!     └── health.rs   # ヘルスチェックハンドラ
//! ```
//!
//! アプリケーション固有のルートは [`build_app`](crate::app_builder::build_app) に
//! `Router` として渡す。

pub mod health;

pub use health::{HealthResponse, health_check};
