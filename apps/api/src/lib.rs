//! # rootapi API サーバー
//!
//! fault boundary を axum に組み込む HTTP ホスト。
//!
//! ## リクエスト単位の境界
//!
//! 1 つのプロセスが多数のリクエストを処理するため、
//! 「プロセスの終了」はリクエストの終了に読み替える:
//! 境界が書いた応答がそのリクエストの最終応答になり、ハンドラには戻らない。
//!
//! ```text
//! TraceLayer
//!   └── fault_boundary ミドルウェア（ApiFault を FaultBoundary に渡す）
//!         └── CatchPanicLayer（panic を ApiFault に変換する）
//!               └── ハンドラ（Result<_, ApiFault> を返す）
//! ```
//!
//! ## モジュール構成
//!
//! - [`app_builder`] - ルーターにレイヤーを組み付ける
//! - [`config`] - アプリケーション設定（環境変数からの読み込み）
//! - [`error`] - ハンドラが返すエラーと設定エラー
//! - [`handler`] - HTTP リクエストハンドラ
//! - [`middleware`] - リクエスト単位の fault boundary

pub mod app_builder;
pub mod config;
pub mod error;
pub mod handler;
pub mod middleware;
