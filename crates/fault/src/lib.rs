//! # rootapi fault boundary
//!
//! 捕捉されなかった障害（既知の API 例外・想定外の例外・ランタイムエラー・
//! 終了時の致命的エラー）を、500 ステータスの JSON エラーレスポンスに変換する
//! プロセス全体の最終防衛線。
//!
//! ## 入口
//!
//! ```text
//! UncaughtExceptionHook ──┐
//! RuntimeErrorHook ───────┼──▶ ReportFormatter ──▶ {"errors": [ErrorReport]} + exit(1)
//! ShutdownHook ───────────┘
//! ```
//!
//! - [`FaultBoundary::handle_exception`]: 例外がスタックの最上位まで伝播したとき
//! - [`FaultBoundary::handle_runtime_error`]: 実行中の警告・通知・エラー
//! - [`FaultBoundary::handle_shutdown`]: プロセス終了時、最後のエラーが残っていれば報告
//!
//! 既知の API 例外（[`HttpException`] / [`ValidationException`]）は
//! 自分自身でレスポンスを送出するため、フォーマッタを経由しない。
//!
//! ## モジュール構成
//!
//! - [`boundary`] - FaultBoundary 本体とレポート整形
//! - [`capture`] - スタックスナップショットの取得
//! - [`error_type`] - 深刻度コードから表示ラベルへの変換
//! - [`exception`] - 例外モデル（`Exception` トレイト、`Fault`、`Trace`）
//! - [`hooks`] - panic フック・シャットダウンガードへの登録
//! - [`known`] - 自己応答型の既知例外
//! - [`report`] - エラーレポートのデータモデル
//! - [`runtime`] - ランタイムエラー
//! - [`sink`] - レスポンスの書き込み先
//!
//! ## 使用例
//!
//! ```rust
//! use rootapi_fault::{
//!     BoundaryConfig, BufferedResponse, Disposition, Fault, FaultBoundary, Uncaught,
//! };
//!
//! let boundary = FaultBoundary::new(BoundaryConfig {
//!     debug_app: true,
//!     ..BoundaryConfig::default()
//! });
//!
//! let mut sink = BufferedResponse::default();
//! let disposition = boundary.handle_exception(
//!     &Uncaught::unexpected(Fault::new("LogicException", "broken invariant")),
//!     &mut sink,
//! );
//!
//! assert_eq!(disposition, Disposition::Terminate { exit_code: 1 });
//! assert_eq!(sink.status().as_u16(), 500);
//! ```

pub mod boundary;
pub mod capture;
pub mod error_type;
pub mod exception;
pub mod hooks;
pub mod known;
pub mod report;
pub mod runtime;
pub mod sink;

pub use boundary::{
    BoundaryConfig,
    Disposition,
    EXIT_FAILURE,
    FaultBoundary,
    ReportInput,
    SuppressedPolicy,
};
pub use capture::{BacktraceCapture, StackCapture};
pub use error_type::{ErrorType, ErrorTypeLabel, translate};
pub use exception::{Exception, Fault, PanicSite, Trace, TraceFrame};
pub use known::{HttpException, KnownException, SelfReporting, Uncaught, ValidationException};
pub use report::{Context, ErrorEnvelope, ErrorReport, RawContext, RawFrame, ReportTitle, StackEntry, StackFrame};
pub use runtime::RuntimeError;
pub use sink::{BufferedResponse, CgiResponse, ResponseSink};
