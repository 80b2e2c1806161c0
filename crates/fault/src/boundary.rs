//! # FaultBoundary
//!
//! 3 つの入口（例外・ランタイムエラー・シャットダウン）と、
//! それらが合流するレポートフォーマッタ。
//!
//! ## 設計方針
//!
//! - グローバルな状態を暗黙に捕捉しない。設定とスタック取得処理はコンストラクタで受け取る
//! - 各入口は応答を [`ResponseSink`] に書き、結果を [`Disposition`] で返す
//! - フォーマッタを通った経路は必ず `Terminate { exit_code: 1 }` になる。
//!   プロセス終了はホスト側が [`Disposition::enforce`] で行う
//!
//! ## デバッグフラグの扱い
//!
//! | 経路 | `debug_app = true` | `debug_app = false` |
//! |------|-------------------|---------------------|
//! | 既知の API 例外 | 委譲 | 委譲 |
//! | 想定外の例外 | フォーマッタ | [`SuppressedPolicy`] に従う（既定は何も書かない） |
//! | ランタイムエラー | フォーマッタ | フォーマッタ |
//! | シャットダウン時の最後のエラー | フォーマッタ | フォーマッタ |

use std::sync::{LazyLock, Mutex, PoisonError};

use http::StatusCode;
use regex::Regex;
use rootapi_shared::{ErrorDocument, ErrorResponse};

use crate::{
    capture::{BacktraceCapture, StackCapture},
    error_type::translate,
    exception::Trace,
    known::{SelfReporting, Uncaught},
    report::{
        Context,
        ErrorEnvelope,
        ErrorReport,
        REPORT_ID,
        RawContext,
        ReportContext,
        ReportMeta,
        ReportTitle,
        StackEntry,
    },
    runtime::RuntimeError,
    sink::{JSON_CONTENT_TYPE, ResponseSink, TEXT_CONTENT_TYPE},
};

/// フォーマッタを通った後の終了コード
pub const EXIT_FAILURE: i32 = 1;

/// ランタイムエラー経路で取得するスタックの既定の深さ
pub const DEFAULT_STACK_DEPTH: usize = 5;

/// トレース行頭のフレーム番号（`#12 `）
static FRAME_INDEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#\d+ ").expect("valid frame index regex"));

/// デバッグ無効時の想定外例外の扱い
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum SuppressedPolicy {
    /// 何も書かない
    #[default]
    Drop,
    /// 詳細を含まない 500 応答を返す
    Generic,
}

#[derive(Debug, Clone)]
pub struct BoundaryConfig {
    pub debug_app:         bool,
    pub suppressed_policy: SuppressedPolicy,
    pub stack_depth:       usize,
}

impl Default for BoundaryConfig {
    fn default() -> Self {
        Self {
            debug_app:         false,
            suppressed_policy: SuppressedPolicy::default(),
            stack_depth:       DEFAULT_STACK_DEPTH,
        }
    }
}

/// 入口ごとの処理結果
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 既知の例外が自分で応答した
    Delegated,
    /// 想定外の例外を報告しなかった
    Suppressed,
    /// 報告すべきものがなかった
    Clean,
    /// 応答を書き終えた。以降アプリケーションのコードを実行してはならない
    Terminate { exit_code: i32 },
}

impl Disposition {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Terminate { .. })
    }

    /// `Terminate` ならプロセスを終了する
    pub fn enforce(self) {
        if let Self::Terminate { exit_code } = self {
            std::process::exit(exit_code);
        }
    }
}

/// フォーマッタへの入力
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub code:    i64,
    pub message: &'a str,
    pub file:    &'a str,
    pub line:    u32,
    pub context: Context<'a>,
}

/// プロセス全体の最終防衛線
///
/// 起動時に 1 度だけ構築し、`Arc` で panic フック・シャットダウンガード・
/// HTTP ミドルウェアと共有する。
pub struct FaultBoundary {
    config:     BoundaryConfig,
    capture:    Box<dyn StackCapture>,
    last_error: Mutex<Option<RuntimeError>>,
}

impl std::fmt::Debug for FaultBoundary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FaultBoundary")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl FaultBoundary {
    pub fn new(config: BoundaryConfig) -> Self {
        Self::with_capture(config, BacktraceCapture)
    }

    pub fn with_capture(config: BoundaryConfig, capture: impl StackCapture + 'static) -> Self {
        Self {
            config,
            capture: Box::new(capture),
            last_error: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &BoundaryConfig {
        &self.config
    }

    /// UncaughtExceptionHook
    pub fn handle_exception(&self, uncaught: &Uncaught, sink: &mut dyn ResponseSink) -> Disposition {
        let exception = match uncaught {
            Uncaught::Known(known) => {
                known.send(sink);
                tracing::error!(
                    exception = %known.as_exception(),
                    "既知の API 例外を応答しました"
                );
                return Disposition::Delegated;
            }
            Uncaught::Unexpected(exception) => exception.as_ref(),
        };

        if self.config.debug_app {
            let title = format!("Unexpected {}", exception.type_name());
            return self.report(
                ReportInput {
                    code:    exception.code(),
                    message: exception.message(),
                    file:    exception.file(),
                    line:    exception.line(),
                    context: Context::Faulted(exception),
                },
                ReportTitle::Given(title),
                sink,
            );
        }

        match self.config.suppressed_policy {
            SuppressedPolicy::Drop => {
                tracing::debug!(
                    exception_type = exception.type_name(),
                    "デバッグ無効のため想定外の例外を報告しません"
                );
                Disposition::Suppressed
            }
            SuppressedPolicy::Generic => {
                tracing::error!(exception = %exception, "想定外の例外が発生しました");
                sink.clean();
                sink.set_status(StatusCode::INTERNAL_SERVER_ERROR);
                sink.set_content_type(JSON_CONTENT_TYPE);
                let document = ErrorDocument::single(ErrorResponse::internal_error());
                match serde_json::to_string(&document) {
                    Ok(body) => sink.write(&body),
                    Err(e) => sink.write(&ironic(&e)),
                }
                Disposition::Terminate {
                    exit_code: EXIT_FAILURE,
                }
            }
        }
    }

    /// RuntimeErrorHook
    ///
    /// デバッグフラグに関わらず常に報告する。
    pub fn handle_runtime_error(&self, error: &RuntimeError, sink: &mut dyn ResponseSink) -> Disposition {
        let context = match &error.context {
            Some(raw) => Context::Raw(raw.as_ref()),
            None => Context::None,
        };
        self.report(
            ReportInput {
                code: error.severity,
                message: &error.message,
                file: &error.file,
                line: error.line,
                context,
            },
            ReportTitle::Default,
            sink,
        )
    }

    /// 最後のエラーを記録する（後から記録したもので上書きする）
    pub fn record_last_error(&self, error: RuntimeError) {
        let mut slot = self
            .last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *slot = Some(error);
    }

    pub fn take_last_error(&self) -> Option<RuntimeError> {
        self.last_error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// ShutdownHook
    ///
    /// 最後のエラーが残っていれば、深刻度のラベルをタイトルにして報告する。
    pub fn handle_shutdown(&self, sink: &mut dyn ResponseSink) -> Disposition {
        let Some(error) = self.take_last_error() else {
            return Disposition::Clean;
        };
        self.report(
            ReportInput {
                code:    error.severity,
                message: &error.message,
                file:    &error.file,
                line:    error.line,
                context: Context::None,
            },
            ReportTitle::Given(translate(error.severity).to_string()),
            sink,
        )
    }

    /// ReportFormatter
    ///
    /// 書きかけの本文を破棄し、エラーレポートを 500 で書き出す。
    /// 直列化に失敗した場合はプレーンテキストで理由を書き出す。
    pub fn report(
        &self,
        input: ReportInput<'_>,
        title: ReportTitle,
        sink: &mut dyn ResponseSink,
    ) -> Disposition {
        sink.clean();

        let (context, stack) = self.resolve(&input);
        let previous;
        let context = match context {
            Resolved::Null => ReportContext::Null,
            Resolved::Raw(raw) => ReportContext::Raw(raw),
            Resolved::Previous(text) => {
                previous = text;
                ReportContext::Previous(&previous)
            }
        };

        let envelope = ErrorEnvelope::single(ErrorReport {
            id: REPORT_ID,
            code: input.code,
            title: title.as_str(),
            detail: input.message,
            context,
            meta: ReportMeta {
                line: input.line,
                file: input.file,
                stack,
            },
        });

        tracing::error!(
            code = input.code,
            title = title.as_str(),
            file = input.file,
            line = input.line,
            "{}",
            input.message
        );

        sink.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        match serde_json::to_string(&envelope) {
            Ok(body) => {
                sink.set_content_type(JSON_CONTENT_TYPE);
                sink.write(&body);
            }
            Err(e) => {
                tracing::error!(error = %e, "エラーレポートの直列化に失敗しました");
                sink.set_content_type(TEXT_CONTENT_TYPE);
                sink.write(&ironic(&e));
            }
        }

        Disposition::Terminate {
            exit_code: EXIT_FAILURE,
        }
    }

    fn resolve<'a>(&self, input: &ReportInput<'a>) -> (Resolved<'a>, Vec<StackEntry>) {
        match input.context {
            Context::Faulted(exception) => {
                let context = match exception.previous() {
                    Some(previous) => Resolved::Previous(format!("[Previous] {previous}")),
                    None => Resolved::Null,
                };
                (context, trace_lines(exception.trace()))
            }
            Context::Raw(raw) => (Resolved::Raw(raw), self.snapshot()),
            Context::None => (Resolved::Null, self.snapshot()),
        }
    }

    fn snapshot(&self) -> Vec<StackEntry> {
        self.capture
            .capture(self.config.stack_depth)
            .into_iter()
            .map(|frame| StackEntry::Frame(frame.strip_args()))
            .collect()
    }
}

enum Resolved<'a> {
    Null,
    Raw(&'a dyn RawContext),
    Previous(String),
}

/// トレース文字列を行に分け、行頭のフレーム番号を取り除く
fn trace_lines(trace: &Trace) -> Vec<StackEntry> {
    trace
        .to_string()
        .split('\n')
        .map(|line| StackEntry::Line(FRAME_INDEX.replace(line, "").into_owned()))
        .collect()
}

fn ironic(error: &serde_json::Error) -> String {
    format!("Error generating error code.  Ironic right?  {error}")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use pretty_assertions::assert_eq;
    use serde_json::{Value, json};

    use super::*;
    use crate::{
        exception::{Fault, TraceFrame},
        known::{HttpException, ValidationException},
        report::RawFrame,
        sink::BufferedResponse,
    };

    /// 引数付きの決まったフレームを返す
    struct FixedCapture;

    impl StackCapture for FixedCapture {
        fn capture(&self, depth: usize) -> Vec<RawFrame> {
            (0..8)
                .map(|i| {
                    RawFrame::new(format!("app::frame_{i}"))
                        .at("src/app.rs", 10 + i)
                        .with_args(vec![json!({"password": "hunter2"}), json!(i)])
                })
                .take(depth)
                .collect()
        }
    }

    fn boundary(debug_app: bool) -> FaultBoundary {
        FaultBoundary::with_capture(
            BoundaryConfig {
                debug_app,
                ..BoundaryConfig::default()
            },
            FixedCapture,
        )
    }

    fn fixed_trace() -> Trace {
        Trace::from_frames(vec![TraceFrame {
            function: "app::service::load".to_string(),
            file:     Some("src/service.rs".to_string()),
            line:     Some(42),
        }])
    }

    fn body(sink: &BufferedResponse) -> Value {
        serde_json::from_str(sink.body()).expect("本文が JSON であること")
    }

    fn frames_have_no_args(stack: &Value) -> bool {
        stack
            .as_array()
            .is_some_and(|frames| frames.iter().all(|f| f.get("args").is_none()))
    }

    // ===== UncaughtExceptionHook =====

    #[test]
    fn test_既知の例外はフォーマッタを通さず自分で応答する() {
        let boundary = boundary(true);
        let mut sink = BufferedResponse::default();
        let uncaught = Uncaught::from(
            HttpException::new(StatusCode::NOT_FOUND, "User not found").with_code(4041),
        );

        let disposition = boundary.handle_exception(&uncaught, &mut sink);

        assert_eq!(disposition, Disposition::Delegated);
        assert_eq!(sink.status(), StatusCode::NOT_FOUND);
        let json = body(&sink);
        assert!(json["errors"][0].get("id").is_none());
        assert_eq!(json["errors"][0]["title"], "User not found");
    }

    #[test]
    fn test_既知の例外はデバッグ無効でも委譲する() {
        let boundary = boundary(false);
        let mut sink = BufferedResponse::default();
        let uncaught = Uncaught::from(ValidationException::new("bad").with_field_error("name", "required"));

        let disposition = boundary.handle_exception(&uncaught, &mut sink);

        assert_eq!(disposition, Disposition::Delegated);
        assert_eq!(sink.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_デバッグ有効の想定外例外はunexpectedタイトルで報告する() {
        let boundary = boundary(true);
        let mut sink = BufferedResponse::default();
        let fault = Fault::new("LogicException", "broken invariant")
            .with_code(17)
            .at("src/service.rs", 42)
            .with_trace(fixed_trace());

        let disposition = boundary.handle_exception(&Uncaught::unexpected(fault), &mut sink);

        assert_eq!(disposition, Disposition::Terminate { exit_code: 1 });
        assert_eq!(sink.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(sink.content_type(), Some("application/json"));
        assert_eq!(
            body(&sink),
            json!({
                "errors": [{
                    "id": "root API package error handler",
                    "code": 17,
                    "title": "Unexpected LogicException",
                    "detail": "broken invariant",
                    "context": null,
                    "meta": {
                        "line": 42,
                        "file": "src/service.rs",
                        "stack": ["src/service.rs(42): app::service::load", "{main}"]
                    }
                }]
            })
        );
    }

    #[test]
    fn test_デバッグ無効の想定外例外は何も書かない() {
        let boundary = boundary(false);
        let mut sink = BufferedResponse::default();

        let disposition = boundary.handle_exception(
            &Uncaught::unexpected(Fault::new("RuntimeException", "oops")),
            &mut sink,
        );

        assert_eq!(disposition, Disposition::Suppressed);
        assert!(sink.is_untouched());
    }

    #[test]
    fn test_generic方針では詳細なしの500を返す() {
        let boundary = FaultBoundary::with_capture(
            BoundaryConfig {
                suppressed_policy: SuppressedPolicy::Generic,
                ..BoundaryConfig::default()
            },
            FixedCapture,
        );
        let mut sink = BufferedResponse::default();

        let disposition = boundary.handle_exception(
            &Uncaught::unexpected(Fault::new("RuntimeException", "secret detail")),
            &mut sink,
        );

        assert_eq!(disposition, Disposition::Terminate { exit_code: 1 });
        assert_eq!(sink.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(!sink.body().contains("secret detail"));
        assert_eq!(body(&sink)["errors"][0]["status"], 500);
    }

    // ===== 文脈の解決 =====

    #[test]
    fn test_previousがあればprevious付きの文字列になる() {
        let boundary = boundary(true);
        let mut sink = BufferedResponse::default();
        let previous = Fault::new("IoException", "connection reset")
            .at("src/db.rs", 7)
            .with_trace(Trace::default());
        let expected = format!("[Previous] {previous}");
        let fault = Fault::new("RuntimeException", "query failed").with_previous(previous);

        let _ = boundary.handle_exception(&Uncaught::unexpected(fault), &mut sink);

        assert_eq!(body(&sink)["errors"][0]["context"], json!(expected));
        assert_eq!(
            expected,
            "[Previous] IoException: connection reset in src/db.rs:7\nStack trace:\n#0 {main}"
        );
    }

    #[test]
    fn test_生の文脈値はそのまま出力する() {
        let boundary = boundary(true);
        let mut sink = BufferedResponse::default();
        let error = RuntimeError::from_parts(2, "division by zero", "src/calc.rs", 5)
            .with_context(json!({"divisor": 0}));

        let _ = boundary.handle_runtime_error(&error, &mut sink);

        assert_eq!(body(&sink)["errors"][0]["context"], json!({"divisor": 0}));
    }

    // ===== スタック =====

    #[test]
    fn test_ランタイムエラー経路のスタックは引数を含まない() {
        let boundary = boundary(true);
        let mut sink = BufferedResponse::default();
        let error = RuntimeError::from_parts(8, "undefined index", "src/a.rs", 1);

        let _ = boundary.handle_runtime_error(&error, &mut sink);

        let stack = body(&sink)["errors"][0]["meta"]["stack"].clone();
        assert_eq!(stack.as_array().map(Vec::len), Some(DEFAULT_STACK_DEPTH));
        assert!(frames_have_no_args(&stack));
        assert_eq!(
            stack[0],
            json!({"function": "app::frame_0", "file": "src/app.rs", "line": 10})
        );
    }

    #[inline(never)]
    fn runtime_fault_site(boundary: &FaultBoundary, sink: &mut BufferedResponse) -> Disposition {
        boundary.handle_runtime_error(&RuntimeError::fatal("caller frame"), sink)
    }

    #[test]
    fn test_実際のスナップショットは呼び出し元のフレームから始まる() {
        let boundary = FaultBoundary::new(BoundaryConfig::default());
        let mut sink = BufferedResponse::default();

        let _ = runtime_fault_site(&boundary, &mut sink);

        let json = body(&sink);
        let first = json["errors"][0]["meta"]["stack"][0]["function"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        assert!(
            first.ends_with("runtime_fault_site"),
            "先頭フレームが呼び出し元ではありません: {first}"
        );
    }

    #[test]
    fn test_スタックの深さは設定に従う() {
        let boundary = FaultBoundary::with_capture(
            BoundaryConfig {
                stack_depth: 2,
                ..BoundaryConfig::default()
            },
            FixedCapture,
        );
        let mut sink = BufferedResponse::default();

        let _ = boundary.handle_runtime_error(&RuntimeError::fatal("x"), &mut sink);

        assert_eq!(
            body(&sink)["errors"][0]["meta"]["stack"].as_array().map(Vec::len),
            Some(2)
        );
    }

    #[test]
    fn test_例外経路のスタックはフレーム番号を取り除いた行になる() {
        let lines = trace_lines(&Trace::from_frames(vec![
            TraceFrame {
                function: "a".to_string(),
                file:     Some("src/a.rs".to_string()),
                line:     Some(1),
            },
            TraceFrame {
                function: "b".to_string(),
                file:     None,
                line:     None,
            },
        ]));

        assert_eq!(
            lines,
            vec![
                StackEntry::Line("src/a.rs(1): a".to_string()),
                StackEntry::Line("[internal function]: b".to_string()),
                StackEntry::Line("{main}".to_string()),
            ]
        );
    }

    // ===== RuntimeErrorHook =====

    #[test]
    fn test_ランタイムエラーはデバッグ無効でも報告する() {
        let boundary = boundary(false);
        let mut sink = BufferedResponse::default();
        let error = RuntimeError::from_parts(2, "division by zero", "src/calc.rs", 5);

        let disposition = boundary.handle_runtime_error(&error, &mut sink);

        assert_eq!(disposition, Disposition::Terminate { exit_code: 1 });
        let json = body(&sink);
        assert_eq!(json["errors"].as_array().map(Vec::len), Some(1));
        assert_eq!(json["errors"][0]["title"], "Fatal Error Occurred");
        assert_eq!(json["errors"][0]["code"], 2);
        assert_eq!(json["errors"][0]["context"], Value::Null);
        assert_eq!(json["errors"][0]["meta"]["file"], "src/calc.rs");
        assert_eq!(json["errors"][0]["meta"]["line"], 5);
    }

    // ===== ReportFormatter =====

    #[test]
    fn test_書きかけの本文を破棄してから書き出す() {
        let boundary = boundary(true);
        let mut sink = BufferedResponse::default();
        sink.write("<html><body>partial output");

        let _ = boundary.handle_runtime_error(&RuntimeError::fatal("x"), &mut sink);

        assert!(sink.body().starts_with(r#"{"errors":"#));
    }

    #[test]
    fn test_直列化に失敗したらプレーンテキストで応答する() {
        let boundary = boundary(true);
        let mut sink = BufferedResponse::default();
        let mut context = BTreeMap::new();
        context.insert((1, 2), "tuple keys cannot be encoded");
        let error = RuntimeError::fatal("x").with_context(context);

        let disposition = boundary.handle_runtime_error(&error, &mut sink);

        assert_eq!(disposition, Disposition::Terminate { exit_code: 1 });
        assert_eq!(sink.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(sink.content_type(), Some("text/plain; charset=utf-8"));
        assert!(sink.body().contains("Ironic"));
        assert!(sink.body().contains("key must be a string"));
    }

    #[test]
    fn test_不正なタイトルは代替文字列になる() {
        let boundary = boundary(true);
        let mut sink = BufferedResponse::default();

        let _ = boundary.report(
            ReportInput {
                code:    1,
                message: "m",
                file:    "f",
                line:    1,
                context: Context::None,
            },
            ReportTitle::from_value(&json!(["not", "a", "string"])),
            &mut sink,
        );

        assert_eq!(
            body(&sink)["errors"][0]["title"],
            "Fatal Error Occurred and bad $title given"
        );
    }

    // ===== ShutdownHook =====

    #[test]
    fn test_最後のエラーがなければ何もしない() {
        let boundary = boundary(true);
        let mut sink = BufferedResponse::default();

        assert_eq!(boundary.handle_shutdown(&mut sink), Disposition::Clean);
        assert!(sink.is_untouched());
    }

    #[test]
    fn test_最後のエラーは深刻度ラベルをタイトルにして報告する() {
        let boundary = boundary(false);
        let mut sink = BufferedResponse::default();
        boundary.record_last_error(RuntimeError::from_parts(64, "syntax error", "src/x.rs", 3));

        let disposition = boundary.handle_shutdown(&mut sink);

        assert_eq!(disposition, Disposition::Terminate { exit_code: 1 });
        let json = body(&sink);
        assert_eq!(json["errors"][0]["title"], "COMPILE ERROR");
        assert_eq!(json["errors"][0]["context"], Value::Null);
        assert!(frames_have_no_args(&json["errors"][0]["meta"]["stack"]));
        assert!(boundary.take_last_error().is_none());
    }

    #[test]
    fn test_未知の深刻度はコードをそのままタイトルにする() {
        let boundary = boundary(true);
        let mut sink = BufferedResponse::default();
        boundary.record_last_error(RuntimeError::from_parts(9999, "?", "src/x.rs", 3));

        let _ = boundary.handle_shutdown(&mut sink);

        assert_eq!(body(&sink)["errors"][0]["title"], "9999");
    }

    #[test]
    fn test_suppressed_policyのパース() {
        assert_eq!("drop".parse::<SuppressedPolicy>().ok(), Some(SuppressedPolicy::Drop));
        assert_eq!("generic".parse::<SuppressedPolicy>().ok(), Some(SuppressedPolicy::Generic));
        assert!("loud".parse::<SuppressedPolicy>().is_err());
    }
}
