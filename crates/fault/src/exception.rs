//! # 例外モデル
//!
//! スタック最上位まで伝播しうる障害を [`Exception`] トレイトで表す。
//! 汎用の具象型として [`Fault`] を提供する。
//!
//! ## 文字列表現
//!
//! `Display` は次の形式で出力する（`[Previous]` 文脈の本文にもなる）:
//!
//! ```text
//! LogicException: broken invariant in src/service.rs:42
//! Stack trace:
//! #0 src/service.rs(42): app::service::load
//! #1 {main}
//! ```

use std::{
    any::Any,
    backtrace::{Backtrace, BacktraceStatus},
    error::Error as StdError,
    fmt,
    panic::Location,
};

use crate::capture::parse_backtrace;

/// panic フックから panic 発生地点までの間にあるフレーム
const PANIC_MACHINERY: &[&str] = &[
    "std::backtrace",
    "rootapi_fault::exception::",
    "<rootapi_fault::exception::",
    "rootapi_fault::hooks::install_with",
    "rootapi_fault::hooks::remember_site",
    "<alloc::boxed::Box<",
    "std::panicking::",
    "core::panicking::",
    "std::sys::backtrace::",
    "std::sys_common::backtrace::",
    "rust_begin_unwind",
    "__rustc::rust_begin_unwind",
    "core::option::unwrap_failed",
    "core::option::expect_failed",
    "core::result::unwrap_failed",
];

/// 例外として扱える障害
pub trait Exception: fmt::Display + fmt::Debug + Send + Sync {
    /// 型名（`"Unexpected <型名>"` のタイトルに使う）
    fn type_name(&self) -> &str;

    fn code(&self) -> i64 {
        0
    }

    fn message(&self) -> &str;

    fn file(&self) -> &str;

    fn line(&self) -> u32;

    /// 直前の原因
    fn previous(&self) -> Option<&dyn Exception> {
        None
    }

    fn trace(&self) -> &Trace;
}

/// [`Exception`] の標準的な文字列表現を書き出す
pub fn render(exception: &dyn Exception, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(
        f,
        "{}: {} in {}:{}\nStack trace:\n{}",
        exception.type_name(),
        exception.message(),
        exception.file(),
        exception.line(),
        exception.trace()
    )
}

/// トレースの 1 フレーム
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceFrame {
    pub function: String,
    pub file:     Option<String>,
    pub line:     Option<u32>,
}

/// 例外生成時点の呼び出しトレース
///
/// 表示形式は `#<N> <file>(<line>): <function>` の行を並べ、
/// 最後に `#<N> {main}` を付ける。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Trace {
    frames: Vec<TraceFrame>,
}

impl Trace {
    /// 現在のトレースを取得する
    ///
    /// `RUST_BACKTRACE` / `RUST_LIB_BACKTRACE` が無効な場合は空になる。
    /// 例外は既知の API 例外を含めて頻繁に作られるため、常時取得はしない。
    pub fn capture() -> Self {
        Self::from_backtrace(&Backtrace::capture(), |function| {
            function.starts_with("std::backtrace")
                || function.starts_with("rootapi_fault::exception::")
                || function.starts_with("<rootapi_fault::exception::")
        })
    }

    /// panic フックの中から、panic を起こした関数以降のトレースを取得する
    ///
    /// 環境変数に関わらず常に取得する。
    pub fn at_panic() -> Self {
        Self::from_backtrace(&Backtrace::force_capture(), |function| {
            PANIC_MACHINERY
                .iter()
                .any(|prefix| function.starts_with(prefix))
        })
    }

    fn from_backtrace(backtrace: &Backtrace, is_internal: impl Fn(&str) -> bool) -> Self {
        if backtrace.status() != BacktraceStatus::Captured {
            return Self::default();
        }
        let frames = parse_backtrace(&backtrace.to_string())
            .into_iter()
            .skip_while(|f| is_internal(&f.function))
            .map(|f| TraceFrame {
                function: f.function,
                file:     f.file,
                line:     f.line,
            })
            .collect();
        Self { frames }
    }

    pub fn from_frames(frames: Vec<TraceFrame>) -> Self {
        Self { frames }
    }

    pub fn frames(&self) -> &[TraceFrame] {
        &self.frames
    }
}

impl fmt::Display for Trace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, frame) in self.frames.iter().enumerate() {
            match (&frame.file, frame.line) {
                (Some(file), Some(line)) => {
                    writeln!(f, "#{index} {file}({line}): {}", frame.function)?;
                }
                _ => writeln!(f, "#{index} [internal function]: {}", frame.function)?,
            }
        }
        write!(f, "#{} {{main}}", self.frames.len())
    }
}

/// panic の発生地点
///
/// 巻き戻しの後ではトレースに発生元の関数が残らないため、panic フックの中で取得する。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicSite {
    pub location: Option<(String, u32)>,
    pub trace:    Trace,
}

impl PanicSite {
    pub fn capture(location: Option<(String, u32)>) -> Self {
        Self {
            location,
            trace: Trace::at_panic(),
        }
    }
}

/// 汎用の例外
///
/// 生成位置は `#[track_caller]` で呼び出し元から取得する。
#[derive(Debug)]
pub struct Fault {
    type_name: String,
    code:      i64,
    message:   String,
    file:      String,
    line:      u32,
    previous:  Option<Box<dyn Exception>>,
    trace:     Trace,
}

impl Fault {
    #[track_caller]
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            type_name: type_name.into(),
            code:      0,
            message:   message.into(),
            file:      location.file().to_string(),
            line:      location.line(),
            previous:  None,
            trace:     Trace::capture(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    pub fn with_previous(mut self, previous: impl Exception + 'static) -> Self {
        self.previous = Some(Box::new(previous));
        self
    }

    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = trace;
        self
    }

    /// 発生位置を上書きする
    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = file.into();
        self.line = line;
        self
    }

    /// panic のペイロードから例外を作る
    ///
    /// 型名は `Panic`。発生地点が分からない場合は `"unknown"` / `0` で、トレースは空になる。
    pub fn from_panic(payload: &(dyn Any + Send), site: Option<PanicSite>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "Box<dyn Any>".to_string()
        };
        let PanicSite { location, trace } = site.unwrap_or_else(|| PanicSite {
            location: None,
            trace:    Trace::default(),
        });
        let (file, line) = location.unwrap_or_else(|| ("unknown".to_string(), 0));

        Self {
            type_name: "Panic".to_string(),
            code: 0,
            message,
            file,
            line,
            previous: None,
            trace,
        }
    }

    /// `std::error::Error` のチェインから例外を作る
    ///
    /// `source()` は `previous` として再帰的に連結する。
    #[track_caller]
    pub fn from_error(error: &(dyn StdError + 'static)) -> Self {
        let mut fault = Self::new("Error", error.to_string());
        if let Some(source) = error.source() {
            fault.previous = Some(Box::new(Self::from_error(source)));
        }
        fault
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(self, f)
    }
}

impl Exception for Fault {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn code(&self) -> i64 {
        self.code
    }

    fn message(&self) -> &str {
        &self.message
    }

    fn file(&self) -> &str {
        &self.file
    }

    fn line(&self) -> u32 {
        self.line
    }

    fn previous(&self) -> Option<&dyn Exception> {
        self.previous.as_deref()
    }

    fn trace(&self) -> &Trace {
        &self.trace
    }
}
