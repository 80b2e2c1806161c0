//! # スタックスナップショット
//!
//! ランタイムエラー経路で使う呼び出しスタックの取得。
//! テストで決定的なフレームを注入できるよう [`StackCapture`] トレイトで抽象化する。

use std::{
    backtrace::{Backtrace, BacktraceStatus},
    sync::LazyLock,
};

use regex::Regex;

use crate::report::RawFrame;

/// `   3: crate::module::function`
static FRAME_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+):\s+(.+?)\s*$").expect("valid frame regex"));

/// `             at ./src/lib.rs:42:5`
static LOCATION_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s+at\s+(.+?):(\d+)(?::\d+)?\s*$").expect("valid location regex")
});

/// スナップショット取得処理と FaultBoundary 自身のフレーム
const INTERNAL_PREFIXES: &[&str] = &[
    "std::backtrace",
    "<std::backtrace",
    "std::backtrace_rs",
    "rootapi_fault::capture::",
    "<rootapi_fault::capture::",
    "rootapi_fault::boundary::FaultBoundary::",
    "<rootapi_fault::boundary::FaultBoundary",
    "rootapi_fault::exception::Trace::capture",
];

/// 呼び出しスタックの取得
pub trait StackCapture: Send + Sync {
    /// 現在の呼び出しスタックを最大 `depth` フレーム取得する
    fn capture(&self, depth: usize) -> Vec<RawFrame>;
}

/// `std::backtrace::Backtrace` による取得
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktraceCapture;

impl StackCapture for BacktraceCapture {
    fn capture(&self, depth: usize) -> Vec<RawFrame> {
        let backtrace = Backtrace::force_capture();
        if backtrace.status() != BacktraceStatus::Captured {
            return Vec::new();
        }
        parse_backtrace(&backtrace.to_string())
            .into_iter()
            .skip_while(is_internal)
            .take(depth)
            .collect()
    }
}

/// `Backtrace` の表示形式をフレーム列に分解する
///
/// 位置情報の行は直前のフレームに結び付ける。
/// 1 フレームに複数の位置が続く場合は最初のものを採用する。
pub fn parse_backtrace(text: &str) -> Vec<RawFrame> {
    let mut frames: Vec<RawFrame> = Vec::new();

    for line in text.lines() {
        if let Some(caps) = FRAME_LINE.captures(line) {
            frames.push(RawFrame::new(&caps[2]));
            continue;
        }
        let Some(caps) = LOCATION_LINE.captures(line) else {
            continue;
        };
        if let Some(frame) = frames.last_mut().filter(|f| f.file.is_none()) {
            frame.file = Some(caps[1].to_string());
            frame.line = caps[2].parse().ok();
        }
    }

    frames
}

fn is_internal(frame: &RawFrame) -> bool {
    INTERNAL_PREFIXES
        .iter()
        .any(|prefix| frame.function.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const SAMPLE: &str = "   0: std::backtrace_rs::backtrace::libunwind::trace
             at /rustc/abc/library/std/src/../../backtrace/src/backtrace/libunwind.rs:116:5
   1: std::backtrace::Backtrace::force_capture
             at /rustc/abc/library/std/src/backtrace.rs:312:9
   2: app::service::load_user
             at ./src/service.rs:42:13
   3: app::main
             at ./src/main.rs:7:5
   4: __libc_start_main";

    #[test]
    fn test_parse_backtrace_フレームと位置を対応付ける() {
        let frames = parse_backtrace(SAMPLE);

        assert_eq!(frames.len(), 5);
        assert_eq!(frames[2].function, "app::service::load_user");
        assert_eq!(frames[2].file.as_deref(), Some("./src/service.rs"));
        assert_eq!(frames[2].line, Some(42));
        assert_eq!(frames[4].function, "__libc_start_main");
        assert_eq!(frames[4].file, None);
    }

    #[test]
    fn test_parse_backtrace_引数は常に空() {
        assert!(parse_backtrace(SAMPLE).iter().all(|f| f.args.is_none()));
    }

    #[test]
    fn test_parse_backtrace_空文字列で空を返す() {
        assert!(parse_backtrace("").is_empty());
        assert!(parse_backtrace("disabled backtrace").is_empty());
    }

    #[test]
    fn test_内部フレームを先頭から除外する() {
        let frames: Vec<_> = parse_backtrace(SAMPLE)
            .into_iter()
            .skip_while(is_internal)
            .collect();

        assert_eq!(frames[0].function, "app::service::load_user");
    }

    #[test]
    fn test_backtrace_capture_深さの上限を守る() {
        let frames = BacktraceCapture.capture(5);

        assert!(frames.len() <= 5);
        assert!(frames.iter().all(|f| !is_internal(f)));
    }
}
