//! # ランタイムエラー
//!
//! 実行中に発生した警告・通知・エラー。RuntimeErrorHook の入力であり、
//! プロセス終了時に報告される「最後のエラー」の形でもある。

use std::{fmt, panic::Location, sync::Arc};

use crate::{
    error_type::{ErrorType, ErrorTypeLabel, translate},
    report::RawContext,
};

#[derive(Debug, Clone)]
pub struct RuntimeError {
    /// 深刻度コード（[`ErrorType`] の判別子。列挙外の値もそのまま保持する）
    pub severity: i64,
    pub message:  String,
    pub file:     String,
    pub line:     u32,
    pub context:  Option<Arc<dyn RawContext>>,
}

impl RuntimeError {
    #[track_caller]
    pub fn new(severity: ErrorType, message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self::from_parts(
            severity.code(),
            message,
            location.file(),
            location.line(),
        )
    }

    /// 致命的エラー（`ERROR`）
    #[track_caller]
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::new(ErrorType::Fatal, message)
    }

    pub fn from_parts(
        severity: i64,
        message: impl Into<String>,
        file: impl Into<String>,
        line: u32,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            file: file.into(),
            line,
            context: None,
        }
    }

    /// 生の文脈値を付ける（レポートの `context` にそのまま出力される）
    pub fn with_context(mut self, context: impl RawContext + 'static) -> Self {
        self.context = Some(Arc::new(context));
        self
    }

    pub fn label(&self) -> ErrorTypeLabel {
        translate(self.severity)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} in {}:{}",
            self.label(),
            self.message,
            self.file,
            self.line
        )
    }
}
