//! # 既知の API 例外
//!
//! 自分で正しいステータス・ヘッダ・本文を知っている例外（自己応答型）。
//! UncaughtExceptionHook はこれらを [`SelfReporting::send`] に委譲し、
//! フォーマッタは呼ばない。
//!
//! | 例外 | ステータス |
//! |------|-----------|
//! | [`HttpException`] | 生成時に指定 |
//! | [`ValidationException`] | 422 Unprocessable Entity |

use std::{fmt, panic::Location};

use http::StatusCode;
use rootapi_shared::{ErrorDocument, ErrorResponse};
use serde_json::json;

use crate::{
    exception::{Exception, Fault, Trace, render},
    sink::{JSON_CONTENT_TYPE, ResponseSink},
};

/// 自分自身で応答を送出できる例外
pub trait SelfReporting {
    fn send(&self, sink: &mut dyn ResponseSink);
}

fn send_document(sink: &mut dyn ResponseSink, status: StatusCode, document: &ErrorDocument) {
    sink.set_status(status);
    sink.set_content_type(JSON_CONTENT_TYPE);
    match serde_json::to_string(document) {
        Ok(body) => sink.write(&body),
        Err(e) => {
            tracing::error!(error = %e, "エラー文書の直列化に失敗しました");
            sink.write(r#"{"errors":[]}"#);
        }
    }
}

/// HTTP 例外
///
/// `code` はアプリケーション内部のエラーコード、`dev_message` と `more_info` は
/// 開発者向けの補足情報。
#[derive(Debug)]
pub struct HttpException {
    status:      StatusCode,
    code:        i64,
    message:     String,
    dev_message: Option<String>,
    more_info:   Option<String>,
    file:        String,
    line:        u32,
    previous:    Option<Box<dyn Exception>>,
    trace:       Trace,
}

impl HttpException {
    #[track_caller]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            status,
            code: 0,
            message: message.into(),
            dev_message: None,
            more_info: None,
            file: location.file().to_string(),
            line: location.line(),
            previous: None,
            trace: Trace::capture(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = code;
        self
    }

    pub fn with_dev_message(mut self, dev_message: impl Into<String>) -> Self {
        self.dev_message = Some(dev_message.into());
        self
    }

    pub fn with_more_info(mut self, more_info: impl Into<String>) -> Self {
        self.more_info = Some(more_info.into());
        self
    }

    pub fn with_previous(mut self, previous: impl Exception + 'static) -> Self {
        self.previous = Some(Box::new(previous));
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn document(&self) -> ErrorDocument {
        let mut error = ErrorResponse::new(self.status.as_u16(), self.message.as_str());
        if self.code != 0 {
            error = error.with_code(self.code.to_string());
        }
        if let Some(dev_message) = &self.dev_message {
            error = error.with_detail(dev_message.as_str());
        }
        if let Some(more_info) = &self.more_info {
            error = error.with_meta(json!({ "more": more_info }));
        }
        ErrorDocument::single(error)
    }
}

impl SelfReporting for HttpException {
    fn send(&self, sink: &mut dyn ResponseSink) {
        send_document(sink, self.status, &self.document());
    }
}

impl fmt::Display for HttpException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(self, f)
    }
}

impl Exception for HttpException {
    fn type_name(&self) -> &str {
        "HttpException"
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

/// フィールド単位の検証エラー
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field:   String,
    pub message: String,
}

/// バリデーション例外
#[derive(Debug)]
pub struct ValidationException {
    message:      String,
    field_errors: Vec<FieldError>,
    file:         String,
    line:         u32,
    previous:     Option<Box<dyn Exception>>,
    trace:        Trace,
}

impl ValidationException {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            message: message.into(),
            field_errors: Vec::new(),
            file: location.file().to_string(),
            line: location.line(),
            previous: None,
            trace: Trace::capture(),
        }
    }

    pub fn with_field_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.field_errors.push(FieldError {
            field:   field.into(),
            message: message.into(),
        });
        self
    }

    pub fn with_previous(mut self, previous: impl Exception + 'static) -> Self {
        self.previous = Some(Box::new(previous));
        self
    }

    pub fn field_errors(&self) -> &[FieldError] {
        &self.field_errors
    }

    /// フィールドエラーごとに 1 件。フィールドエラーがなければ全体メッセージを 1 件
    fn document(&self) -> ErrorDocument {
        if self.field_errors.is_empty() {
            return ErrorDocument::single(
                ErrorResponse::new(StatusCode::UNPROCESSABLE_ENTITY.as_u16(), "Validation Error")
                    .with_detail(self.message.as_str()),
            );
        }
        self.field_errors
            .iter()
            .map(|e| ErrorResponse::validation_error(&e.field, e.message.as_str()))
            .collect::<Vec<_>>()
            .into()
    }
}

impl SelfReporting for ValidationException {
    fn send(&self, sink: &mut dyn ResponseSink) {
        send_document(sink, StatusCode::UNPROCESSABLE_ENTITY, &self.document());
    }
}

impl fmt::Display for ValidationException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        render(self, f)
    }
}

impl Exception for ValidationException {
    fn type_name(&self) -> &str {
        "ValidationException"
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

/// 既知の API 例外
#[derive(Debug)]
pub enum KnownException {
    Http(HttpException),
    Validation(ValidationException),
}

impl KnownException {
    pub fn as_exception(&self) -> &dyn Exception {
        match self {
            Self::Http(e) => e,
            Self::Validation(e) => e,
        }
    }
}

impl SelfReporting for KnownException {
    fn send(&self, sink: &mut dyn ResponseSink) {
        match self {
            Self::Http(e) => e.send(sink),
            Self::Validation(e) => e.send(sink),
        }
    }
}

/// スタック最上位まで伝播した例外
#[derive(Debug)]
pub enum Uncaught {
    Known(KnownException),
    Unexpected(Box<dyn Exception>),
}

impl Uncaught {
    pub fn unexpected(exception: impl Exception + 'static) -> Self {
        Self::Unexpected(Box::new(exception))
    }

    pub fn as_exception(&self) -> &dyn Exception {
        match self {
            Self::Known(known) => known.as_exception(),
            Self::Unexpected(exception) => exception.as_ref(),
        }
    }
}

impl From<HttpException> for Uncaught {
    fn from(e: HttpException) -> Self {
        Self::Known(KnownException::Http(e))
    }
}

impl From<ValidationException> for Uncaught {
    fn from(e: ValidationException) -> Self {
        Self::Known(KnownException::Validation(e))
    }
}

impl From<Fault> for Uncaught {
    fn from(fault: Fault) -> Self {
        Self::unexpected(fault)
    }
}
