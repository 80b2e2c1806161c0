//! # レスポンスの書き込み先
//!
//! フォーマッタと自己応答型の例外は、[`ResponseSink`] を通してのみ応答を書く。
//!
//! - [`BufferedResponse`]: メモリ上に溜める。HTTP ホストとテストで使う
//! - [`CgiResponse`]: CGI 形式（`Status:` 行 + ヘッダ + 本文）で `Write` に書き出す。
//!   プロセスフックが stdout に対して使う

use std::io::{self, Write};

use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header::CONTENT_TYPE};

pub const JSON_CONTENT_TYPE: &str = "application/json";

pub const TEXT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

pub trait ResponseSink {
    /// 書きかけの本文を破棄する（ヘッダとステータスは残す）
    fn clean(&mut self);

    fn set_status(&mut self, status: StatusCode);

    fn set_header(&mut self, name: HeaderName, value: HeaderValue);

    fn write(&mut self, chunk: &str);

    fn set_content_type(&mut self, value: &'static str) {
        self.set_header(CONTENT_TYPE, HeaderValue::from_static(value));
    }
}

/// メモリ上の応答
#[derive(Debug, Clone, Default)]
pub struct BufferedResponse {
    status:  Option<StatusCode>,
    headers: HeaderMap,
    body:    String,
}

impl BufferedResponse {
    /// 未設定なら 200
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::OK)
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// 何も書かれていないか
    pub fn is_untouched(&self) -> bool {
        self.status.is_none() && self.headers.is_empty() && self.body.is_empty()
    }

    pub fn into_http(self) -> http::Response<String> {
        let status = self.status();
        let mut response = http::Response::new(self.body);
        *response.status_mut() = status;
        *response.headers_mut() = self.headers;
        response
    }
}

impl ResponseSink for BufferedResponse {
    fn clean(&mut self) {
        self.body.clear();
    }

    fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    fn write(&mut self, chunk: &str) {
        self.body.push_str(chunk);
    }
}

/// CGI 形式の応答
///
/// [`finish`](CgiResponse::finish) を呼ぶまで何も書き出さない。
#[derive(Debug)]
pub struct CgiResponse<W: Write> {
    buffer: BufferedResponse,
    writer: W,
}

impl CgiResponse<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> CgiResponse<W> {
    pub fn new(writer: W) -> Self {
        Self {
            buffer: BufferedResponse::default(),
            writer,
        }
    }

    /// 溜めた応答を書き出して writer を返す
    pub fn finish(mut self) -> io::Result<W> {
        let status = self.buffer.status();
        write!(
            self.writer,
            "Status: {} {}\r\n",
            status.as_u16(),
            status.canonical_reason().unwrap_or("")
        )?;
        for (name, value) in self.buffer.headers() {
            self.writer.write_all(name.as_str().as_bytes())?;
            self.writer.write_all(b": ")?;
            self.writer.write_all(value.as_bytes())?;
            self.writer.write_all(b"\r\n")?;
        }
        self.writer.write_all(b"\r\n")?;
        self.writer.write_all(self.buffer.body().as_bytes())?;
        self.writer.flush()?;
        Ok(self.writer)
    }
}

impl<W: Write> ResponseSink for CgiResponse<W> {
    fn clean(&mut self) {
        self.buffer.clean();
    }

    fn set_status(&mut self, status: StatusCode) {
        self.buffer.set_status(status);
    }

    fn set_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.buffer.set_header(name, value);
    }

    fn write(&mut self, chunk: &str) {
        self.buffer.write(chunk);
    }
}
