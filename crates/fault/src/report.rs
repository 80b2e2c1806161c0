//! # エラーレポート
//!
//! フォーマッタが組み立てて送出する JSON の形。
//! レポートは障害ごとに組み立て、直列化して書き込んだら破棄する。
//!
//! ```json
//! {"errors": [{
//!   "id": "root API package error handler",
//!   "code": 0,
//!   "title": "Unexpected LogicException",
//!   "detail": "...",
//!   "context": null,
//!   "meta": {"line": 10, "file": "src/lib.rs", "stack": ["..."]}
//! }]}
//! ```

use std::fmt;

use serde::{Serialize, Serializer, ser::Error as _};
use serde_json::Value;

use crate::exception::Exception;

/// レポートの発生元を示す固定 ID
pub const REPORT_ID: &str = "root API package error handler";

/// タイトル未指定時の既定値
pub const DEFAULT_TITLE: &str = "Fatal Error Occurred";

/// 文字列以外のタイトルが渡されたときの代替値
pub const INVALID_TITLE: &str = "Fatal Error Occurred and bad $title given";

/// 呼び出し側から渡される任意の文脈値
///
/// 直列化は封筒全体の直列化時まで遅延させる。
/// ここで失敗した場合、フォーマッタはプレーンテキストの代替応答に切り替える。
pub trait RawContext: fmt::Debug + Send + Sync {
    fn to_json(&self) -> Result<Value, serde_json::Error>;
}

impl<T> RawContext for T
where
    T: Serialize + fmt::Debug + Send + Sync,
{
    fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// フォーマッタに渡す文脈
#[derive(Debug, Clone, Copy, Default)]
pub enum Context<'a> {
    #[default]
    None,
    /// ランタイムエラー経路の生の値（そのまま出力する）
    Raw(&'a dyn RawContext),
    /// 例外経路（直前の原因とトレースを例外から取り出す）
    Faulted(&'a dyn Exception),
}

/// レポートのタイトル
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ReportTitle {
    #[default]
    Default,
    Given(String),
    /// 文字列以外が渡された
    Invalid,
}

impl ReportTitle {
    /// 動的な値からタイトルを決める
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(title) => Self::Given(title.clone()),
            _ => Self::Invalid,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Default => DEFAULT_TITLE,
            Self::Given(title) => title,
            Self::Invalid => INVALID_TITLE,
        }
    }
}

impl From<String> for ReportTitle {
    fn from(title: String) -> Self {
        Self::Given(title)
    }
}

impl From<&str> for ReportTitle {
    fn from(title: &str) -> Self {
        Self::Given(title.to_string())
    }
}

/// レポートの `context` フィールド
#[derive(Debug, Clone, Copy)]
pub enum ReportContext<'a> {
    Null,
    Raw(&'a dyn RawContext),
    Previous(&'a str),
}

impl Serialize for ReportContext<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Null => serializer.serialize_none(),
            Self::Previous(previous) => serializer.serialize_str(previous),
            Self::Raw(raw) => raw
                .to_json()
                .map_err(S::Error::custom)?
                .serialize(serializer),
        }
    }
}

/// 取得直後のスタックフレーム
///
/// `args` は呼び出し引数。値の大きさや循環参照の危険があるため、
/// レポートに載せる前に [`StackFrame`] へ変換して必ず落とす。
#[derive(Debug, Clone, PartialEq)]
pub struct RawFrame {
    pub function: String,
    pub file:     Option<String>,
    pub line:     Option<u32>,
    pub args:     Option<Vec<Value>>,
}

impl RawFrame {
    pub fn new(function: impl Into<String>) -> Self {
        Self {
            function: function.into(),
            file:     None,
            line:     None,
            args:     None,
        }
    }

    pub fn at(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = Some(args);
        self
    }

    /// 引数を取り除いたフレームに変換する
    pub fn strip_args(self) -> StackFrame {
        StackFrame {
            function: self.function,
            file:     self.file,
            line:     self.line,
        }
    }
}

impl From<RawFrame> for StackFrame {
    fn from(frame: RawFrame) -> Self {
        frame.strip_args()
    }
}

/// レポートに載せるスタックフレーム（引数なし）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    pub function: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file:     Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line:     Option<u32>,
}

/// `meta.stack` の 1 要素
///
/// 例外経路はトレース文字列の各行、ランタイムエラー経路は構造化フレームになる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum StackEntry {
    Line(String),
    Frame(StackFrame),
}

#[derive(Debug, Clone, Serialize)]
pub struct ReportMeta<'a> {
    pub line:  u32,
    pub file:  &'a str,
    pub stack: Vec<StackEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport<'a> {
    pub id:      &'static str,
    pub code:    i64,
    pub title:   &'a str,
    pub detail:  &'a str,
    pub context: ReportContext<'a>,
    pub meta:    ReportMeta<'a>,
}

/// `{"errors": [...]}` の封筒
///
/// 現状 1 障害につき 1 件だが、常に配列で出力する。
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub errors: Vec<ErrorReport<'a>>,
}

impl<'a> ErrorEnvelope<'a> {
    pub fn single(report: ErrorReport<'a>) -> Self {
        Self {
            errors: vec![report],
        }
    }
}
