//! # エラー種別の変換
//!
//! ランタイムエラーの深刻度コード（ビットフラグ）を人間が読めるラベルに変換する。
//! 列挙外のコードは数値のまま返す。

use std::fmt;

use strum::{IntoEnumIterator, IntoStaticStr};

/// ランタイムエラーの深刻度
///
/// 判別子がそのまま深刻度コードになる。
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr, strum::Display, strum::EnumIter,
)]
pub enum ErrorType {
    #[strum(serialize = "ERROR")]
    Fatal            = 1,
    #[strum(serialize = "WARNING")]
    Warning          = 2,
    #[strum(serialize = "PARSE")]
    Parse            = 4,
    #[strum(serialize = "NOTICE")]
    Notice           = 8,
    #[strum(serialize = "CORE ERROR")]
    CoreError        = 16,
    #[strum(serialize = "CORE WARNING")]
    CoreWarning      = 32,
    #[strum(serialize = "COMPILE ERROR")]
    CompileError     = 64,
    #[strum(serialize = "COMPILE WARNING")]
    CompileWarning   = 128,
    #[strum(serialize = "USER ERROR")]
    UserError        = 256,
    #[strum(serialize = "USER WARNING")]
    UserWarning      = 512,
    #[strum(serialize = "USER NOTICE")]
    UserNotice       = 1024,
    #[strum(serialize = "STRICT")]
    Strict           = 2048,
    #[strum(serialize = "RECOVERABLE ERROR")]
    RecoverableError = 4096,
    #[strum(serialize = "DEPRECATED")]
    Deprecated       = 8192,
    #[strum(serialize = "USER DEPRECATED")]
    UserDeprecated   = 16384,
}

impl ErrorType {
    /// 深刻度コード
    pub fn code(self) -> i64 {
        self as i64
    }

    /// 深刻度コードから逆引きする
    pub fn from_code(code: i64) -> Option<Self> {
        Self::iter().find(|t| t.code() == code)
    }

    /// 表示ラベル（例: `"CORE WARNING"`）
    pub fn label(self) -> &'static str {
        self.into()
    }
}

/// [`translate`] の結果
///
/// 未知のコードは [`Unknown`](ErrorTypeLabel::Unknown) として数値をそのまま保持し、
/// 表示時も数値を出力する。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorTypeLabel {
    Known(ErrorType),
    Unknown(i64),
}

impl fmt::Display for ErrorTypeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Known(error_type) => f.write_str(error_type.label()),
            Self::Unknown(code) => write!(f, "{code}"),
        }
    }
}

/// 深刻度コードを表示ラベルに変換する
pub fn translate(code: i64) -> ErrorTypeLabel {
    match ErrorType::from_code(code) {
        Some(error_type) => ErrorTypeLabel::Known(error_type),
        None => ErrorTypeLabel::Unknown(code),
    }
}
