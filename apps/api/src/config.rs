//! # アプリケーション設定
//!
//! 環境変数からアプリケーション設定を読み込む。
//!
//! ## 環境変数一覧
//!
//! | 変数名 | 必須 | デフォルト | 説明 |
//! |--------|------|------------|------|
//! | `API_HOST` | No | `0.0.0.0` | バインドアドレス |
//! | `API_PORT` | No | `3000` | ポート番号 |
//! | `APP_DEBUG` | No | `false` | 想定外の例外の詳細をクライアントに返すか |
//! | `APP_SUPPRESSED_POLICY` | No | `drop` | デバッグ無効時の想定外例外の扱い（`drop` / `generic`） |
//! | `APP_STACK_DEPTH` | No | `5` | ランタイムエラー時に取得するスタックの深さ |
//!
//! `APP_DEBUG=true` でも、例外の `meta.stack` は `RUST_BACKTRACE=1`（または
//! `RUST_LIB_BACKTRACE=1`）が無いと `["{main}"]` だけになる。
//! panic とランタイムエラーのスタックは環境変数に関わらず取得する。
//!
//! ## 使用例
//!
//! ```rust,ignore
//! use rootapi_api::config::AppConfig;
//!
//! dotenvy::dotenv().ok();
//! let config = AppConfig::from_env()?;
//! let boundary = FaultBoundary::new(config.application.boundary_config());
//! ```

use std::env;

use rootapi_fault::{BoundaryConfig, SuppressedPolicy, boundary::DEFAULT_STACK_DEPTH};

use crate::error::ConfigError;

/// HTTP サーバー設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// バインドアドレス（例: `0.0.0.0`, `127.0.0.1`）
    pub host: String,
    /// ポート番号
    pub port: u16,
}

/// fault boundary に渡す設定
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationConfig {
    /// 想定外の例外をフォーマッタで報告するか
    pub debug_app:         bool,
    pub suppressed_policy: SuppressedPolicy,
    pub stack_depth:       usize,
}

impl ApplicationConfig {
    pub fn boundary_config(&self) -> BoundaryConfig {
        BoundaryConfig {
            debug_app:         self.debug_app,
            suppressed_policy: self.suppressed_policy,
            stack_depth:       self.stack_depth,
        }
    }
}

/// アプリケーション全体の設定
///
/// 起動時に一度だけ構築し、各コンポーネントに渡す。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub server:      ServerConfig,
    pub application: ApplicationConfig,
}

impl AppConfig {
    /// 環境変数から設定を読み込む
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意の取得関数から設定を読み込む
    ///
    /// 未設定の項目はデフォルト値を使う。値があるのに解釈できない場合はエラーを返す。
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            server:      ServerConfig {
                host: lookup("API_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&lookup, "API_PORT", 3000)?,
            },
            application: ApplicationConfig {
                debug_app:         parse_bool(&lookup, "APP_DEBUG")?,
                suppressed_policy: parse_or(
                    &lookup,
                    "APP_SUPPRESSED_POLICY",
                    SuppressedPolicy::default(),
                )?,
                stack_depth:       parse_or(&lookup, "APP_STACK_DEPTH", DEFAULT_STACK_DEPTH)?,
            },
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

/// `true` / `1` / `on` を真、`false` / `0` / `off` / 空文字を偽とする
fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &'static str) -> Result<bool, ConfigError> {
    let Some(value) = lookup(key) else {
        return Ok(false);
    };
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "on" => Ok(true),
        "false" | "0" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Invalid { key, value }),
    }
}
