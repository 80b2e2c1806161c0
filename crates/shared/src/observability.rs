//! # ログ出力
//!
//! `tracing-subscriber` の初期化と出力形式の選択。
//!
//! fault boundary はプロセスフック経由の応答を stdout に書くため、
//! ログは形式に関わらず stderr に出す。

use std::env;

/// `RUST_LOG` が未設定のときのフィルタ
pub const DEFAULT_FILTER: &str = "info,rootapi=debug";

/// ログ出力形式（`LOG_FORMAT`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum LogFormat {
    /// 1 行 1 イベントの JSON
    Json,
    #[default]
    Pretty,
}

impl LogFormat {
    /// 未設定・解釈できない値は [`Pretty`](LogFormat::Pretty)
    pub fn parse_or_default(value: Option<&str>) -> Self {
        value
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingConfig {
    pub service_name:   String,
    pub log_format:     LogFormat,
    pub default_filter: String,
}

impl TracingConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name:   service_name.into(),
            log_format:     LogFormat::default(),
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }

    pub fn with_log_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }

    /// `LOG_FORMAT` から出力形式を読み取る
    pub fn from_env(service_name: impl Into<String>) -> Self {
        let log_format = LogFormat::parse_or_default(env::var("LOG_FORMAT").ok().as_deref());
        Self::new(service_name).with_log_format(log_format)
    }
}

/// グローバルな subscriber を登録する
///
/// 2 回目以降の呼び出しは `TryInitError` を返す。
#[cfg(feature = "observability")]
pub fn init_tracing(config: &TracingConfig) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_subscriber::{EnvFilter, Layer as _, layer::SubscriberExt, util::SubscriberInitExt};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.default_filter));

    let layer = match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(layer)
        .try_init()?;

    tracing::info!(
        service = %config.service_name,
        log_format = %config.log_format,
        "トレーシングを初期化しました"
    );
    Ok(())
}
