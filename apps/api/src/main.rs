//! # rootapi API サーバー
//!
//! fault boundary を組み込んだ HTTP サーバーを起動する。
//!
//! ## 環境変数
//!
//! [`AppConfig`] の一覧に加えて、ログ出力は以下で制御する。
//!
//! | 変数名 | 必須 | 説明 |
//! |--------|------|------|
//! | `RUST_LOG` | No | ログフィルタ（デフォルト: `info,rootapi=debug`） |
//! | `LOG_FORMAT` | No | `json` / `pretty`（デフォルト: `pretty`） |
//! | `RUST_LIB_BACKTRACE` | No | `1` で例外生成時のトレースを取得（`APP_DEBUG` と併用） |
//!
//! ## 起動方法
//!
//! ```bash
//! # 開発環境（想定外の例外の詳細を応答に含める）
//! APP_DEBUG=true RUST_LIB_BACKTRACE=1 cargo run -p rootapi-api
//!
//! # 本番環境
//! API_PORT=8080 cargo run -p rootapi-api --release
//! ```
//!
//! ## 終了時の報告
//!
//! サーバーがエラーで停止した場合は、そのエラーを最後のエラーとして記録する。
//! シャットダウンガードの破棄で ShutdownHook が走り、CGI 形式の 500 を stdout に書いて
//! 終了コード 1 で終了する。

use std::{net::SocketAddr, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use rootapi_api::{app_builder::build_app, config::AppConfig, middleware::in_request_scope};
use rootapi_fault::{
    FaultBoundary,
    RuntimeError,
    hooks::{self, HookOptions},
};
use rootapi_shared::observability::{TracingConfig, init_tracing};
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env ファイルを読み込む（存在する場合）
    dotenvy::dotenv().ok();

    init_tracing(&TracingConfig::from_env("rootapi-api"))
        .context("トレーシングの初期化に失敗しました")?;

    let config = AppConfig::from_env().context("設定の読み込みに失敗しました")?;
    let boundary = Arc::new(FaultBoundary::new(config.application.boundary_config()));
    let guard = hooks::install_with(
        Arc::clone(&boundary),
        HookOptions::default().defer_panic_when(in_request_scope),
    );

    if let Err(err) = serve(&config, Arc::clone(&boundary)).await {
        boundary.record_last_error(RuntimeError::fatal(format!("{err:#}")));
    }

    drop(guard);
    Ok(())
}

async fn serve(config: &AppConfig, boundary: Arc<FaultBoundary>) -> anyhow::Result<()> {
    let app = build_app(Router::new(), boundary);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("アドレスのパースに失敗しました")?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("{addr} へのバインドに失敗しました"))?;

    tracing::info!(
        debug_app = config.application.debug_app,
        suppressed_policy = %config.application.suppressed_policy,
        "API サーバーを起動します: {addr}"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("サーバーが異常終了しました")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "シグナルの待ち受けに失敗しました");
    }
    tracing::info!("シャットダウンします");
}
