//! # プロセスフック
//!
//! [`FaultBoundary`] を Rust ランタイムのフックに登録する。
//!
//! - panic フック: 捕捉されなかった panic を UncaughtExceptionHook に渡す
//! - [`ShutdownGuard`]: `Drop` で ShutdownHook を実行する
//!
//! どちらも応答は CGI 形式で stdout に書き出し、`Terminate` ならその場でプロセスを終了する。
//!
//! ## HTTP リクエスト内の panic
//!
//! リクエスト単位の境界（tower-http の `CatchPanicLayer`）が panic を処理する場合は、
//! [`HookOptions::defer_panic_when`] で判定関数を渡してプロセスフックを素通りさせる。
//! 素通りさせた panic の発生地点（位置とトレース）は [`take_panic_site`] で取り出せる。
//!
//! 登録前のフックは先に呼び出すため、panic のメッセージは従来どおり stderr に出る。

use std::{
    cell::RefCell,
    io,
    panic::{self, PanicHookInfo},
    sync::Arc,
};

use crate::{
    boundary::FaultBoundary,
    exception::{Fault, PanicSite},
    known::Uncaught,
    sink::CgiResponse,
};

thread_local! {
    static PANIC_SITE: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

/// 直前の panic の発生地点を取り出す（同じスレッドで発生したもののみ）
pub fn take_panic_site() -> Option<PanicSite> {
    PANIC_SITE.with(|site| site.borrow_mut().take())
}

/// フック登録時のオプション
#[derive(Default)]
pub struct HookOptions {
    defer_panic: Option<fn() -> bool>,
}

impl HookOptions {
    /// `predicate` が `true` を返す間の panic はプロセスフックで処理しない
    pub fn defer_panic_when(mut self, predicate: fn() -> bool) -> Self {
        self.defer_panic = Some(predicate);
        self
    }

    fn defers(&self) -> bool {
        self.defer_panic.is_some_and(|predicate| predicate())
    }
}

/// panic フックを登録し、シャットダウンガードを返す
///
/// ガードは `main` の最後まで保持すること。
pub fn install(boundary: Arc<FaultBoundary>) -> ShutdownGuard {
    install_with(boundary, HookOptions::default())
}

pub fn install_with(boundary: Arc<FaultBoundary>, options: HookOptions) -> ShutdownGuard {
    let hook_boundary = Arc::clone(&boundary);
    let previous = panic::take_hook();
    panic::set_hook(Box::new(move |info| {
        previous(info);
        let site = remember_site(info);
        if options.defers() {
            tracing::debug!("リクエスト境界に panic の処理を委ねます");
            return;
        }

        let fault = Fault::from_panic(info.payload(), Some(site));
        let mut sink = CgiResponse::stdout();
        let disposition = hook_boundary.handle_exception(&Uncaught::unexpected(fault), &mut sink);
        if disposition.is_terminal() {
            flush(sink);
        }
        disposition.enforce();
    }));

    tracing::debug!("fault boundary をプロセスフックに登録しました");
    ShutdownGuard { boundary }
}

#[inline(never)]
fn remember_site(info: &PanicHookInfo<'_>) -> PanicSite {
    let location = info
        .location()
        .map(|l| (l.file().to_string(), l.line()));
    let site = PanicSite::capture(location);
    PANIC_SITE.with(|slot| *slot.borrow_mut() = Some(site.clone()));
    site
}

fn flush(sink: CgiResponse<io::Stdout>) {
    if let Err(e) = sink.finish() {
        tracing::error!(error = %e, "エラー応答の書き出しに失敗しました");
    }
}

/// プロセス終了時に ShutdownHook を実行するガード
#[must_use = "ガードを破棄した時点でシャットダウン処理が走る"]
#[derive(Debug)]
pub struct ShutdownGuard {
    boundary: Arc<FaultBoundary>,
}

impl ShutdownGuard {
    pub fn boundary(&self) -> &Arc<FaultBoundary> {
        &self.boundary
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        let mut sink = CgiResponse::stdout();
        let disposition = self.boundary.handle_shutdown(&mut sink);
        if disposition.is_terminal() {
            flush(sink);
        }
        disposition.enforce();
    }
}
