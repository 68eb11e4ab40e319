//! Request-scoped storage of the caller context.
//!
//! Storage lives in a tokio task-local slot that only exists while a scope
//! established by [`RequestContext::scope`] or [`RequestContext::sync_scope`]
//! is running. Leaving the scope drops the slot on every exit path, panics
//! included, so one request can never observe another request's caller.

use crate::CallerContext;
use std::cell::RefCell;
use std::future::Future;
use tracing::warn;

tokio::task_local! {
    static CURRENT: RefCell<CallerContext>;
}

/// Access point for the current request's caller context.
///
/// Getters never panic: outside a scope, or after [`clear`](Self::clear),
/// they return `None`.
pub struct RequestContext;

impl RequestContext {
    /// Run `future` with `context` as the request's caller context.
    pub async fn scope<F>(context: CallerContext, future: F) -> F::Output
    where
        F: Future,
    {
        CURRENT.scope(RefCell::new(context), future).await
    }

    /// Run `f` with `context` as the caller context, for synchronous
    /// thread-per-request callers.
    pub fn sync_scope<F, R>(context: CallerContext, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        CURRENT.sync_scope(RefCell::new(context), f)
    }

    /// Wrap `future` so it carries the current caller context with it.
    ///
    /// Spawned tasks do not inherit task-locals; wrap the future before
    /// handing it to `tokio::spawn` when the task builds audit records.
    pub fn propagate<F>(future: F) -> impl Future<Output = F::Output>
    where
        F: Future,
    {
        let context = Self::current();
        CURRENT.scope(RefCell::new(context), future)
    }

    /// Store the caller attributes for the current scope, replacing any
    /// previous values. Ignored outside a scope.
    pub fn set(acting_user: Option<&str>, source_address: Option<&str>, request_path: Option<&str>) {
        Self::replace(CallerContext::new(acting_user, source_address, request_path));
    }

    /// Replace the whole caller context for the current scope.
    pub fn replace(context: CallerContext) {
        if !Self::is_active() {
            warn!(
                acting_user = ?context.acting_user(),
                "request context set outside of a request scope; caller identity dropped"
            );
            return;
        }
        let _ = CURRENT.try_with(|cell| {
            *cell.borrow_mut() = context;
        });
    }

    /// Remove all caller attributes from the current scope.
    pub fn clear() {
        let _ = CURRENT.try_with(|cell| {
            *cell.borrow_mut() = CallerContext::empty();
        });
    }

    /// Snapshot of the current caller context, empty outside a scope.
    pub fn current() -> CallerContext {
        Self::try_current().unwrap_or_default()
    }

    /// Snapshot of the current caller context, `None` outside a scope.
    pub fn try_current() -> Option<CallerContext> {
        CURRENT.try_with(|cell| cell.borrow().clone()).ok()
    }

    /// Whether the caller is running inside a request scope.
    pub fn is_active() -> bool {
        CURRENT.try_with(|_| ()).is_ok()
    }

    pub fn acting_user() -> Option<String> {
        Self::read(|ctx| ctx.acting_user())
    }

    pub fn source_address() -> Option<String> {
        Self::read(|ctx| ctx.source_address())
    }

    pub fn request_path() -> Option<String> {
        Self::read(|ctx| ctx.request_path())
    }

    fn read(field: impl FnOnce(&CallerContext) -> Option<&str>) -> Option<String> {
        CURRENT
            .try_with(|cell| field(&cell.borrow()).map(str::to_string))
            .ok()
            .flatten()
    }
}
