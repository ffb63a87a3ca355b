use std::{future::Future, time::Duration};

use futures::future::{abortable, AbortHandle};

/// Handle to a pending timeout. Clearing it prevents the callback from running.
/// Dropping the handle does not clear the timeout.
#[derive(Debug)]
pub(crate) struct TimeoutHandle(AbortHandle);

impl TimeoutHandle {
    pub(crate) fn clear(self) {
        self.0.abort();
    }
}

/// Runs `callback` once `duration` has elapsed on the host executor.
pub(crate) fn set_timeout(callback: impl FnOnce() + 'static, duration: Duration) -> TimeoutHandle {
    let (task, handle) = abortable(async move {
        sleep(duration).await;
        callback();
    });
    spawn_local(async move {
        let _ = task.await;
    });
    TimeoutHandle(handle)
}

pub(crate) fn spawn_local(fut: impl Future<Output = ()> + 'static) {
    cfg_if::cfg_if! {
        if #[cfg(feature = "csr")] {
            leptos::spawn_local(fut);
        } else if #[cfg(feature = "ssr")] {
            tokio::task::spawn_local(fut);
        } else {
            leptos::logging::debug_warn!("You are missing a Cargo feature for swr_query. Please enable one of 'ssr' or 'csr'.");
            leptos::spawn_local(fut);
        }
    }
}

pub(crate) async fn sleep(duration: Duration) {
    cfg_if::cfg_if! {
        if #[cfg(feature = "csr")] {
            gloo_timers::future::sleep(duration).await;
        } else if #[cfg(feature = "ssr")] {
            tokio::time::sleep(duration).await;
        } else {
            let _ = duration;
            leptos::logging::debug_warn!("You are missing a Cargo feature for swr_query. Please enable one of 'ssr' or 'csr'.");
        }
    }
}
