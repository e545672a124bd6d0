use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tokio::sync::{Notify, OwnedSemaphorePermit, Semaphore};

use crate::error::ApiError;
use crate::{AppState, QUEUE_TIMEOUT};

/// Bounded request-slot semaphore. The sole throttle between clients and
/// the store driver: a request either gets a slot within [`QUEUE_TIMEOUT`]
/// or is turned away with a 408.
#[derive(Clone)]
pub struct AdmissionQueue {
    slots: Arc<Semaphore>,
    capacity: usize,
}

impl AdmissionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// `None` when no slot frees up in time. The slot is returned when the
    /// permit drops, on every exit path.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        tokio::time::timeout(QUEUE_TIMEOUT, self.slots.clone().acquire_owned())
            .await
            .ok()?
            .ok()
    }

    /// Number of slots currently held.
    pub fn depth(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }
}

/// Counts requests in flight; graceful shutdown blocks on it reaching zero.
#[derive(Clone, Default)]
pub struct WaitGroup {
    inner: Arc<WaitGroupInner>,
}

#[derive(Default)]
struct WaitGroupInner {
    count: AtomicUsize,
    zero: Notify,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> WaitGuard {
        self.inner.count.fetch_add(1, Ordering::AcqRel);
        WaitGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::Acquire)
    }

    pub async fn wait(&self) {
        loop {
            if self.count() == 0 {
                return;
            }
            let notified = self.inner.zero.notified();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub struct WaitGuard {
    inner: Arc<WaitGroupInner>,
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.inner.zero.notify_waiters();
        }
    }
}

/// Admission layer for the object routes: join the in-flight wait group,
/// then take a queue slot or fail fast.
pub async fn admission_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let _in_flight = state.wait_group.enter();

    let Some(_slot) = state.admission.acquire().await else {
        tracing::warn!("URL: {}, request timeout", request.uri());
        return ApiError::QueueTimeout.into_response();
    };

    next.run(request).await
}
