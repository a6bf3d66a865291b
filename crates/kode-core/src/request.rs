// Copyright (c) 2025-2026 Kode Contributors <dev@kode.tools>
//
// SPDX-License-Identifier: MIT
//! Per-request identity and cancellation.
//!
//! The UI may drive several threads of execution at once (the main agent
//! loop, background refreshes); each gets its own [`RequestContext`] so a
//! cancel on one never leaks into another.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Query,
    Tool,
    Koding,
}

struct RequestShared {
    id: Uuid,
    start_ts: DateTime<Utc>,
    request_type: RequestType,
    active: AtomicBool,
    aborted: AtomicBool,
    notify: Notify,
    listeners: Mutex<Vec<(u64, Box<dyn FnOnce() + Send>)>>,
    next_listener_id: AtomicU64,
}

/// Cheaply cloneable handle to one top-level request.
#[derive(Clone)]
pub struct RequestContext {
    shared: Arc<RequestShared>,
}

impl RequestContext {
    pub fn new(request_type: RequestType) -> Self {
        Self {
            shared: Arc::new(RequestShared {
                id: Uuid::new_v4(),
                start_ts: Utc::now(),
                request_type,
                active: AtomicBool::new(true),
                aborted: AtomicBool::new(false),
                notify: Notify::new(),
                listeners: Mutex::new(Vec::new()),
                next_listener_id: AtomicU64::new(1),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    pub fn start_ts(&self) -> DateTime<Utc> {
        self.shared.start_ts
    }

    pub fn request_type(&self) -> RequestType {
        self.shared.request_type
    }

    pub fn is_active(&self) -> bool {
        self.shared.active.load(Ordering::SeqCst)
    }

    pub fn is_aborted(&self) -> bool {
        self.shared.aborted.load(Ordering::SeqCst)
    }

    /// Cancel this request: wakes every `cancelled()` waiter and fires the
    /// registered abort listeners exactly once.
    pub fn abort(&self) {
        if self.shared.aborted.swap(true, Ordering::SeqCst) {
            return;
        }
        let listeners: Vec<_> = self.shared.listeners.lock().unwrap().drain(..).collect();
        for (_, listener) in listeners {
            listener();
        }
        self.shared.notify.notify_waiters();
    }

    /// Resolves when the request is aborted.  Safe to poll from `select!`:
    /// if abort already happened the future is immediately ready.
    pub async fn cancelled(&self) {
        loop {
            if self.is_aborted() {
                return;
            }
            let notified = self.shared.notify.notified();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }
}

/// Wraps a [`RequestContext`] with listener bookkeeping so a component can
/// register abort callbacks and later remove exactly the ones it added.
pub struct AbortBarrier {
    ctx: RequestContext,
    registered: Mutex<Vec<u64>>,
}

impl AbortBarrier {
    pub fn new(ctx: RequestContext) -> Self {
        Self {
            ctx,
            registered: Mutex::new(Vec::new()),
        }
    }

    /// True only when *this* request was aborted and the barrier has not been
    /// cleaned up.
    pub fn check_abort(&self) -> bool {
        self.ctx.is_active() && self.ctx.is_aborted()
    }

    /// Register an abort listener.  Fires immediately when the request is
    /// already aborted.
    pub fn on_abort(&self, callback: impl FnOnce() + Send + 'static) {
        if self.ctx.is_aborted() {
            callback();
            return;
        }
        let id = self
            .ctx
            .shared
            .next_listener_id
            .fetch_add(1, Ordering::SeqCst);
        self.ctx
            .shared
            .listeners
            .lock()
            .unwrap()
            .push((id, Box::new(callback)));
        self.registered.lock().unwrap().push(id);
    }

    /// Remove this barrier's listeners and mark the context inactive.
    pub fn cleanup(&self) {
        let mine: Vec<u64> = self.registered.lock().unwrap().drain(..).collect();
        self.ctx
            .shared
            .listeners
            .lock()
            .unwrap()
            .retain(|(id, _)| !mine.contains(id));
        self.ctx.shared.active.store(false, Ordering::SeqCst);
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
