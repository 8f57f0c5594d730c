//! Identity provider seam.

use async_trait::async_trait;
use futures::channel::mpsc::{self, UnboundedReceiver};
use futures::Stream;
use log::info;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use crate::entry::UserId;
use crate::error::StoreError;
use crate::store::SubscriptionHandle;

pub type AuthListener = Arc<dyn Fn(Option<UserId>) + Send + Sync>;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Calls `listener` right away with the current user, then on every
    /// sign-in and sign-out until the handle is dropped.
    fn on_auth_change(&self, listener: AuthListener) -> SubscriptionHandle;

    fn current_user(&self) -> Option<UserId>;

    async fn sign_out(&self) -> Result<(), StoreError>;
}

#[derive(Default)]
struct IdentityState {
    user: Option<UserId>,
    listeners: HashMap<u64, AuthListener>,
    next_listener: u64,
}

/// Identity provider that signs users in by name.
#[derive(Default)]
pub struct InMemoryIdentity {
    state: Arc<Mutex<IdentityState>>,
}

impl InMemoryIdentity {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sign_in(&self, user: UserId) {
        info!("signed in as {}", user);
        self.set_user(Some(user));
    }

    fn lock(&self) -> MutexGuard<'_, IdentityState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_user(&self, user: Option<UserId>) {
        let listeners: Vec<AuthListener> = {
            let mut state = self.lock();
            state.user = user.clone();
            state.listeners.values().cloned().collect()
        };
        for listener in listeners {
            listener(user.clone());
        }
    }
}

#[async_trait]
impl IdentityProvider for InMemoryIdentity {
    fn on_auth_change(&self, listener: AuthListener) -> SubscriptionHandle {
        let (id, current) = {
            let mut state = self.lock();
            let id = state.next_listener;
            state.next_listener += 1;
            state.listeners.insert(id, listener.clone());
            (id, state.user.clone())
        };
        listener(current);

        let state = Arc::downgrade(&self.state);
        SubscriptionHandle::new(move || {
            if let Some(state) = state.upgrade() {
                state
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .listeners
                    .remove(&id);
            }
        })
    }

    fn current_user(&self) -> Option<UserId> {
        self.lock().user.clone()
    }

    async fn sign_out(&self) -> Result<(), StoreError> {
        if let Some(user) = self.current_user() {
            info!("signed out {}", user);
        }
        self.set_user(None);
        Ok(())
    }
}

/// Auth changes as a stream; the registration lives as long as the stream.
pub struct AuthChanges {
    rx: UnboundedReceiver<Option<UserId>>,
    _handle: SubscriptionHandle,
}

impl Stream for AuthChanges {
    type Item = Option<UserId>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

pub fn auth_changes(identity: &dyn IdentityProvider) -> AuthChanges {
    let (tx, rx) = mpsc::unbounded();
    let handle = identity.on_auth_change(Arc::new(move |user: Option<UserId>| {
        let _ = tx.unbounded_send(user);
    }));
    AuthChanges {
        rx,
        _handle: handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{FutureExt, StreamExt};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn stream_starts_with_current_state() {
        let identity = InMemoryIdentity::new();
        let mut changes = auth_changes(&identity);
        assert_eq!(changes.next().await, Some(None));

        identity.sign_in(UserId::new("u1"));
        assert_eq!(changes.next().await, Some(Some(UserId::new("u1"))));

        identity.sign_out().await.unwrap();
        assert_eq!(changes.next().await, Some(None));
        assert!(identity.current_user().is_none());
    }

    #[tokio::test]
    async fn dropped_listener_hears_nothing() {
        let identity = InMemoryIdentity::new();
        identity.sign_in(UserId::new("u1"));
        let mut changes = auth_changes(&identity);
        assert_eq!(changes.next().await, Some(Some(UserId::new("u1"))));

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let handle = identity.on_auth_change(Arc::new(move |_: Option<UserId>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        drop(handle);
        identity.sign_in(UserId::new("u2"));
        assert_eq!(changes.next().await, Some(Some(UserId::new("u2"))));
        assert!(changes.next().now_or_never().is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
