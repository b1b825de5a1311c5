//! Observable value store.
//!
//! A [`Store`] holds one [`Resource`] in a `tokio::sync::watch` channel.
//! Writers replace or modify the value; any number of readers hold a
//! `watch::Receiver` and see the latest value, skipping intermediate ones
//! they were too slow to observe.

use std::fmt::Display;
use std::future::Future;

use serde::Serialize;
use tokio::sync::watch;

/// Remote-backed state: still loading, loaded, or failed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum Resource<T> {
    Loading,
    Data(T),
    Error(String),
}

impl<T> Resource<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Self::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Resource<U> {
        match self {
            Self::Loading => Resource::Loading,
            Self::Data(v) => Resource::Data(f(v)),
            Self::Error(e) => Resource::Error(e),
        }
    }
}

/// Single-value observable store.
pub struct Store<T> {
    tx: watch::Sender<Resource<T>>,
}

impl<T: Clone> Store<T> {
    /// A store that starts out [`Resource::Loading`].
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Resource::Loading);
        Self { tx }
    }

    pub fn with_data(value: T) -> Self {
        let (tx, _) = watch::channel(Resource::Data(value));
        Self { tx }
    }

    pub fn get(&self) -> Resource<T> {
        self.tx.borrow().clone()
    }

    /// Replace the value and notify readers, even if nobody is subscribed.
    pub fn set(&self, value: Resource<T>) {
        self.tx.send_replace(value);
    }

    pub fn set_data(&self, value: T) {
        self.set(Resource::Data(value));
    }

    pub fn set_error(&self, message: impl Into<String>) {
        self.set(Resource::Error(message.into()));
    }

    /// Modify the value in place and notify readers.
    pub fn update(&self, f: impl FnOnce(&mut Resource<T>)) {
        self.tx.send_modify(f);
    }

    pub fn subscribe(&self) -> watch::Receiver<Resource<T>> {
        self.tx.subscribe()
    }

    /// Run `fut`, publishing `Loading` first and then its outcome.
    /// Returns `true` when the future produced data.
    pub async fn load<F, E>(&self, fut: F) -> bool
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.set(Resource::Loading);
        match fut.await {
            Ok(value) => {
                self.set(Resource::Data(value));
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Store load failed");
                self.set(Resource::Error(e.to_string()));
                false
            }
        }
    }
}

impl<T: Clone> Default for Store<T> {
    fn default() -> Self {
        Self::new()
    }
}
