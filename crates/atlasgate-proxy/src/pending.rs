//! Single-flight table for in-flight origin fetches.
//!
//! The first request for a URL becomes the leader and starts the fetch; later
//! requests for the same URL attach as waiters. The entry is removed before
//! the result is broadcast, so a request arriving afterwards starts afresh.

use dashmap::{DashMap, mapref::entry::Entry};
use tokio::sync::broadcast;

use crate::{error::ProxyError, proxy::ProxyResponse};

pub(crate) type FetchResult = Result<ProxyResponse, ProxyError>;

pub(crate) enum Attach {
    /// Caller must start the fetch and eventually call [`FlightGuard::complete`].
    Leader(broadcast::Receiver<FetchResult>),
    Waiter(broadcast::Receiver<FetchResult>),
}

#[derive(Default)]
pub(crate) struct PendingRequests {
    in_flight: DashMap<String, broadcast::Sender<FetchResult>>,
}

impl PendingRequests {
    pub(crate) fn attach(&self, key: &str) -> Attach {
        match self.in_flight.entry(key.to_string()) {
            Entry::Occupied(occupied) => Attach::Waiter(occupied.get().subscribe()),
            Entry::Vacant(vacant) => {
                let (sender, receiver) = broadcast::channel(1);
                vacant.insert(sender);
                Attach::Leader(receiver)
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.in_flight.len()
    }

    fn complete(&self, key: &str, result: FetchResult) {
        if let Some((_, sender)) = self.in_flight.remove(key) {
            // No receivers left means every caller went away.
            let _ = sender.send(result);
        }
    }

    fn cancel(&self, key: &str) {
        self.in_flight.remove(key);
    }
}

/// Removes the pending entry when dropped without completing, which closes
/// the channel for every waiter.
pub(crate) struct FlightGuard<'a> {
    pending: &'a PendingRequests,
    key: String,
    done: bool,
}

impl<'a> FlightGuard<'a> {
    pub(crate) fn new(pending: &'a PendingRequests, key: String) -> Self {
        Self {
            pending,
            key,
            done: false,
        }
    }

    pub(crate) fn complete(mut self, result: FetchResult) {
        self.done = true;
        self.pending.complete(&self.key, result);
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.pending.cancel(&self.key);
        }
    }
}
