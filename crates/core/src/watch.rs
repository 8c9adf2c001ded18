//! Watch subsystem (spec §4.4, C5): path-indexed subscriptions with
//! asynchronous, batched delivery. Kept entirely in-process — events never
//! cross the store boundary, so no OS-level file watcher is involved.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use crate::path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    Change,
    Rename,
}

impl WatchEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            WatchEvent::Change => "change",
            WatchEvent::Rename => "rename",
        }
    }
}

/// A single delivered notification: the event kind and the filename to
/// report, computed per the matching rule in spec §4.4 (basename for exact
/// or direct-parent matches, relative path for ancestor matches).
#[derive(Debug, Clone)]
pub struct WatchNotification {
    pub event: WatchEvent,
    pub filename: String,
}

struct Subscription {
    path: String,
    recursive: bool,
    sender: mpsc::UnboundedSender<WatchNotification>,
    closed: std::sync::atomic::AtomicBool,
}

/// A handle to a live subscription. Dropping it does not close the
/// subscription (it's owned by the manager) — call [`WatchManager::remove`]
/// explicitly, or let the manager's cancellation token fire.
#[derive(Clone)]
pub struct WatchHandle {
    id: u64,
}

impl WatchHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Owns all subscriptions for one namespace's filesystem. Never outlives the
/// engine; subscriptions never outlive the manager.
pub struct WatchManager {
    subs: DashMap<u64, Subscription>,
    next_id: AtomicU64,
}

impl Default for WatchManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WatchManager {
    pub fn new() -> Self {
        Self { subs: DashMap::new(), next_id: AtomicU64::new(1) }
    }

    /// Registers a watcher on `path`. Returns the handle and a channel that
    /// receives batched notifications asynchronously.
    pub fn add_watcher(
        &self,
        watch_path: &str,
        recursive: bool,
    ) -> (WatchHandle, mpsc::UnboundedReceiver<WatchNotification>) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subs.insert(
            id,
            Subscription {
                path: path::canonicalize(watch_path),
                recursive,
                sender: tx,
                closed: std::sync::atomic::AtomicBool::new(false),
            },
        );
        (WatchHandle { id }, rx)
    }

    pub fn remove_watcher(&self, handle: &WatchHandle) {
        if let Some((_, sub)) = self.subs.remove(&handle.id) {
            sub.closed.store(true, Ordering::SeqCst);
        }
    }

    /// Emits an event for `affected_path`. Delivery is asynchronous: matching
    /// is done against a snapshot of current subscribers and dispatch happens
    /// on `tokio::spawn` so the emitter never blocks on listeners (spec §5).
    pub fn emit(self: &Arc<Self>, event: WatchEvent, affected_path: &str) {
        let affected_path = path::canonicalize(affected_path);
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            manager.dispatch(event, &affected_path);
        });
    }

    fn dispatch(&self, event: WatchEvent, affected_path: &str) {
        let parent = path::parent(affected_path);
        for item in self.subs.iter() {
            let sub = item.value();
            if sub.closed.load(Ordering::SeqCst) {
                continue;
            }
            let Some(filename) = matching_filename(sub, &parent, affected_path) else {
                continue;
            };
            // Listener failures are isolated: a closed receiver just means
            // the send is dropped, never propagated to other subscribers.
            let _ = sub.sender.send(WatchNotification { event, filename });
        }
    }
}

/// Implements the four-tier matching rule in spec §4.4. Returns the filename
/// to report if `sub` matches `affected_path`, `None` otherwise.
fn matching_filename(sub: &Subscription, parent: &str, affected_path: &str) -> Option<String> {
    // 1. Exact subscriber.
    if sub.path == affected_path {
        return Some(path::basename(affected_path).to_string());
    }
    // 2. Subscriber on the direct parent (recursive or not).
    if sub.path == parent {
        return Some(path::basename(affected_path).to_string());
    }
    // 3 & 4. Recursive subscriber on any ancestor strictly above the parent,
    // including the root.
    if sub.recursive && affected_path != "/" && path::is_ancestor(&sub.path, parent) {
        return Some(path::relative(&sub.path, affected_path));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn recv_one(rx: &mut mpsc::UnboundedReceiver<WatchNotification>) -> WatchNotification {
        tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for notification")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn exact_match_reports_basename() {
        let mgr = Arc::new(WatchManager::new());
        let (_h, mut rx) = mgr.add_watcher("/a/b.txt", false);
        mgr.emit(WatchEvent::Change, "/a/b.txt");
        let note = recv_one(&mut rx).await;
        assert_eq!(note.filename, "b.txt");
        assert_eq!(note.event, WatchEvent::Change);
    }

    #[tokio::test]
    async fn direct_parent_match_reports_basename() {
        let mgr = Arc::new(WatchManager::new());
        let (_h, mut rx) = mgr.add_watcher("/a", false);
        mgr.emit(WatchEvent::Rename, "/a/b.txt");
        let note = recv_one(&mut rx).await;
        assert_eq!(note.filename, "b.txt");
    }

    #[tokio::test]
    async fn recursive_ancestor_match_reports_relative_path() {
        let mgr = Arc::new(WatchManager::new());
        let (_h, mut rx) = mgr.add_watcher("/a", true);
        mgr.emit(WatchEvent::Change, "/a/b/c.txt");
        let note = recv_one(&mut rx).await;
        assert_eq!(note.filename, "b/c.txt");
    }

    #[tokio::test]
    async fn root_recursive_matches_everything() {
        let mgr = Arc::new(WatchManager::new());
        let (_h, mut rx) = mgr.add_watcher("/", true);
        mgr.emit(WatchEvent::Change, "/x/y/z.txt");
        let note = recv_one(&mut rx).await;
        assert_eq!(note.filename, "x/y/z.txt");
    }

    #[tokio::test]
    async fn non_recursive_parent_does_not_match_grandchild() {
        let mgr = Arc::new(WatchManager::new());
        let (_h, mut rx) = mgr.add_watcher("/a", false);
        mgr.emit(WatchEvent::Change, "/a/b/c.txt");
        let result = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await;
        assert!(result.is_err(), "non-recursive parent watcher should not see grandchild events");
    }

    #[tokio::test]
    async fn closed_subscription_receives_nothing() {
        let mgr = Arc::new(WatchManager::new());
        let (handle, mut rx) = mgr.add_watcher("/a.txt", false);
        mgr.remove_watcher(&handle);
        mgr.emit(WatchEvent::Change, "/a.txt");
        let result = tokio::time::timeout(std::time::Duration::from_millis(200), rx.recv()).await;
        match result {
            Ok(None) => {} // channel closed, fine
            Ok(Some(_)) => panic!("closed subscriber should not receive events"),
            Err(_) => {} // timed out, also fine
        }
    }
}
