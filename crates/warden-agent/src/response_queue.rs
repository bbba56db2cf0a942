use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, Notify};

pub const DEFAULT_CAPACITY: usize = 2048;

tokio::task_local! {
    /// Consume window the current task is bound to. The dispatcher scopes
    /// each handler task to the window that was current when the command
    /// started; tasks without a binding consume without expiry.
    static CONSUMER_WINDOW: u64;
}

/// Bounded buffer of server output lines used to correlate asynchronous
/// replies with the command currently in flight.
///
/// The classifier publishes every output line; whichever handler the
/// dispatcher is running scans for the line it recognizes. The producer
/// never blocks: once `capacity` lines are buffered, the oldest line is
/// dropped to make room for the newest.
///
/// The dispatcher guarantees at most one live handler consumes at a time,
/// and the window counter extends that guarantee across timeouts: opening
/// the next command's window cuts off a timed-out handler that is still
/// waiting in `next_line`, so an abandoned task can never steal the lines
/// meant for its successor.
#[derive(Debug)]
pub struct ResponseQueue {
    capacity: usize,
    window: AtomicU64,
    lines: Mutex<VecDeque<String>>,
    notify: Notify,
}

impl Default for ResponseQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ResponseQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            window: AtomicU64::new(0),
            lines: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
        }
    }

    /// Append a line, evicting the oldest buffered line on overflow.
    pub async fn publish(&self, line: impl Into<String>) {
        let mut lines = self.lines.lock().await;
        lines.push_back(line.into());
        while lines.len() > self.capacity {
            lines.pop_front();
        }
        drop(lines);
        self.notify.notify_one();
    }

    /// Open a fresh consume window: discard everything buffered and expire
    /// consumers still bound to an earlier window. The dispatcher calls
    /// this before each command so a handler never matches a stale line and
    /// a timed-out handler never races the next one for fresh lines.
    pub async fn drain(&self) {
        self.window.fetch_add(1, Ordering::SeqCst);
        self.lines.lock().await.clear();
        // Wake everyone so expired waiters can bail out.
        self.notify.notify_waiters();
    }

    /// Id of the currently open consume window.
    pub fn window(&self) -> u64 {
        self.window.load(Ordering::SeqCst)
    }

    /// Bind a future to a consume window; `next_line` calls inside it
    /// return `None` once that window is no longer current.
    pub fn in_window<F: Future>(window: u64, fut: F) -> impl Future<Output = F::Output> {
        CONSUMER_WINDOW.scope(window, fut)
    }

    /// Wait for the next buffered line. Returns `None` when the caller's
    /// consume window has expired; unbounded otherwise, relying on the
    /// dispatcher's global command timeout.
    pub async fn next_line(&self) -> Option<String> {
        let bound = CONSUMER_WINDOW.try_with(|w| *w).ok();
        loop {
            // Register interest before checking, so a publish that lands
            // between the check and the await is not lost.
            let notified = self.notify.notified();
            if let Some(window) = bound
                && self.window.load(Ordering::SeqCst) != window
            {
                // Pass any wakeup on: the line that woke us belongs to the
                // current window's consumer.
                self.notify.notify_one();
                return None;
            }
            if let Some(line) = self.lines.lock().await.pop_front() {
                return Some(line);
            }
            notified.await;
        }
    }

    pub async fn len(&self) -> usize {
        self.lines.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn keeps_insertion_order() {
        let q = ResponseQueue::new(8);
        q.publish("a").await;
        q.publish("b").await;
        q.publish("c").await;
        assert_eq!(q.next_line().await.as_deref(), Some("a"));
        assert_eq!(q.next_line().await.as_deref(), Some("b"));
        assert_eq!(q.next_line().await.as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let q = ResponseQueue::new(3);
        for i in 0..4 {
            q.publish(format!("line-{i}")).await;
        }
        assert_eq!(q.len().await, 3);
        assert_eq!(q.next_line().await.unwrap(), "line-1");
        assert_eq!(q.next_line().await.unwrap(), "line-2");
        assert_eq!(q.next_line().await.unwrap(), "line-3");
    }

    #[tokio::test]
    async fn drain_clears_stale_lines() {
        let q = ResponseQueue::new(8);
        q.publish("stale").await;
        q.drain().await;
        assert_eq!(q.len().await, 0);
        q.publish("fresh").await;
        assert_eq!(q.next_line().await.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn next_line_wakes_on_publish() {
        let q = Arc::new(ResponseQueue::new(8));
        let reader = tokio::spawn({
            let q = q.clone();
            async move { q.next_line().await }
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        q.publish("late").await;
        let got = tokio::time::timeout(Duration::from_secs(5), reader)
            .await
            .expect("reader should wake")
            .expect("reader task");
        assert_eq!(got.as_deref(), Some("late"));
    }

    #[tokio::test]
    async fn expired_window_consumer_stops_without_stealing_lines() {
        let q = Arc::new(ResponseQueue::new(8));
        let stale = tokio::spawn(ResponseQueue::in_window(q.window(), {
            let q = q.clone();
            async move { q.next_line().await }
        }));
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The next command's window opens; the waiting consumer expires.
        q.drain().await;
        let got = tokio::time::timeout(Duration::from_secs(5), stale)
            .await
            .expect("stale consumer should return")
            .expect("stale task");
        assert_eq!(got, None);

        // A consumer bound to the new window still sees fresh lines.
        q.publish("fresh").await;
        let got = ResponseQueue::in_window(q.window(), q.next_line()).await;
        assert_eq!(got.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn unbound_consumers_never_expire() {
        let q = ResponseQueue::new(8);
        q.drain().await;
        q.drain().await;
        q.publish("still here").await;
        assert_eq!(q.next_line().await.as_deref(), Some("still here"));
    }
}
