use std::{
    collections::VecDeque,
    sync::{atomic::{AtomicUsize, Ordering}, Arc},
};
use tokio::sync::{Mutex, Notify};

// One piece still to be downloaded.
#[derive(Debug, Clone, Copy)]
pub struct WorkItem {

    pub index: usize,

    pub hash: [u8; 20],

    pub length: usize,

}

#[derive(Debug)]
struct Inner {
    items: Mutex<VecDeque<WorkItem>>,
    // Pieces not yet verified and written: queued plus in flight with a
    // worker. Only hits zero once every piece has actually completed, so
    // `pop` can tell "queue momentarily empty, a worker still owes a
    // piece" apart from "truly done".
    outstanding: AtomicUsize,
    notify: Notify,
}

// A work-stealing queue shared between every outbound worker in a download
// session. Pieces are handed out front-to-back; a worker that fails to
// download or verify its piece pushes it back so another worker can retry.
// `pop` blocks rather than returning `None` while pieces remain
// outstanding, so a worker never exits early just because the queue
// drained into other workers' hands.
#[derive(Debug, Clone)]
pub struct WorkQueue(Arc<Inner>);

impl WorkQueue {

    pub fn new(items: impl IntoIterator<Item = WorkItem>) -> Self {
        let items: VecDeque<WorkItem> = items.into_iter().collect();
        let outstanding = AtomicUsize::new(items.len());
        Self(Arc::new(Inner {
            items: Mutex::new(items),
            outstanding,
            notify: Notify::new(),
        }))
    }

    // Waits for a piece to become available. Returns `None` only once
    // every piece has been marked done via `mark_done` — never merely
    // because the deque happened to be empty while another worker still
    // held a piece it might requeue.
    pub async fn pop(&self) -> Option<WorkItem> {
        loop {
            let notified = self.0.notify.notified();

            if let Some(item) = self.0.items.lock().await.pop_front() {
                return Some(item);
            }
            if self.0.outstanding.load(Ordering::Acquire) == 0 {
                return None;
            }

            notified.await;
        }
    }

    // Returned work goes to the back, giving pieces already attempted by a
    // failing worker a chance to cool off behind fresher ones. Does not
    // touch the outstanding count: the piece is still owed.
    pub async fn push_back(&self, item: WorkItem) {
        self.0.items.lock().await.push_back(item);
        self.0.notify.notify_waiters();
    }

    // Marks one piece as verified and written, so it no longer counts
    // towards "outstanding". Called by the assembler, never by a worker.
    pub fn mark_done(&self) {
        self.0.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.0.notify.notify_waiters();
    }

    pub async fn is_empty(&self) -> bool {
        self.0.items.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(index: usize) -> WorkItem {
        WorkItem { index, hash: [0; 20], length: 1024 }
    }

    #[tokio::test]
    async fn pop_returns_items_in_fifo_order() {
        let queue = WorkQueue::new([item(0), item(1), item(2)]);
        assert_eq!(queue.pop().await.unwrap().index, 0);
        assert_eq!(queue.pop().await.unwrap().index, 1);
    }

    #[tokio::test]
    async fn pushed_back_item_is_available_again() {
        let queue = WorkQueue::new([item(0)]);
        let work = queue.pop().await.unwrap();
        assert!(queue.is_empty().await);
        queue.push_back(work).await;
        assert_eq!(queue.pop().await.unwrap().index, 0);
    }

    #[tokio::test]
    async fn pop_on_a_queue_with_nothing_ever_enqueued_returns_none() {
        let queue = WorkQueue::new(Vec::<WorkItem>::new());
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn pop_blocks_on_transient_empty_until_a_push_back_or_mark_done() {
        let queue = WorkQueue::new([item(0)]);
        let work = queue.pop().await.unwrap();
        assert!(queue.is_empty().await);

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        // Give the waiter a chance to block in `pop` before we resolve it;
        // if it had returned `None` early this would already be finished.
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        queue.push_back(work).await;
        let popped = waiter.await.unwrap();
        assert_eq!(popped.unwrap().index, 0);
    }

    #[tokio::test]
    async fn pop_returns_none_only_once_every_piece_is_marked_done() {
        let queue = WorkQueue::new([item(0), item(1)]);
        let _a = queue.pop().await.unwrap();
        let _b = queue.pop().await.unwrap();

        let waiter = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished(), "one piece still outstanding, pop must not resolve");

        queue.mark_done(); // completes `a`'s piece
        tokio::task::yield_now().await;
        assert!(!waiter.is_finished(), "one piece still outstanding, pop must not resolve");

        queue.mark_done(); // completes `b`'s piece
        assert!(waiter.await.unwrap().is_none());
    }
}
