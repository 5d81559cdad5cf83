//! Time- and capacity-bounded queue (§4.1) that flushes buffered items to a
//! processor, either when the buffer reaches `capacity` or when `delay` has
//! elapsed since the first item in the current buffer was enqueued.
//!
//! Modeled as a bounded-intent actor: a background task owns the buffer and
//! the debounce timer (§9 "Batcher"); callers communicate over a channel so
//! `queue`/`queue_many` never block on the processor running.

use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

enum Command<T> {
    Queue(T),
    QueueMany(Vec<T>),
    FlushAll(oneshot::Sender<()>),
    Count(oneshot::Sender<usize>),
}

/// Handle to a running Batcher. Cloning shares the same underlying queue and
/// background task; dropping the last handle stops the task, flushing
/// whatever is still buffered.
#[derive(Clone)]
pub struct Batcher<T> {
    cmd_tx: mpsc::UnboundedSender<Command<T>>,
}

impl<T: Send + 'static> Batcher<T> {
    /// `capacity`: buffer size that triggers an immediate flush.
    /// `delay`: time since the first buffered item after which a flush fires
    /// even if `capacity` hasn't been reached.
    /// `processor`: invoked with a drained snapshot of the buffer; never
    /// called concurrently with itself for this Batcher.
    pub fn new<F, Fut>(capacity: usize, delay: Duration, processor: F) -> Self
    where
        F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let capacity = capacity.max(1);
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        tokio::spawn(run(cmd_rx, capacity, delay, processor));
        Self { cmd_tx }
    }

    pub fn queue(&self, item: T) {
        let _ = self.cmd_tx.send(Command::Queue(item));
    }

    pub fn queue_many(&self, items: Vec<T>) {
        if items.is_empty() {
            return;
        }
        let _ = self.cmd_tx.send(Command::QueueMany(items));
    }

    /// Immediately flushes all buffered items to the processor and resets
    /// the delay timer. Resolves once the processor call has returned.
    pub async fn flush_all(&self) {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::FlushAll(tx)).is_err() {
            return;
        }
        let _ = rx.await;
    }

    /// The number of items currently buffered, without triggering a flush.
    pub async fn count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Count(tx)).is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}

async fn run<T, F, Fut>(
    mut cmd_rx: mpsc::UnboundedReceiver<Command<T>>,
    capacity: usize,
    delay: Duration,
    processor: F,
) where
    F: Fn(Vec<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let mut buffer: Vec<T> = Vec::new();
    let mut deadline: Option<Instant> = None;
    // Far enough out to never fire while no deadline is armed; re-checked via the guard below.
    let no_deadline = Duration::from_secs(365 * 24 * 3600);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    None => {
                        if !buffer.is_empty() {
                            processor(std::mem::take(&mut buffer)).await;
                        }
                        return;
                    }
                    Some(Command::Queue(item)) => {
                        if buffer.is_empty() {
                            deadline = Some(Instant::now() + delay);
                        }
                        buffer.push(item);
                        if buffer.len() >= capacity {
                            deadline = None;
                            processor(std::mem::take(&mut buffer)).await;
                        }
                    }
                    Some(Command::QueueMany(items)) => {
                        if buffer.is_empty() && !items.is_empty() {
                            deadline = Some(Instant::now() + delay);
                        }
                        buffer.extend(items);
                        if buffer.len() >= capacity {
                            deadline = None;
                            processor(std::mem::take(&mut buffer)).await;
                        }
                    }
                    Some(Command::FlushAll(ack)) => {
                        deadline = None;
                        processor(std::mem::take(&mut buffer)).await;
                        let _ = ack.send(());
                    }
                    Some(Command::Count(reply)) => {
                        let _ = reply.send(buffer.len());
                    }
                }
            }
            _ = tokio::time::sleep_until(deadline.unwrap_or_else(|| Instant::now() + no_deadline)), if deadline.is_some() => {
                deadline = None;
                processor(std::mem::take(&mut buffer)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn recording_processor() -> (
        impl Fn(Vec<i32>) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync + 'static,
        Arc<Mutex<Vec<Vec<i32>>>>,
    ) {
        let batches = Arc::new(Mutex::new(Vec::new()));
        let captured = batches.clone();
        let processor = move |items: Vec<i32>| {
            let captured = captured.clone();
            Box::pin(async move {
                captured.lock().unwrap().push(items);
            }) as std::pin::Pin<Box<dyn Future<Output = ()> + Send>>
        };
        (processor, batches)
    }

    #[tokio::test]
    async fn flushes_on_capacity() {
        let (processor, batches) = recording_processor();
        let batcher = Batcher::new(3, Duration::from_secs(60), processor);
        batcher.queue(1);
        batcher.queue(2);
        batcher.queue(3);
        // Give the background task a chance to process the command.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(batches.lock().unwrap().as_slice(), &[vec![1, 2, 3]]);
    }

    #[tokio::test(start_paused = true)]
    async fn flushes_on_delay_elapsing() {
        let (processor, batches) = recording_processor();
        let batcher = Batcher::new(100, Duration::from_millis(500), processor);
        batcher.queue(1);
        batcher.queue(2);
        assert_eq!(batcher.count().await, 2);

        tokio::time::advance(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;

        assert_eq!(batches.lock().unwrap().as_slice(), &[vec![1, 2]]);
    }

    #[tokio::test]
    async fn flush_all_is_immediate_and_resets_timer() {
        let (processor, batches) = recording_processor();
        let batcher = Batcher::new(100, Duration::from_secs(60), processor);
        batcher.queue(1);
        batcher.flush_all().await;
        assert_eq!(batches.lock().unwrap().as_slice(), &[vec![1]]);
        assert_eq!(batcher.count().await, 0);
    }

    #[tokio::test]
    async fn items_queued_during_processing_accumulate_in_a_fresh_buffer() {
        let batches: Arc<Mutex<Vec<Vec<i32>>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = batches.clone();
        let batcher: Batcher<i32> = Batcher::new(1, Duration::from_secs(60), move |items| {
            let captured = captured.clone();
            async move {
                captured.lock().unwrap().push(items);
            }
        });
        batcher.queue(1);
        batcher.queue(2);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(
            batches.lock().unwrap().as_slice(),
            &[vec![1], vec![2]],
            "each item flushes its own batch since capacity is 1"
        );
    }

    #[tokio::test]
    async fn count_is_observable_without_flushing() {
        let (processor, _batches) = recording_processor();
        let batcher = Batcher::new(100, Duration::from_secs(60), processor);
        batcher.queue_many(vec![1, 2, 3]);
        assert_eq!(batcher.count().await, 3);
    }
}
