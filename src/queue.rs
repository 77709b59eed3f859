//! Serialized event processing with fixed-delay retry.

use crate::api::ResourceKind;
use crate::handler::HandlerError;
use crate::model::EventKind;
use crate::observe::{EventObserver, Outcome};
use parking_lot::Mutex;
use std::{fmt, num::NonZeroU32, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Retry policy applied to failed tasks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay before a failed task re-enters the queue.
    pub delay: Duration,
    /// Total attempts before a task is dropped; `None` retries forever.
    pub max_attempts: Option<NonZeroU32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
            max_attempts: None,
        }
    }
}

type TaskFn = Arc<dyn Fn() -> Result<(), HandlerError> + Send + Sync>;

/// One queued handler-chain invocation.
#[derive(Clone)]
pub struct Task {
    kind: ResourceKind,
    event: EventKind,
    run: TaskFn,
    attempt: u32,
}

impl Task {
    pub fn new(
        kind: ResourceKind,
        event: EventKind,
        run: impl Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            event,
            run: Arc::new(run),
            attempt: 0,
        }
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("kind", &self.kind)
            .field("event", &self.event)
            .field("attempt", &self.attempt)
            .finish_non_exhaustive()
    }
}

/// FIFO task queue drained by a single worker.
///
/// All watch sessions feed this one queue, and exactly one worker invokes
/// handlers, so handler execution is serialized globally. A failed task is
/// pushed back onto the queue after the policy delay; ordering is FIFO by
/// (re-)arrival.
pub struct Queue {
    tx: mpsc::UnboundedSender<Task>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Task>>>,
    policy: RetryPolicy,
    observer: Arc<dyn EventObserver>,
}

impl Queue {
    #[must_use]
    pub fn new(policy: RetryPolicy, observer: Arc<dyn EventObserver>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            policy,
            observer,
        }
    }

    /// Enqueues a task at the back of the queue.
    pub fn push(&self, task: Task) {
        // Send only fails once the worker is gone, at which point the
        // whole pipeline is shutting down.
        let _ = self.tx.send(task);
    }

    /// Drains the queue until `stop` fires, invoking each task's handler
    /// synchronously. In-flight tasks are abandoned on stop, not drained.
    pub async fn run(&self, stop: CancellationToken) {
        let Some(mut rx) = self.rx.lock().take() else {
            tracing::error!("queue worker already running, refusing to start another");
            return;
        };
        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                task = rx.recv() => match task {
                    Some(task) => self.process(task),
                    None => break,
                },
            }
        }
        tracing::debug!("queue worker terminated");
    }

    fn process(&self, mut task: Task) {
        let Err(err) = (task.run)() else { return };
        task.attempt += 1;
        match self.policy.max_attempts {
            Some(max) if task.attempt >= max.get() => {
                self.observer.event(task.kind, Outcome::Exhausted);
                tracing::error!(
                    kind = %task.kind,
                    event = %task.event,
                    attempts = task.attempt,
                    error = %err,
                    "dropping task after exhausting retries"
                );
            }
            _ => {
                self.observer.event(task.kind, Outcome::Retry);
                tracing::debug!(
                    kind = %task.kind,
                    event = %task.event,
                    attempt = task.attempt,
                    error = %err,
                    "task failed, re-queueing after delay"
                );
                let tx = self.tx.clone();
                let delay = self.policy.delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(task);
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Queue, RetryPolicy, Task};
    use crate::api::ResourceKind;
    use crate::handler::HandlerError;
    use crate::model::EventKind;
    use crate::observe::{EventObserver, Outcome};
    use parking_lot::Mutex;
    use std::{
        num::NonZeroU32,
        sync::{
            atomic::{AtomicU32, Ordering},
            Arc,
        },
        time::Duration,
    };
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct CountingObserver {
        outcomes: Mutex<Vec<Outcome>>,
    }

    impl EventObserver for CountingObserver {
        fn event(&self, _kind: ResourceKind, outcome: Outcome) {
            self.outcomes.lock().push(outcome);
        }
    }

    fn start(policy: RetryPolicy, observer: Arc<CountingObserver>) -> (Arc<Queue>, CancellationToken) {
        let queue = Arc::new(Queue::new(policy, observer));
        let stop = CancellationToken::new();
        let worker = queue.clone();
        let token = stop.clone();
        tokio::spawn(async move { worker.run(token).await });
        (queue, stop)
    }

    #[tokio::test(start_paused = true)]
    async fn drains_in_arrival_order() {
        let (queue, stop) = start(RetryPolicy::default(), Arc::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for i in 0..5 {
            let seen = seen.clone();
            queue.push(Task::new(ResourceKind::Service, EventKind::Add, move || {
                seen.lock().push(i);
                Ok(())
            }));
        }

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3, 4]);
        stop.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_task_reappears_after_the_delay() {
        let observer = Arc::new(CountingObserver::default());
        let (queue, stop) = start(RetryPolicy::default(), observer.clone());

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        queue.push(Task::new(ResourceKind::Workload, EventKind::Update, move || {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(HandlerError::NotSynced)
            } else {
                Ok(())
            }
        }));

        // First attempt fails immediately; the retry only lands after the
        // fixed delay has elapsed.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(*observer.outcomes.lock(), vec![Outcome::Retry]);
        stop.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_drop_the_task() {
        let observer = Arc::new(CountingObserver::default());
        let policy = RetryPolicy {
            delay: Duration::from_millis(100),
            max_attempts: NonZeroU32::new(3),
        };
        let (queue, stop) = start(policy, observer.clone());

        let attempts = Arc::new(AtomicU32::new(0));
        let counter = attempts.clone();
        queue.push(Task::new(ResourceKind::Node, EventKind::Delete, move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(HandlerError::NotSynced)
        }));

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(
            *observer.outcomes.lock(),
            vec![Outcome::Retry, Outcome::Retry, Outcome::Exhausted]
        );
        stop.cancel();
    }
}
