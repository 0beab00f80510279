//! Single-flight coordinator
//!
//! At most one execution of an operation is pending at a time. A caller
//! arriving while one is pending attaches to it and receives a clone of
//! the same output instead of starting new work.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Output of a flight; `None` when its task panicked
type FlightOutput<T> = Shared<BoxFuture<'static, Option<T>>>;

struct Flight<T: Clone> {
    id: u64,
    output: FlightOutput<T>,
}

pub struct SingleFlight<T: Clone> {
    /// The pending flight, cleared by its task when the work finishes
    pending: Arc<Mutex<Option<Flight<T>>>>,
    next_id: AtomicU64,
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(None)),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.pending.lock().is_some()
    }

    /// Run the future produced by `start`, or join the one already pending.
    /// `start` is only called when nothing is pending.
    ///
    /// The work runs on its own task, so it completes even when every
    /// caller stops waiting. Returns `None` if that task panicked.
    pub async fn run<F, Fut>(&self, start: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let (id, output) = {
            let mut pending = self.pending.lock();
            match pending.as_ref() {
                Some(flight) => {
                    tracing::trace!("Joining in-flight operation {}", flight.id);
                    (flight.id, flight.output.clone())
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let slot = Arc::downgrade(&self.pending);
                    let work = start();
                    let task = tokio::spawn(async move {
                        let output = work.await;
                        if let Some(slot) = slot.upgrade() {
                            clear(&slot, id);
                        }
                        output
                    });
                    let output = task.map(|joined| joined.ok()).boxed().shared();
                    *pending = Some(Flight {
                        id,
                        output: output.clone(),
                    });
                    (id, output)
                }
            }
        };

        let output = output.await;
        if output.is_none() {
            tracing::error!("Operation {} panicked", id);
            clear(&self.pending, id);
        }
        output
    }
}

fn clear<T: Clone>(pending: &Mutex<Option<Flight<T>>>, id: u64) {
    let mut pending = pending.lock();
    if pending.as_ref().is_some_and(|flight| flight.id == id) {
        *pending = None;
    }
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::join_all;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn run_counted(flight: &SingleFlight<usize>, calls: Arc<AtomicUsize>) -> usize {
        flight
            .run(move || async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                calls.fetch_add(1, Ordering::SeqCst) + 1
            })
            .await
            .expect("flight task panicked")
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_run() {
        let flight = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let outputs = join_all((0..4).map(|_| run_counted(&flight, calls.clone()))).await;
        assert_eq!(outputs, vec![1, 1, 1, 1]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flight.is_in_flight());
    }

    #[tokio::test]
    async fn test_sequential_callers_run_again() {
        let flight = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        assert_eq!(run_counted(&flight, calls.clone()).await, 1);
        assert_eq!(run_counted(&flight, calls.clone()).await, 2);
    }

    #[tokio::test]
    async fn test_abandoned_run_still_completes() {
        let flight = SingleFlight::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(Duration::from_millis(1), async {
            flight
                .run({
                    let calls = calls.clone();
                    move || async move {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        calls.fetch_add(1, Ordering::SeqCst) + 1
                    }
                })
                .await
        })
        .await;
        assert!(abandoned.is_err());
        assert!(flight.is_in_flight());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!flight.is_in_flight());
    }

    #[tokio::test]
    async fn test_panicking_run_clears_slot() {
        let flight: SingleFlight<usize> = SingleFlight::new();

        let output = flight.run(|| async { panic!("capture backend crashed") }).await;

        assert!(output.is_none());
        assert!(!flight.is_in_flight());
        assert_eq!(flight.run(|| async { 7 }).await, Some(7));
    }

    proptest! {
        #[test]
        fn prop_one_execution_per_burst(callers in 1usize..16, bursts in 1usize..4) {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();

            runtime.block_on(async {
                let flight = SingleFlight::new();
                let calls = Arc::new(AtomicUsize::new(0));
                for burst in 1..=bursts {
                    let outputs = join_all((0..callers).map(|_| run_counted(&flight, calls.clone()))).await;
                    prop_assert!(outputs.iter().all(|o| *o == burst));
                }
                prop_assert_eq!(calls.load(Ordering::SeqCst), bursts);
                Ok(())
            })?;
        }
    }
}
