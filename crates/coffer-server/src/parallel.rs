//! Fan-out primitives over the shared runtime.
//!
//! `parallel_map` runs one task per input on the runtime's work-stealing
//! scheduler. `parallel_merge` reduces sorted key sets pairwise, splitting
//! in half and recursing so independent halves merge concurrently.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::task::{JoinError, JoinSet};

use coffer_core::{merge_pair, Comparator};

/// Applies `map` to every item concurrently and collects the outputs.
/// Output order is completion order, not input order. Panics in a task
/// propagate to the caller.
pub async fn parallel_map<T, R, F, Fut>(items: Vec<T>, map: F) -> Vec<R>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(T) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
{
    let mut tasks = JoinSet::new();
    for item in items {
        tasks.spawn(map(item));
    }
    let mut outputs = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        outputs.push(unwrap_join(joined));
    }
    outputs
}

/// Merges comparator-sorted key sets into one sorted, deduplicated sequence.
///
/// Divide-and-conquer: zero or one set is identity, two merge directly,
/// more split in half with each half reduced in its own task.
pub fn parallel_merge(
    mut sets: Vec<Vec<String>>,
    comparator: Arc<dyn Comparator>,
) -> Pin<Box<dyn Future<Output = Vec<String>> + Send>> {
    Box::pin(async move {
        match sets.len() {
            0 => Vec::new(),
            1 => sets.swap_remove(0),
            2 => {
                let right = sets.swap_remove(1);
                let left = sets.swap_remove(0);
                merge_pair(left, right, &*comparator)
            }
            _ => {
                let right_half = sets.split_off(sets.len() / 2);
                let left_task = tokio::spawn(parallel_merge(sets, comparator.clone()));
                let right_task = tokio::spawn(parallel_merge(right_half, comparator.clone()));
                let left = unwrap_join(left_task.await);
                let right = unwrap_join(right_task.await);
                merge_pair(left, right, &*comparator)
            }
        }
    })
}

fn unwrap_join<R>(joined: Result<R, JoinError>) -> R {
    match joined {
        Ok(output) => output,
        Err(error) => match error.try_into_panic() {
            Ok(payload) => std::panic::resume_unwind(payload),
            // cancellation only happens at shutdown; there is no caller left
            Err(error) => panic!("fan-out task cancelled: {error}"),
        },
    }
}
