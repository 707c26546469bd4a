use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::thread;

/// Runs `work` for every item on at most `limit` scoped workers.
///
/// Results come back in input order. An item whose work panicked yields `None`; the
/// worker that hit the panic keeps pulling the remaining items.
pub fn run_bounded<T, R, F>(items: &[T], limit: usize, work: F) -> Vec<Option<R>>
where
    T: Sync,
    R: Send,
    F: Fn(&T) -> R + Sync,
{
    let mut slots: Vec<Option<R>> = items.iter().map(|_| None).collect();
    if items.is_empty() {
        return slots;
    }

    let next = AtomicUsize::new(0);
    let finished = Mutex::new(Vec::with_capacity(items.len()));
    let workers = limit.clamp(1, items.len());
    thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(|| loop {
                let index = next.fetch_add(1, Ordering::Relaxed);
                let Some(item) = items.get(index) else {
                    break;
                };
                if let Ok(result) = catch_unwind(AssertUnwindSafe(|| work(item))) {
                    finished
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((index, result));
                }
            });
        }
    });

    for (index, result) in finished.into_inner().unwrap_or_else(PoisonError::into_inner) {
        slots[index] = Some(result);
    }
    slots
}
