use std::sync::atomic::{AtomicUsize, Ordering};

use basinio_types::{BasinError, BasinResult};
use parking_lot::Mutex;
use tracing::debug;

/// First error observed by any thread of a batch.
#[derive(Debug, Default)]
pub(crate) struct FirstError(Mutex<Option<BasinError>>);

impl FirstError {
    pub(crate) fn record(&self, error: BasinError) {
        let mut slot = self.0.lock();
        if slot.is_none() {
            *slot = Some(error);
        }
    }

    pub(crate) fn is_set(&self) -> bool {
        self.0.lock().is_some()
    }

    pub(crate) fn into_result(self) -> BasinResult<()> {
        match self.0.into_inner() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

/// Apply `f` to every item using the calling thread plus `threads - 1`
/// scoped workers.
///
/// Items are claimed through a shared counter, so each is visited exactly
/// once. With `threads <= 1` the items are processed in order on the calling
/// thread. The first error stops further claims and is returned.
pub fn for_each_parallel<T, F>(items: &mut [T], threads: usize, f: F) -> BasinResult<()>
where
    T: Send,
    F: Fn(&mut T) -> BasinResult<()> + Sync,
{
    let workers = threads.max(1).min(items.len()).saturating_sub(1);
    if workers == 0 {
        return items.iter_mut().try_for_each(&f);
    }
    debug!(items = items.len(), threads = workers + 1, "parallel batch");

    let slots: Vec<Mutex<&mut T>> = items.iter_mut().map(Mutex::new).collect();
    let next = AtomicUsize::new(0);
    let failure = FirstError::default();
    let run = || {
        while !failure.is_set() {
            let index = next.fetch_add(1, Ordering::Relaxed);
            let Some(slot) = slots.get(index) else {
                break;
            };
            let mut item = slot.lock();
            if let Err(error) = f(&mut item) {
                failure.record(error);
            }
        }
    };

    std::thread::scope(|scope| {
        for _ in 0..workers {
            scope.spawn(&run);
        }
        run();
    });
    failure.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visits_every_item_once() {
        for threads in [0, 1, 2, 8] {
            let mut items: Vec<u32> = (0..257).collect();
            for_each_parallel(&mut items, threads, |v| {
                *v *= 2;
                Ok(())
            })
            .unwrap();
            assert!(items.iter().enumerate().all(|(i, v)| *v == 2 * i as u32));
        }
    }

    #[test]
    fn empty_slice() {
        let mut items: Vec<u8> = Vec::new();
        for_each_parallel(&mut items, 4, |_| Ok(())).unwrap();
    }

    #[test]
    fn first_error_returned() {
        let mut items: Vec<u32> = (0..64).collect();
        let err = for_each_parallel(&mut items, 4, |v| {
            if *v == 10 {
                return Err(BasinError::Format("bad item".into()));
            }
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, BasinError::Format(_)));
    }
}
