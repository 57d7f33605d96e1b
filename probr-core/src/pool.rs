use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::PoolConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("worker pool exhausted ({max} workers in use)")]
pub struct PoolExhausted {
    pub max: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Workers created so far.
    pub size: u64,
    pub in_use: u64,
    pub peak_in_use: u64,
    pub max: u64,
}

#[derive(Debug)]
struct Slot {
    id: u64,
    iterations: u64,
}

#[derive(Debug)]
struct PoolState {
    /// Idle workers; the most recently released one is reused first.
    idle: Vec<Slot>,
    created: u64,
    in_use: u64,
    peak_in_use: u64,
}

/// Bounded set of reusable workers.
///
/// Starts with `pre_allocated` idle workers and grows on demand up to `max`. Acquisition never
/// waits: callers get a worker or [`PoolExhausted`].
#[derive(Debug)]
pub struct WorkerPool {
    max: u64,
    state: Mutex<PoolState>,
}

impl WorkerPool {
    pub fn new(cfg: PoolConfig) -> Arc<Self> {
        let pre_allocated = cfg.pre_allocated.min(cfg.max);
        let idle = (0..pre_allocated)
            .rev()
            .map(|id| Slot { id, iterations: 0 })
            .collect();

        Arc::new(Self {
            max: cfg.max,
            state: Mutex::new(PoolState {
                idle,
                created: pre_allocated,
                in_use: 0,
                peak_in_use: 0,
            }),
        })
    }

    pub fn try_acquire(self: &Arc<Self>) -> Result<Worker, PoolExhausted> {
        let mut st = self.state.lock();

        let slot = match st.idle.pop() {
            Some(slot) => slot,
            None if st.created < self.max => {
                let id = st.created;
                st.created += 1;
                Slot { id, iterations: 0 }
            }
            None => return Err(PoolExhausted { max: self.max }),
        };

        st.in_use += 1;
        st.peak_in_use = st.peak_in_use.max(st.in_use);

        Ok(Worker {
            slot: Some(slot),
            pool: Arc::clone(self),
        })
    }

    /// Returns `worker` to the idle set. Equivalent to dropping it.
    pub fn release(&self, worker: Worker) {
        drop(worker);
    }

    fn put_back(&self, slot: Slot) {
        let mut st = self.state.lock();
        st.in_use = st.in_use.saturating_sub(1);
        st.idle.push(slot);
    }

    pub fn size(&self) -> u64 {
        self.state.lock().created
    }

    pub fn in_use(&self) -> u64 {
        self.state.lock().in_use
    }

    pub fn peak_in_use(&self) -> u64 {
        self.state.lock().peak_in_use
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn stats(&self) -> PoolStats {
        let st = self.state.lock();
        PoolStats {
            size: st.created,
            in_use: st.in_use,
            peak_in_use: st.peak_in_use,
            max: self.max,
        }
    }
}

/// A checked-out worker. Returns itself to the pool on drop.
#[derive(Debug)]
pub struct Worker {
    slot: Option<Slot>,
    pool: Arc<WorkerPool>,
}

impl Worker {
    pub fn id(&self) -> u64 {
        self.slot.as_ref().map(|s| s.id).unwrap_or_default()
    }

    /// Iterations this worker has run across all checkouts.
    pub fn iterations(&self) -> u64 {
        self.slot.as_ref().map(|s| s.iterations).unwrap_or_default()
    }

    pub(crate) fn count_iteration(&mut self) {
        if let Some(slot) = self.slot.as_mut() {
            slot.iterations += 1;
        }
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.pool.put_back(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(pre_allocated: u64, max: u64) -> Arc<WorkerPool> {
        WorkerPool::new(PoolConfig { pre_allocated, max })
    }

    #[test]
    fn grows_on_demand_up_to_max() {
        let p = pool(1, 3);
        assert_eq!(p.size(), 1);

        let a = p.try_acquire().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(p.size(), 1);
        let b = p.try_acquire().unwrap_or_else(|e| panic!("{e}"));
        let c = p.try_acquire().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(p.size(), 3);
        assert_eq!(p.in_use(), 3);

        let err = match p.try_acquire() {
            Ok(_) => panic!("expected exhaustion"),
            Err(e) => e,
        };
        assert_eq!(err, PoolExhausted { max: 3 });

        drop(a);
        p.release(b);
        drop(c);
        assert_eq!(p.in_use(), 0);
        assert_eq!(p.peak_in_use(), 3);
        assert_eq!(p.size(), 3);
    }

    #[test]
    fn reuses_most_recently_released_worker() {
        let p = pool(2, 2);
        let mut a = p.try_acquire().unwrap_or_else(|e| panic!("{e}"));
        let b = p.try_acquire().unwrap_or_else(|e| panic!("{e}"));
        let a_id = a.id();
        a.count_iteration();

        drop(b);
        drop(a);

        let again = p.try_acquire().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(again.id(), a_id);
        assert_eq!(again.iterations(), 1);
        assert_eq!(p.size(), 2);
    }

    #[test]
    fn zero_preallocated_creates_lazily() {
        let p = pool(0, 1);
        assert_eq!(p.size(), 0);
        let w = p.try_acquire().unwrap_or_else(|e| panic!("{e}"));
        assert_eq!(p.size(), 1);
        assert!(p.try_acquire().is_err());
        drop(w);
        assert!(p.try_acquire().is_ok());
    }

    #[test]
    fn acquire_storm_never_exceeds_max() {
        let p = pool(2, 8);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                let p = Arc::clone(&p);
                scope.spawn(move || {
                    for _ in 0..2_000 {
                        if let Ok(w) = p.try_acquire() {
                            assert!(p.in_use() <= p.max());
                            std::hint::spin_loop();
                            drop(w);
                        }
                    }
                });
            }
        });

        let stats = p.stats();
        assert!(stats.peak_in_use <= 8, "peak={}", stats.peak_in_use);
        assert!(stats.size <= 8);
        assert_eq!(stats.in_use, 0);
    }
}
