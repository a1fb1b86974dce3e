/// Deferred publish queue.
///
/// The radio callback must not block or touch the network, so matched
/// samples are queued here and published later from the main loop. Single
/// producer (scan callback), single consumer (drain loop), strict FIFO.
///
/// Capacity is fixed. When the queue is full the oldest job is evicted so
/// the newest reading always gets through; evictions are counted and
/// reported by the next drain.

use core::cell::RefCell;

use critical_section::Mutex;
use heapless::Deque;

/// One pending telemetry emission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishJob {
    pub device_id: &'static str,
    pub value: i32,
}

/// Consumer side of the queue
pub trait JobSink {
    fn publish(&mut self, job: PublishJob);
}

struct Inner<const N: usize> {
    jobs: Deque<PublishJob, N>,
    evicted: u32,
}

pub struct PublishScheduler<const N: usize> {
    inner: Mutex<RefCell<Inner<N>>>,
}

impl<const N: usize> PublishScheduler<N> {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Inner {
                jobs: Deque::new(),
                evicted: 0,
            })),
        }
    }

    /// Queue a job. Never blocks; safe from the radio callback.
    ///
    /// Returns the job evicted to make room, if the queue was full.
    pub fn enqueue(&self, job: PublishJob) -> Option<PublishJob> {
        critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            let evicted = if inner.jobs.is_full() {
                inner.evicted = inner.evicted.saturating_add(1);
                inner.jobs.pop_front()
            } else {
                None
            };
            // Cannot fail: there is room after the eviction above
            let _ = inner.jobs.push_back(job);
            evicted
        })
    }

    /// Remove the oldest job, if any.
    pub fn dequeue(&self) -> Option<PublishJob> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).jobs.pop_front())
    }

    pub fn len(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).jobs.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Publish every queued job in FIFO order. Call from ordinary execution
    /// context only.
    ///
    /// Each job is taken under a short critical section and published
    /// outside it, so jobs queued while draining are picked up in the same
    /// pass. Returns the number of jobs dispatched.
    pub fn drain<S: JobSink + ?Sized>(&self, sink: &mut S) -> usize {
        let evicted = critical_section::with(|cs| {
            let mut inner = self.inner.borrow_ref_mut(cs);
            core::mem::take(&mut inner.evicted)
        });
        if evicted > 0 {
            log::warn!("Publish queue overflowed, {} oldest samples dropped", evicted);
        }

        let mut count = 0;
        while let Some(job) = self.dequeue() {
            sink.publish(job);
            count += 1;
        }
        count
    }
}

impl<const N: usize> Default for PublishScheduler<N> {
    fn default() -> Self {
        Self::new()
    }
}
