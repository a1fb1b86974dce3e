/// Per-event orchestration, run from the radio callback.
///
/// The dispatcher owns all detection state (matcher and one filter chain
/// per tracked identity) plus a liveness handle and a reference to the
/// publish queue. Its only side effects are in-memory updates and a
/// non-blocking enqueue.

use heapless::Vec;

use crate::defaults;
use crate::filter::FilterChain;
use crate::matcher::{DeviceMatcher, TrackedIdentity};
use crate::scanner::{format_addr, ScanEvent};
use crate::scheduler::{PublishJob, PublishScheduler};
use crate::watchdog::Liveness;

/// Maximum number of tracked identities
pub const MAX_IDENTITIES: usize = 4;

/// What the dispatcher did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Advertisement from an untracked device
    Ignored,
    /// Matched; this job was queued
    Queued(PublishJob),
    /// The scan round ended
    ScanDone,
    /// Unknown event kind
    Unexpected,
}

pub struct ScanEventDispatcher<'q, L, const Q: usize> {
    matcher: DeviceMatcher<MAX_IDENTITIES>,
    /// Indexed like the matcher's registry
    chains: Vec<FilterChain, MAX_IDENTITIES>,
    liveness: L,
    queue: &'q PublishScheduler<Q>,
}

impl<'q, L: Liveness, const Q: usize> ScanEventDispatcher<'q, L, Q> {
    /// Build a dispatcher for `identities`, giving each its filter chain
    /// from `windows(id)`.
    pub fn new(
        identities: impl IntoIterator<Item = TrackedIdentity>,
        windows: impl Fn(&str) -> &'static [u16],
        seed: i32,
        liveness: L,
        queue: &'q PublishScheduler<Q>,
    ) -> Self {
        let matcher = DeviceMatcher::with_identities(identities);
        let chains = matcher
            .identities()
            .iter()
            .map(|identity| FilterChain::with_windows(seed, windows(identity.id())))
            .collect();
        Self {
            matcher,
            chains,
            liveness,
            queue,
        }
    }

    /// Dispatcher over the compiled-in identities and filter settings.
    pub fn with_defaults(liveness: L, queue: &'q PublishScheduler<Q>) -> Self {
        Self::new(
            defaults::identities(),
            defaults::filter_windows,
            defaults::RSSI_SEED,
            liveness,
            queue,
        )
    }

    pub fn matcher(&self) -> &DeviceMatcher<MAX_IDENTITIES> {
        &self.matcher
    }

    pub fn liveness(&self) -> &L {
        &self.liveness
    }

    /// Handle one radio event observed at `now_ms`.
    pub fn on_event(&mut self, event: ScanEvent<'_>, now_ms: u64) -> DispatchOutcome {
        match event {
            ScanEvent::ScanResult(adv) => {
                // Any advertisement proves the radio is alive
                self.liveness.reassure(now_ms);

                let Some(hit) = self.matcher.classify(&adv) else {
                    return DispatchOutcome::Ignored;
                };
                let Some(chain) = self.chains.get_mut(hit.index) else {
                    return DispatchOutcome::Ignored;
                };
                let job = PublishJob {
                    device_id: hit.id,
                    value: chain.apply(adv.rssi),
                };
                log::trace!(
                    "{} seen at {} rssi {} -> {}",
                    hit.id,
                    format_addr(&adv.addr),
                    adv.rssi,
                    job.value
                );
                self.queue.enqueue(job);
                DispatchOutcome::Queued(job)
            }
            ScanEvent::ScanDone => {
                log::info!("Scan done");
                DispatchOutcome::ScanDone
            }
            ScanEvent::Other(code) => {
                log::warn!("Unexpected radio event {}", code);
                DispatchOutcome::Unexpected
            }
        }
    }
}
