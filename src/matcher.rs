/// Device classification for observed advertisements.
///
/// Each tracked identity carries a rule. Fingerprinted identities learn the
/// address they were last seen on, so they keep matching across address
/// rotations as long as one fingerprint hit lands between rotations. The
/// learned address is never expired: if an unrelated broadcaster reuses it,
/// it is misclassified until the next fingerprint hit corrects it.

use heapless::Vec;

use crate::scanner::{format_addr, Address, Advertisement};

/// Fixed byte pattern at a fixed offset of the raw payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub offset: usize,
    pub pattern: &'static [u8],
}

impl Fingerprint {
    /// True if `data` holds the pattern at the offset. Payloads too short
    /// to contain it never match.
    pub fn matches(&self, data: &[u8]) -> bool {
        let end = self.offset + self.pattern.len();
        data.get(self.offset..end) == Some(self.pattern)
    }
}

/// How a tracked identity recognises its advertisements
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityRule {
    /// Payload fingerprint, falling back to the last address it was seen on
    Fingerprint(Fingerprint),
    /// Exact address equality, no learning
    FixedAddress(Address),
}

/// A device the matcher is looking for
#[derive(Debug, Clone)]
pub struct TrackedIdentity {
    id: &'static str,
    rule: IdentityRule,
    learned: Option<Address>,
}

impl TrackedIdentity {
    pub const fn new(id: &'static str, rule: IdentityRule) -> Self {
        Self {
            id,
            rule,
            learned: None,
        }
    }

    /// Telemetry identifier
    pub fn id(&self) -> &'static str {
        self.id
    }

    pub fn rule(&self) -> &IdentityRule {
        &self.rule
    }

    /// Address learned from the most recent fingerprint hit, if any
    pub fn learned_addr(&self) -> Option<Address> {
        self.learned
    }

    /// Test `adv` against this identity, updating the learned address on a
    /// fingerprint hit.
    pub fn matches(&mut self, adv: &Advertisement<'_>) -> bool {
        match self.rule {
            IdentityRule::Fingerprint(fp) => {
                if fp.matches(adv.data) {
                    if self.learned != Some(adv.addr) {
                        log::debug!("{} now at {}", self.id, format_addr(&adv.addr));
                    }
                    self.learned = Some(adv.addr);
                    true
                } else {
                    self.learned == Some(adv.addr)
                }
            }
            IdentityRule::FixedAddress(addr) => adv.addr == addr,
        }
    }
}

/// A successful classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Position of the identity in the registry
    pub index: usize,
    pub id: &'static str,
}

/// Ordered registry of tracked identities. The first identity that matches
/// wins.
pub struct DeviceMatcher<const N: usize> {
    identities: Vec<TrackedIdentity, N>,
}

impl<const N: usize> DeviceMatcher<N> {
    pub const fn new() -> Self {
        Self {
            identities: Vec::new(),
        }
    }

    /// Build a matcher from `identities`, keeping at most `N` of them.
    pub fn with_identities(identities: impl IntoIterator<Item = TrackedIdentity>) -> Self {
        let mut matcher = Self::new();
        for identity in identities {
            if let Err(rejected) = matcher.register(identity) {
                log::warn!("Identity registry full, ignoring {}", rejected.id());
            }
        }
        matcher
    }

    /// Append an identity. Hands it back if the registry is full.
    pub fn register(&mut self, identity: TrackedIdentity) -> Result<(), TrackedIdentity> {
        self.identities.push(identity)
    }

    pub fn identities(&self) -> &[TrackedIdentity] {
        &self.identities
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Classify an advertisement against the registry.
    pub fn classify(&mut self, adv: &Advertisement<'_>) -> Option<Match> {
        self.identities
            .iter_mut()
            .enumerate()
            .find_map(|(index, identity)| {
                identity.matches(adv).then(|| Match {
                    index,
                    id: identity.id(),
                })
            })
    }
}

impl<const N: usize> Default for DeviceMatcher<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::{self, BEACON_ADDR, BEACON_ID, WEARABLE_ID};
    use crate::scanner::{addr_type, adv_type};

    const ADDR_A: Address = [0x49, 0xBA, 0xC8, 0xFB, 0x5A, 0x6F];
    const ADDR_B: Address = [0x5E, 0x11, 0x22, 0x33, 0x44, 0x55];

    /// Continuity advertisement: flags AD, then manufacturer data carrying
    /// the proximity-pairing marker at byte 8.
    const WATCH_PAYLOAD: &[u8] = &[
        0x02, 0x01, 0x1A, 0x0E, 0xFF, 0x00, 0x00, 0x00, 0x4C, 0x00, 0x10, 0x05, 0x01, 0x98,
        0x1C, 0x2B, 0x3A,
    ];

    const OTHER_PAYLOAD: &[u8] = &[
        0x02, 0x01, 0x06, 0x0B, 0xFF, 0x4C, 0x00, 0x09, 0x06, 0x03, 0x1E, 0xC0, 0xA8, 0x01,
    ];

    fn adv<'a>(addr: Address, data: &'a [u8]) -> Advertisement<'a> {
        Advertisement {
            addr_type: addr_type::RANDOM,
            addr,
            adv_type: adv_type::ADV_IND,
            rssi: -60,
            data,
        }
    }

    fn default_matcher() -> DeviceMatcher<4> {
        DeviceMatcher::with_identities(defaults::identities())
    }

    #[test]
    fn fingerprint_matches_regardless_of_address() {
        let mut m = default_matcher();
        for addr in [ADDR_A, ADDR_B, [0; 6], [0xFF; 6]] {
            let hit = m.classify(&adv(addr, WATCH_PAYLOAD)).unwrap();
            assert_eq!(hit.id, WEARABLE_ID);
            assert_eq!(hit.index, 0);
        }
    }

    #[test]
    fn fingerprint_at_wrong_offset_does_not_match() {
        let mut m = default_matcher();
        let shifted = &WATCH_PAYLOAD[1..];
        assert_eq!(m.classify(&adv(ADDR_A, shifted)), None);
    }

    #[test]
    fn short_payload_does_not_match() {
        let mut m = default_matcher();
        assert_eq!(m.classify(&adv(ADDR_A, &WATCH_PAYLOAD[..13])), None);
        assert_eq!(m.classify(&adv(ADDR_A, &[])), None);
    }

    #[test]
    fn learned_address_persists_without_fingerprint() {
        let mut m = default_matcher();
        m.classify(&adv(ADDR_A, WATCH_PAYLOAD)).unwrap();
        assert_eq!(m.identities()[0].learned_addr(), Some(ADDR_A));

        let hit = m.classify(&adv(ADDR_A, OTHER_PAYLOAD)).unwrap();
        assert_eq!(hit.id, WEARABLE_ID);
    }

    #[test]
    fn unlearned_address_does_not_match() {
        let mut m = default_matcher();
        assert_eq!(m.classify(&adv(ADDR_A, OTHER_PAYLOAD)), None);
    }

    #[test]
    fn fingerprint_hit_follows_address_rotation() {
        let mut m = default_matcher();
        m.classify(&adv(ADDR_A, WATCH_PAYLOAD)).unwrap();
        m.classify(&adv(ADDR_B, WATCH_PAYLOAD)).unwrap();
        assert_eq!(m.identities()[0].learned_addr(), Some(ADDR_B));

        // Old address is forgotten once the device has moved on
        assert_eq!(m.classify(&adv(ADDR_A, OTHER_PAYLOAD)), None);
        assert!(m.classify(&adv(ADDR_B, OTHER_PAYLOAD)).is_some());
    }

    #[test]
    fn fixed_address_matches_any_payload() {
        let mut m = default_matcher();
        for data in [OTHER_PAYLOAD, &[][..], &[0xAA; 31][..]] {
            let hit = m.classify(&adv(BEACON_ADDR, data)).unwrap();
            assert_eq!(hit.id, BEACON_ID);
            assert_eq!(hit.index, 1);
        }
    }

    #[test]
    fn fixed_address_does_not_learn() {
        let mut m = default_matcher();
        m.classify(&adv(BEACON_ADDR, OTHER_PAYLOAD)).unwrap();
        assert_eq!(m.identities()[1].learned_addr(), None);
    }

    #[test]
    fn first_matching_identity_wins() {
        let mut m = default_matcher();
        // Fingerprint from the beacon's address: the wearable is ahead in the
        // registry, and its learned address now shadows the beacon.
        let hit = m.classify(&adv(BEACON_ADDR, WATCH_PAYLOAD)).unwrap();
        assert_eq!(hit.id, WEARABLE_ID);
        let hit = m.classify(&adv(BEACON_ADDR, OTHER_PAYLOAD)).unwrap();
        assert_eq!(hit.id, WEARABLE_ID);
    }

    #[test]
    fn register_rejects_when_full() {
        let mut m = DeviceMatcher::<1>::new();
        assert!(m
            .register(TrackedIdentity::new("a", IdentityRule::FixedAddress(ADDR_A)))
            .is_ok());
        let rejected = m
            .register(TrackedIdentity::new("b", IdentityRule::FixedAddress(ADDR_B)))
            .unwrap_err();
        assert_eq!(rejected.id(), "b");
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn empty_registry_matches_nothing() {
        let mut m = DeviceMatcher::<2>::new();
        assert!(m.is_empty());
        assert_eq!(m.classify(&adv(BEACON_ADDR, WATCH_PAYLOAD)), None);
    }
}
