//! IPv6 → MAC resolution cache.
//!
//! Fixed-size table: 256 buckets of 5 slots, no allocation after startup.
//! Entries are learned from the source of every accepted inbound packet and
//! only ever disappear by being replaced.

use smoltcp::time::Instant;

use super::addr::multicast_mac;
use crate::types::{Ipv6Address, MacAddress};

/// Number of hash buckets.
pub const MAC_CACHE_BUCKETS: usize = 256;
/// Slots per bucket.
pub const MAC_CACHE_WAYS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacCacheEntry {
    pub ip: Ipv6Address,
    pub mac: MacAddress,
    pub last_used: Instant,
}

pub struct MacCache {
    buckets: Box<[[Option<MacCacheEntry>; MAC_CACHE_WAYS]; MAC_CACHE_BUCKETS]>,
}

impl MacCache {
    pub fn new() -> Self {
        Self {
            buckets: Box::new([[None; MAC_CACHE_WAYS]; MAC_CACHE_BUCKETS]),
        }
    }

    /// Bucket an address hashes to (XOR of the low 32 bits).
    pub fn bucket_of(ip: &Ipv6Address) -> usize {
        let a = ip.0;
        (a[12] ^ a[13] ^ a[14] ^ a[15]) as usize
    }

    /// Look up the link-layer address for `ip`.
    ///
    /// Multicast destinations resolve arithmetically; unicast ones scan a
    /// single bucket. A hit refreshes the entry's LRU stamp.
    pub fn resolve(&mut self, ip: &Ipv6Address, now: Instant) -> Option<MacAddress> {
        if ip.is_multicast() {
            return Some(multicast_mac(ip));
        }
        let bucket = &mut self.buckets[Self::bucket_of(ip)];
        let entry = bucket.iter_mut().flatten().find(|e| e.ip == *ip)?;
        entry.last_used = now;
        Some(entry.mac)
    }

    /// Record that `ip` lives at `mac`.
    pub fn learn(&mut self, mac: MacAddress, ip: &Ipv6Address, now: Instant) {
        let bucket = &mut self.buckets[Self::bucket_of(ip)];

        if let Some(entry) = bucket.iter_mut().flatten().find(|e| e.ip == *ip) {
            entry.mac = mac;
            entry.last_used = now;
            return;
        }

        let fresh = MacCacheEntry { ip: *ip, mac, last_used: now };
        if let Some(empty) = bucket.iter_mut().find(|s| s.is_none()) {
            *empty = Some(fresh);
            return;
        }

        // Bucket full: evict the least recently used slot.
        if let Some(victim) = bucket.iter_mut().min_by_key(|s| s.map(|e| e.last_used)) {
            *victim = Some(fresh);
        }
    }

    /// Number of live entries (for diagnostics).
    pub fn len(&self) -> usize {
        self.buckets.iter().flatten().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MacCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Addresses that all land in bucket 0x42.
    fn colliding(n: u8) -> Ipv6Address {
        Ipv6Address([0xFE, 0x80, 0, 0, 0, 0, 0, n, 0, 0, 0, 0, 0, 0, 0, 0x42])
    }

    fn mac(n: u8) -> MacAddress {
        MacAddress([2, 0, 0, 0, 0, n])
    }

    #[test]
    fn test_multicast_resolves_without_learning() {
        let mut cache = MacCache::new();
        let mac = cache.resolve(&Ipv6Address::LINK_LOCAL_ALL_NODES, Instant::ZERO);
        assert_eq!(mac, Some(MacAddress([0x33, 0x33, 0, 0, 0, 1])));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_unknown_unicast_misses() {
        let mut cache = MacCache::new();
        assert_eq!(cache.resolve(&colliding(1), Instant::ZERO), None);
    }

    #[test]
    fn test_learn_updates_in_place() {
        let mut cache = MacCache::new();
        cache.learn(mac(1), &colliding(1), Instant::from_millis(1));
        cache.learn(mac(2), &colliding(1), Instant::from_millis(2));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.resolve(&colliding(1), Instant::from_millis(3)), Some(mac(2)));
    }

    #[test]
    fn test_full_bucket_evicts_lru_only() {
        let mut cache = MacCache::new();
        for n in 0..5u8 {
            assert_eq!(MacCache::bucket_of(&colliding(n)), 0x42);
            cache.learn(mac(n), &colliding(n), Instant::from_millis(n as i64 * 10));
        }
        // Touch entry 0 so entry 1 becomes the oldest.
        assert!(cache.resolve(&colliding(0), Instant::from_millis(100)).is_some());

        cache.learn(mac(9), &colliding(9), Instant::from_millis(200));

        assert_eq!(cache.resolve(&colliding(1), Instant::from_millis(201)), None);
        for n in [0u8, 2, 3, 4, 9] {
            assert!(cache.resolve(&colliding(n), Instant::from_millis(202)).is_some(), "entry {n}");
        }
        assert_eq!(cache.len(), 5);
    }

    proptest! {
        #[test]
        fn prop_resolve_after_learn_hits(
            ips in prop::collection::vec(any::<[u8; 16]>(), 1..64),
        ) {
            let mut cache = MacCache::new();
            for (i, raw) in ips.iter().enumerate() {
                let mut raw = *raw;
                raw[0] = 0xFE; // keep it unicast
                let ip = Ipv6Address(raw);
                let m = MacAddress([2, 0, 0, 0, (i >> 8) as u8, i as u8]);
                let now = Instant::from_millis(i as i64);
                cache.learn(m, &ip, now);
                prop_assert_eq!(cache.resolve(&ip, now), Some(m));
            }
        }
    }
}
