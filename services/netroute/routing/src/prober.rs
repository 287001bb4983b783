//! Echo-based link latency measurement.

use netroute_wire::Address;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Outstanding echo probes keyed by neighbor address.
///
/// At most one probe per neighbor is pending. A pending probe keeps its
/// original send time until answered or expired.
#[derive(Debug, Clone, Default)]
pub struct LinkProber {
    outstanding: HashMap<Address, Instant>,
}

impl LinkProber {
    /// Create a prober with nothing outstanding
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember that an echo goes to `address` at `now`. Returns `false`
    /// when a probe is already pending, in which case nothing should be sent.
    pub fn record_probe(&mut self, address: Address, now: Instant) -> bool {
        match self.outstanding.entry(address) {
            Entry::Occupied(entry) => {
                debug!("Probe to {} still outstanding", entry.key());
                false
            }
            Entry::Vacant(entry) => {
                entry.insert(now);
                true
            }
        }
    }

    /// Match an echo response. Returns the round trip, or `None` when no
    /// probe to `address` is pending.
    pub fn process_response(&mut self, address: &Address, now: Instant) -> Option<Duration> {
        let sent_at = self.outstanding.remove(address)?;
        Some(now.saturating_duration_since(sent_at))
    }

    /// Drop probes older than `timeout` and return their addresses
    pub fn expire(&mut self, now: Instant, timeout: Duration) -> Vec<Address> {
        let mut expired: Vec<Address> = self
            .outstanding
            .iter()
            .filter(|(_, sent_at)| now.saturating_duration_since(**sent_at) > timeout)
            .map(|(address, _)| address.clone())
            .collect();
        expired.sort();

        for address in &expired {
            self.outstanding.remove(address);
        }
        expired
    }

    /// Whether a probe to `address` is pending
    pub fn is_pending(&self, address: &Address) -> bool {
        self.outstanding.contains_key(address)
    }

    /// Number of pending probes
    pub fn pending(&self) -> usize {
        self.outstanding.len()
    }
}

/// Link cost in milliseconds for a measured round trip
pub fn cost_from_rtt(rtt: Duration) -> f64 {
    rtt.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_measures_round_trip() {
        let mut prober = LinkProber::new();
        let start = Instant::now();
        assert!(prober.record_probe(Address::from("b@net"), start));
        assert!(prober.is_pending(&Address::from("b@net")));

        let rtt = prober
            .process_response(&Address::from("b@net"), start + Duration::from_millis(25))
            .unwrap();
        assert_eq!(rtt, Duration::from_millis(25));
        assert_eq!(cost_from_rtt(rtt), 25.0);
        assert_eq!(prober.pending(), 0);
    }

    #[test]
    fn test_unsolicited_response_is_rejected() {
        let mut prober = LinkProber::new();
        assert!(prober
            .process_response(&Address::from("x@net"), Instant::now())
            .is_none());
    }

    #[test]
    fn test_response_is_matched_once() {
        let mut prober = LinkProber::new();
        let start = Instant::now();
        prober.record_probe(Address::from("b@net"), start);

        assert!(prober.process_response(&Address::from("b@net"), start).is_some());
        assert!(prober.process_response(&Address::from("b@net"), start).is_none());
    }

    #[test]
    fn test_pending_probe_keeps_send_time() {
        let mut prober = LinkProber::new();
        let start = Instant::now();
        assert!(prober.record_probe(Address::from("b@net"), start));
        assert!(!prober.record_probe(Address::from("b@net"), start + Duration::from_secs(3)));

        let rtt = prober
            .process_response(&Address::from("b@net"), start + Duration::from_secs(4))
            .unwrap();
        assert_eq!(rtt, Duration::from_secs(4));
    }

    #[test]
    fn test_expire_drops_only_old_probes() {
        let mut prober = LinkProber::new();
        let start = Instant::now();
        prober.record_probe(Address::from("b@net"), start);
        prober.record_probe(Address::from("c@net"), start + Duration::from_secs(8));

        let expired = prober.expire(start + Duration::from_secs(10), Duration::from_secs(5));
        assert_eq!(expired, vec![Address::from("b@net")]);
        assert!(prober.is_pending(&Address::from("c@net")));
    }
}
