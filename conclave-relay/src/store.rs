#![forbid(unsafe_code)]

//! In-memory relay state: capabilities, events, the recent-id prefix
//! window, and rate-limit counters. All of it is mutated only by the
//! relay's single writer.

use std::collections::{HashMap, HashSet, VecDeque};

use conclave_core::capability::{Capability, RateQuota};

use crate::event::{kinds, Event};
use crate::filter::Filter;

/// Capabilities indexed by holder and by originating event id, plus the
/// revocation set. A revocation kills the grant and everything derived
/// from it.
#[derive(Default)]
pub struct CapabilityStore {
    by_id: HashMap<[u8; 32], Capability>,
    by_holder: HashMap<[u8; 32], Vec<[u8; 32]>>,
    revoked: HashSet<[u8; 32]>,
}

impl CapabilityStore {
    pub fn insert(&mut self, capability: Capability) {
        self.by_holder
            .entry(capability.holder)
            .or_default()
            .push(capability.event_id);
        self.by_id.insert(capability.event_id, capability);
    }

    pub fn revoke(&mut self, event_id: [u8; 32]) {
        self.revoked.insert(event_id);
    }

    pub fn is_revoked(&self, event_id: &[u8; 32]) -> bool {
        self.revoked.contains(event_id)
    }

    pub fn get(&self, event_id: &[u8; 32]) -> Option<&Capability> {
        self.by_id.get(event_id)
    }

    /// A capability is alive if neither it nor any link of its delegation
    /// chain has been revoked.
    pub fn is_alive(&self, capability: &Capability) -> bool {
        if self.revoked.contains(&capability.event_id) {
            return false;
        }
        if let Some(parent) = &capability.references {
            if self.revoked.contains(parent) {
                return false;
            }
        }
        !capability
            .chain
            .iter()
            .any(|link| self.revoked.contains(&link.event_id))
    }

    /// Live capabilities held by `holder`, in grant order.
    pub fn for_holder(&self, holder: &[u8; 32]) -> Vec<&Capability> {
        self.by_holder
            .get(holder)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.by_id.get(id))
                    .filter(|c| self.is_alive(c))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Capability> {
        self.by_id.values()
    }

    pub fn revocations(&self) -> impl Iterator<Item = &[u8; 32]> {
        self.revoked.iter()
    }
}

/// Insertion-ordered event store. Group snapshot kinds (39000-39002) are
/// replaceable per `(kind, d)`.
#[derive(Default)]
pub struct EventStore {
    by_id: HashMap<String, Event>,
    order: Vec<String>,
}

impl EventStore {
    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Event> {
        self.by_id.get(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn insert(&mut self, event: Event) {
        if self.by_id.contains_key(&event.id) {
            return;
        }

        if kinds::is_group_snapshot(event.kind) {
            let group = event.tag_value("d").map(str::to_string);
            if let Some(group) = group {
                let stale: Vec<String> = self
                    .order
                    .iter()
                    .filter(|id| {
                        self.by_id.get(*id).is_some_and(|e| {
                            e.kind == event.kind && e.tag_value("d") == Some(group.as_str())
                        })
                    })
                    .cloned()
                    .collect();
                for id in stale {
                    self.remove(&id);
                }
            }
        }

        self.order.push(event.id.clone());
        self.by_id.insert(event.id.clone(), event);
    }

    pub fn remove(&mut self, id: &str) -> Option<Event> {
        self.order.retain(|stored| stored != id);
        self.by_id.remove(id)
    }

    /// Union of per-filter matches, newest first, each filter's `limit`
    /// applied individually.
    pub fn query(&self, filters: &[Filter]) -> Vec<&Event> {
        let mut seen = HashSet::new();
        let mut results = Vec::new();

        for filter in filters {
            let mut taken = 0usize;
            let limit = filter.limit.unwrap_or(usize::MAX);
            for id in self.order.iter().rev() {
                if taken >= limit {
                    break;
                }
                let Some(event) = self.by_id.get(id) else {
                    continue;
                };
                if filter.matches(event) {
                    taken += 1;
                    if seen.insert(id.clone()) {
                        results.push(event);
                    }
                }
            }
        }

        results
    }
}

/// Bounded ring of recent event ids for timeline-reference validation.
/// Prefix collisions are tolerated; the mechanism is advisory ordering.
pub struct RecentIds {
    ring: VecDeque<String>,
    capacity: usize,
}

impl RecentIds {
    pub const DEFAULT_CAPACITY: usize = 1000;

    pub fn new(capacity: usize) -> Self {
        Self {
            ring: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, id: &str) {
        if self.ring.len() == self.capacity {
            self.ring.pop_front();
        }
        self.ring.push_back(id.to_string());
    }

    pub fn matches_prefix(&self, prefix: &str) -> bool {
        self.ring.iter().any(|id| id.starts_with(prefix))
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }
}

impl Default for RecentIds {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// Sliding-window counters enforcing per-grant rate quotas, keyed by
/// (holder, grant event id).
#[derive(Default)]
pub struct RateCounters {
    windows: HashMap<([u8; 32], [u8; 32]), VecDeque<i64>>,
}

impl RateCounters {
    /// Record one use at `now` if the quota allows it; false when the
    /// window is already full.
    pub fn check_and_record(
        &mut self,
        holder: [u8; 32],
        grant_id: [u8; 32],
        quota: RateQuota,
        now: i64,
    ) -> bool {
        let window = self.windows.entry((holder, grant_id)).or_default();
        let horizon = now - quota.period_secs as i64;
        while window.front().is_some_and(|&t| t <= horizon) {
            window.pop_front();
        }

        if window.len() >= quota.count as usize {
            return false;
        }
        window.push_back(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::capability::{grant_tags, CapabilityType, Qualifiers};
    use conclave_core::Keypair;
    use k256::elliptic_curve::rand_core::OsRng;

    fn capability(id: u8, holder: [u8; 32]) -> Capability {
        let tags = grant_tags(&holder, CapabilityType::Write, &Qualifiers::default(), None);
        Capability::from_grant([id; 32], [0xFF; 32], 0, &tags).unwrap()
    }

    #[test]
    fn revocation_kills_grant_and_descendants() {
        let mut store = CapabilityStore::default();
        let holder = [0x11; 32];
        store.insert(capability(1, holder));
        assert_eq!(store.for_holder(&holder).len(), 1);

        store.revoke([1; 32]);
        assert!(store.for_holder(&holder).is_empty());

        // A later grant with a different id is unaffected.
        store.insert(capability(2, holder));
        assert_eq!(store.for_holder(&holder).len(), 1);
    }

    #[test]
    fn snapshot_events_replace_previous() {
        let keys = Keypair::generate(&mut OsRng);
        let mut store = EventStore::default();

        let first = Event::build(
            &keys,
            kinds::GROUP_MEMBERS,
            vec![vec!["d".into(), "rust".into()]],
            String::new(),
            100,
        )
        .unwrap();
        let second = Event::build(
            &keys,
            kinds::GROUP_MEMBERS,
            vec![vec!["d".into(), "rust".into()], vec!["p".into(), "a".into()]],
            String::new(),
            200,
        )
        .unwrap();

        store.insert(first.clone());
        store.insert(second.clone());
        assert!(!store.contains(&first.id));
        assert!(store.contains(&second.id));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn query_applies_limit_newest_first() {
        let keys = Keypair::generate(&mut OsRng);
        let mut store = EventStore::default();
        for i in 0..5 {
            store.insert(
                Event::build(&keys, kinds::NOTE, vec![], format!("n{i}"), i).unwrap(),
            );
        }

        let filter = Filter {
            kinds: Some(vec![kinds::NOTE]),
            limit: Some(2),
            ..Filter::default()
        };
        let results = store.query(&[filter]);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].created_at, 4);
        assert_eq!(results[1].created_at, 3);
    }

    #[test]
    fn recent_ring_is_bounded() {
        let mut ring = RecentIds::new(3);
        for id in ["aaaa1111", "bbbb2222", "cccc3333", "dddd4444"] {
            ring.push(&id.repeat(8));
        }
        assert_eq!(ring.len(), 3);
        assert!(!ring.matches_prefix("aaaa1111"));
        assert!(ring.matches_prefix("dddd4444"));
    }

    #[test]
    fn rate_counter_enforces_window() {
        let mut counters = RateCounters::default();
        let quota = RateQuota {
            count: 2,
            period_secs: 60,
        };
        let holder = [1; 32];
        let grant = [2; 32];

        assert!(counters.check_and_record(holder, grant, quota, 1_000));
        assert!(counters.check_and_record(holder, grant, quota, 1_010));
        assert!(!counters.check_and_record(holder, grant, quota, 1_020));
        // The window slides.
        assert!(counters.check_and_record(holder, grant, quota, 1_061));
    }
}
