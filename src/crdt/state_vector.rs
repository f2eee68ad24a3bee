//! Range-based state vector for delta synchronization between peers.
//!
//! Adapted from the teacher's `crdt::state_vector::StateVector`, which
//! already implements this exact algorithm (sorted, merged, non-adjacent
//! ranges per peer). [`StateVector::from_ops`] is new.

use crate::types::{CounterRange, OpId, PeerRange};
use std::collections::HashMap;

/// Per-peer set of applied counters, encoded as sorted, pairwise-disjoint,
/// non-adjacent closed ranges.
#[derive(Debug, Clone, Default)]
pub struct StateVector {
    ranges: HashMap<String, Vec<CounterRange>>,
}

impl StateVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a state vector from a map of peer -> ranges (wire format).
    pub fn from_ranges(ranges: HashMap<String, Vec<CounterRange>>) -> Self {
        Self { ranges }
    }

    /// Rebuild a state vector from scratch by inserting every applied op id.
    pub fn from_ops<'a>(ids: impl IntoIterator<Item = &'a OpId>) -> Self {
        let mut sv = Self::new();
        for id in ids {
            sv.insert(&id.peer_id, id.counter);
        }
        sv
    }

    pub fn contains(&self, id: &OpId) -> bool {
        self.ranges
            .get(&id.peer_id)
            .map(|ranges| ranges.iter().any(|r| r.contains(id.counter)))
            .unwrap_or(false)
    }

    /// Insert a single applied counter for `peer`, merging adjacent ranges.
    pub fn insert(&mut self, peer: &str, counter: u64) {
        let ranges = self.ranges.entry(peer.to_string()).or_default();

        let mut extended = false;
        for range in ranges.iter_mut() {
            if range.end + 1 == counter {
                range.end = counter;
                extended = true;
                break;
            } else if counter + 1 == range.start {
                range.start = counter;
                extended = true;
                break;
            } else if range.contains(counter) {
                extended = true;
                break;
            }
        }

        if !extended {
            ranges.push(CounterRange {
                start: counter,
                end: counter,
            });
        }

        Self::normalize(ranges);
    }

    fn normalize(ranges: &mut Vec<CounterRange>) {
        ranges.sort_by_key(|r| r.start);
        let mut i = 0;
        while i + 1 < ranges.len() {
            if ranges[i].end + 1 >= ranges[i + 1].start {
                ranges[i].end = ranges[i].end.max(ranges[i + 1].end);
                ranges.remove(i + 1);
            } else {
                i += 1;
            }
        }
    }

    /// The ranges for all peers (wire format).
    pub fn ranges(&self) -> &HashMap<String, Vec<CounterRange>> {
        &self.ranges
    }

    /// Ranges `self` has that `other` lacks, ordered by `(peer_id, start)`.
    pub fn diff(&self, other: &Self) -> Vec<PeerRange> {
        let mut result = Vec::new();

        let mut peers: Vec<&String> = self.ranges.keys().collect();
        peers.sort();

        for peer_id in peers {
            let our_ranges = &self.ranges[peer_id];
            let empty = Vec::new();
            let their_ranges = other.ranges.get(peer_id).unwrap_or(&empty);

            for our_range in our_ranges {
                let mut remaining = vec![our_range.clone()];

                for their_range in their_ranges {
                    let mut next_remaining = Vec::new();
                    for range in remaining {
                        if range.end < their_range.start || range.start > their_range.end {
                            next_remaining.push(range);
                            continue;
                        }
                        if range.start < their_range.start {
                            next_remaining.push(CounterRange {
                                start: range.start,
                                end: their_range.start - 1,
                            });
                        }
                        if range.end > their_range.end {
                            next_remaining.push(CounterRange {
                                start: their_range.end + 1,
                                end: range.end,
                            });
                        }
                    }
                    remaining = next_remaining;
                }

                for range in remaining {
                    result.push(PeerRange {
                        peer_id: peer_id.clone(),
                        start: range.start,
                        end: range.end,
                    });
                }
            }
        }

        result
    }
}
