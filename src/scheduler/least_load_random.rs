//! `least_load_random` scheduler: filter to minimum count, then maximum
//! residual capacity, then uniform-random among the remainder.

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::cluster::NodeInfo;
use crate::error::{Error, Result};
use crate::traits::Scheduler;

/// Non-deterministic placement; the candidate pool narrowing is pure, the
/// final pick is not (`spec.md` §4.3).
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoadRandom;

impl LeastLoadRandom {
    /// Narrows `snapshot` to the nodes tied for minimum count and, among
    /// those, tied for maximum residual capacity.
    fn candidate_pool(snapshot: &[NodeInfo]) -> Vec<NodeInfo> {
        let available: Vec<&NodeInfo> = snapshot.iter().filter(|n| n.has_capacity()).collect();
        let Some(min_count) = available.iter().map(|n| n.count).min() else {
            return Vec::new();
        };
        let min_loaded: Vec<&NodeInfo> = available
            .into_iter()
            .filter(|n| n.count == min_count)
            .collect();
        let Some(max_residual) = min_loaded.iter().map(|n| n.residual_capacity()).max() else {
            return Vec::new();
        };
        min_loaded
            .into_iter()
            .filter(|n| n.residual_capacity() == max_residual)
            .cloned()
            .collect()
    }
}

impl Scheduler for LeastLoadRandom {
    fn name(&self) -> &str {
        "least_load_random"
    }

    fn select(&self, snapshot: &[NodeInfo], _host: &str) -> Result<NodeInfo> {
        Self::candidate_pool(snapshot)
            .choose(&mut thread_rng())
            .cloned()
            .ok_or(Error::CapacityExhausted {
                candidates: snapshot.len(),
            })
    }

    fn batch_select(&self, snapshot: &[NodeInfo], hosts: &[String]) -> Vec<(String, NodeInfo)> {
        let mut residual: Vec<NodeInfo> = snapshot.to_vec();
        let mut out = Vec::with_capacity(hosts.len());
        let mut rng = thread_rng();
        for host in hosts {
            let pool = Self::candidate_pool(&residual);
            let Some(chosen) = pool.choose(&mut rng).cloned() else {
                continue;
            };
            if let Some(slot) = residual.iter_mut().find(|n| n.node_id == chosen.node_id) {
                slot.count += 1;
            }
            out.push((host.clone(), chosen));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, capacity: u32, count: u32) -> NodeInfo {
        NodeInfo {
            node_id: id.into(),
            hostname: id.into(),
            capacity,
            count,
            last_heartbeat: 0,
        }
    }

    #[test]
    fn only_picks_from_the_narrowed_pool() {
        let snapshot = vec![node("a", 4, 0), node("b", 4, 2), node("c", 8, 0)];
        for _ in 0..200 {
            // "a" and "c" tie on count=0; "c" has more residual capacity
            // (8 vs 4) so the pool narrows to just "c".
            assert_eq!(LeastLoadRandom.select(&snapshot, "r1").unwrap().node_id, "c");
        }
    }

    #[test]
    fn exhausted_when_no_node_has_capacity() {
        let snapshot = vec![node("a", 1, 1)];
        let err = LeastLoadRandom.select(&snapshot, "r1").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CapacityExhausted);
    }
}
