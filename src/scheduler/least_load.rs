//! `least_load` scheduler: minimize count, then maximize residual
//! capacity, then lexicographic hostname as the final tie-break.

use std::cmp::Reverse;

use crate::cluster::NodeInfo;
use crate::error::{Error, Result};
use crate::traits::Scheduler;

/// Pure, deterministic placement by ascending load (`spec.md` §4.3,
/// invariant 6).
#[derive(Debug, Default, Clone, Copy)]
pub struct LeastLoad;

impl LeastLoad {
    fn best<'a>(candidates: impl Iterator<Item = &'a NodeInfo>) -> Option<&'a NodeInfo> {
        candidates
            .filter(|n| n.has_capacity())
            .min_by_key(|n| (n.count, Reverse(n.residual_capacity()), n.hostname.clone()))
    }
}

impl Scheduler for LeastLoad {
    fn name(&self) -> &str {
        "least_load"
    }

    fn select(&self, snapshot: &[NodeInfo], _host: &str) -> Result<NodeInfo> {
        Self::best(snapshot.iter())
            .cloned()
            .ok_or(Error::CapacityExhausted {
                candidates: snapshot.len(),
            })
    }

    fn batch_select(&self, snapshot: &[NodeInfo], hosts: &[String]) -> Vec<(String, NodeInfo)> {
        let mut residual: Vec<NodeInfo> = snapshot.to_vec();
        let mut out = Vec::with_capacity(hosts.len());
        for host in hosts {
            let Some(chosen) = Self::best(residual.iter()).cloned() else {
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

    fn node(id: &str, hostname: &str, capacity: u32, count: u32) -> NodeInfo {
        NodeInfo {
            node_id: id.into(),
            hostname: hostname.into(),
            capacity,
            count,
            last_heartbeat: 0,
        }
    }

    #[test]
    fn prefers_lowest_count() {
        let snapshot = vec![node("a", "a", 4, 3), node("b", "b", 4, 1)];
        assert_eq!(LeastLoad.select(&snapshot, "r1").unwrap().node_id, "b");
    }

    #[test]
    fn tie_breaks_on_residual_capacity_then_hostname() {
        let snapshot = vec![
            node("a", "zzz", 4, 0),
            node("b", "aaa", 8, 0),
            node("c", "bbb", 8, 0),
        ];
        // all count=0: "a" has residual 4, "b"/"c" have residual 8 - pick
        // max residual first, then lexicographic hostname among ties.
        assert_eq!(LeastLoad.select(&snapshot, "r1").unwrap().node_id, "b");
    }

    #[test]
    fn is_deterministic_over_many_trials() {
        let snapshot = vec![node("a", "a", 4, 2), node("b", "b", 4, 2)];
        for _ in 0..1000 {
            assert_eq!(LeastLoad.select(&snapshot, "r1").unwrap().node_id, "a");
        }
    }

    #[test]
    fn batch_select_rebalances_across_hosts() {
        let snapshot = vec![node("a", "a", 2, 0), node("b", "b", 2, 0)];
        let hosts: Vec<String> = vec!["h1".into(), "h2".into(), "h3".into(), "h4".into()];
        let placed = LeastLoad.batch_select(&snapshot, &hosts);
        let on_a = placed.iter().filter(|(_, n)| n.node_id == "a").count();
        let on_b = placed.iter().filter(|(_, n)| n.node_id == "b").count();
        assert_eq!(on_a, 2);
        assert_eq!(on_b, 2);
    }
}
