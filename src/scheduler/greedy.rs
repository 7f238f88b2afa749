//! `greedy` scheduler: first available node in snapshot order.

use crate::cluster::NodeInfo;
use crate::error::{Error, Result};
use crate::traits::Scheduler;

/// First node in snapshot order with `count < capacity`. Deterministic
/// given a stable snapshot (`spec.md` §4.3, invariant 6).
#[derive(Debug, Default, Clone, Copy)]
pub struct Greedy;

impl Scheduler for Greedy {
    fn name(&self) -> &str {
        "greedy"
    }

    fn select(&self, snapshot: &[NodeInfo], _host: &str) -> Result<NodeInfo> {
        snapshot
            .iter()
            .find(|n| n.has_capacity())
            .cloned()
            .ok_or(Error::CapacityExhausted {
                candidates: snapshot.len(),
            })
    }

    fn batch_select(&self, snapshot: &[NodeInfo], hosts: &[String]) -> Vec<(String, NodeInfo)> {
        let mut residual: Vec<NodeInfo> = snapshot.to_vec();
        let mut out = Vec::with_capacity(hosts.len());
        for host in hosts {
            if let Some(idx) = residual.iter().position(NodeInfo::has_capacity) {
                let placed = residual[idx].clone();
                residual[idx].count += 1;
                out.push((host.clone(), placed));
            }
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
    fn picks_first_with_capacity() {
        let snapshot = vec![node("a", 1, 1), node("b", 2, 0)];
        let picked = Greedy.select(&snapshot, "r1").unwrap();
        assert_eq!(picked.node_id, "b");
    }

    #[test]
    fn is_deterministic_over_many_trials() {
        let snapshot = vec![node("a", 2, 1), node("b", 2, 0)];
        for _ in 0..1000 {
            assert_eq!(Greedy.select(&snapshot, "r1").unwrap().node_id, "a");
        }
    }

    #[test]
    fn capacity_exhausted_when_all_full() {
        let snapshot = vec![node("a", 1, 1), node("b", 1, 1)];
        let err = Greedy.select(&snapshot, "r1").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::CapacityExhausted);
    }

    #[test]
    fn batch_select_fills_against_residual_view() {
        let snapshot = vec![node("a", 1, 0), node("b", 1, 0)];
        let hosts: Vec<String> = vec!["h1".into(), "h2".into(), "h3".into()];
        let placed = Greedy.batch_select(&snapshot, &hosts);
        assert_eq!(placed.len(), 2);
        assert_eq!(placed[0].1.node_id, "a");
        assert_eq!(placed[1].1.node_id, "b");
    }
}
