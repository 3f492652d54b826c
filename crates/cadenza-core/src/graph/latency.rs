//! Plug-in delay compensation.
//!
//! Arrival-time algorithm: walk the nodes in topological order, compute the
//! worst-case latency arriving at each node's inputs, then delay every
//! shorter path so all signals meet aligned at the merge point.

use std::collections::{BTreeMap, BTreeSet};

use super::{Connection, ConnectionId, ConnectionKind, NodeId};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LatencyPlan {
    /// Latency already accumulated at each node's inputs.
    pub arrival: BTreeMap<NodeId, usize>,
    /// Delay to insert on each audio or sidechain connection.
    pub compensation: BTreeMap<ConnectionId, usize>,
    /// Latency of the whole graph measured at `output`.
    pub total: usize,
}

impl LatencyPlan {
    pub fn delay_for(&self, connection: ConnectionId) -> usize {
        self.compensation.get(&connection).copied().unwrap_or(0)
    }
}

/// Compute compensation delays.
///
/// `order` must be a topological order of the nodes. Connections leaving a
/// node in `feedback` close a loop and are neither followed nor compensated.
/// MIDI connections carry no audio latency.
pub fn analyze_latency(
    order: &[NodeId],
    latency: &BTreeMap<NodeId, usize>,
    connections: &[Connection],
    feedback: &BTreeSet<NodeId>,
    output: NodeId,
) -> LatencyPlan {
    let own = |id: NodeId| latency.get(&id).copied().unwrap_or(0);

    if order.iter().all(|&id| own(id) == 0) {
        return LatencyPlan {
            arrival: order.iter().map(|&id| (id, 0)).collect(),
            ..Default::default()
        };
    }

    let compensated = |c: &&Connection| {
        c.kind != ConnectionKind::Midi && !feedback.contains(&c.source)
    };

    let mut arrival: BTreeMap<NodeId, usize> = BTreeMap::new();
    let mut compensation = BTreeMap::new();

    for &id in order {
        let incoming: Vec<&Connection> = connections
            .iter()
            .filter(|c| c.dest == id)
            .filter(compensated)
            .collect();

        let source_arrival =
            |c: &Connection| arrival.get(&c.source).copied().unwrap_or(0) + own(c.source);

        let worst = incoming.iter().map(|&c| source_arrival(c)).max().unwrap_or(0);

        for &c in &incoming {
            let delay = worst - source_arrival(c);
            if delay > 0 {
                compensation.insert(c.id, delay);
            }
        }
        arrival.insert(id, worst);
    }

    let total = arrival.get(&output).copied().unwrap_or(0) + own(output);

    LatencyPlan {
        arrival,
        compensation,
        total,
    }
}
