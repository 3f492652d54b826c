//! Control-side graph model: validation, ids, slots and compilation.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use super::delay::DelayAlign;
use super::latency::{analyze_latency, LatencyPlan};
use super::runtime::{ChannelMap, CompiledGraph, Feed, Step};
use super::topology::topological_order;
use super::{Connection, ConnectionId, ConnectionKind, NodeId, NodeInfo, PortIndex};
use crate::error::{Error, Result, TopologyError};
use crate::node::{NodeKind, Processor};
use crate::param::db_to_linear;

/// Authoritative description of the graph, edited off the audio thread.
///
/// Every successful edit leaves the graph acyclic (ignoring edges out of
/// feedback-delay nodes). Rejected edits leave it untouched.
pub struct GraphEditor {
    nodes: BTreeMap<NodeId, NodeInfo>,
    connections: BTreeMap<ConnectionId, Connection>,
    next_node: u32,
    next_connection: u32,
    free_slots: Vec<usize>,
    next_slot: usize,
    max_nodes: usize,
    max_frames: usize,
    master: Option<NodeId>,
    generation: u64,
}

impl GraphEditor {
    pub fn new(max_nodes: usize, max_frames: usize) -> Self {
        Self {
            nodes: BTreeMap::new(),
            connections: BTreeMap::new(),
            next_node: 1,
            next_connection: 1,
            free_slots: Vec::new(),
            next_slot: 0,
            max_nodes,
            max_frames,
            master: None,
            generation: 0,
        }
    }

    /// Register a prepared processor and reserve a runtime slot for it.
    ///
    /// The first [`NodeKind::Master`] node becomes the graph output; a
    /// second one is rejected.
    pub fn add_node(&mut self, processor: &dyn Processor) -> Result<NodeInfo> {
        if processor.kind() == NodeKind::Master && self.master.is_some() {
            return Err(Error::InvalidArgument(
                "graph already has a master node".to_string(),
            ));
        }
        let slot = match self.free_slots.pop() {
            Some(slot) => slot,
            None if self.next_slot < self.max_nodes => {
                self.next_slot += 1;
                self.next_slot - 1
            }
            None => return Err(Error::CapacityExceeded("node slots")),
        };

        let id = NodeId(self.next_node);
        self.next_node += 1;
        let info = NodeInfo::describe(id, slot, processor);
        if info.kind == NodeKind::Master {
            self.master = Some(id);
        }
        debug!(node = %id, slot, name = %info.name, "node added");
        self.nodes.insert(id, info.clone());
        Ok(info)
    }

    /// Remove a node and every connection touching it.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(NodeInfo, Vec<Connection>)> {
        if self.master == Some(id) {
            return Err(TopologyError::MasterRemoval.into());
        }
        let info = self.nodes.remove(&id).ok_or(Error::UnknownNode(id))?;
        let attached: Vec<ConnectionId> = self
            .connections
            .values()
            .filter(|c| c.source == id || c.dest == id)
            .map(|c| c.id)
            .collect();
        let removed = attached
            .iter()
            .filter_map(|cid| self.connections.remove(cid))
            .collect::<Vec<_>>();
        self.free_slots.push(info.slot);
        debug!(node = %id, connections = removed.len(), "node removed");
        Ok((info, removed))
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeInfo> {
        self.nodes.get(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &NodeInfo> {
        self.nodes.values()
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn master(&self) -> Option<NodeId> {
        self.master
    }

    pub fn connection(&self, id: ConnectionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    pub fn connections(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn connect(
        &mut self,
        source: NodeId,
        source_port: PortIndex,
        dest: NodeId,
        dest_port: PortIndex,
        kind: ConnectionKind,
    ) -> Result<ConnectionId> {
        if source == dest {
            return Err(TopologyError::SelfConnection(source).into());
        }
        let src = self.nodes.get(&source).ok_or(Error::UnknownNode(source))?;
        let dst = self.nodes.get(&dest).ok_or(Error::UnknownNode(dest))?;

        let (source_port, dest_port) = match kind {
            ConnectionKind::Midi => {
                if !src.produces_midi || !dst.accepts_midi {
                    return Err(TopologyError::PortTypeMismatch {
                        from: source,
                        to: dest,
                    }
                    .into());
                }
                (0, 0)
            }
            ConnectionKind::Audio | ConnectionKind::Sidechain => {
                let out = src.outputs.get(usize::from(source_port)).ok_or(
                    TopologyError::NoSuchPort {
                        node: source,
                        port: source_port,
                        direction: "output",
                    },
                )?;
                let input = if kind == ConnectionKind::Audio {
                    dst.inputs.get(usize::from(dest_port)).ok_or(
                        TopologyError::NoSuchPort {
                            node: dest,
                            port: dest_port,
                            direction: "input",
                        },
                    )?
                } else {
                    dst.sidechain
                        .as_ref()
                        .ok_or(TopologyError::SidechainUnsupported(dest))?
                };
                if !input.accepts(out.channels) {
                    return Err(TopologyError::ChannelMismatch {
                        source_channels: out.channels,
                        dest_channels: input.channels,
                    }
                    .into());
                }
                let dest_port = if kind == ConnectionKind::Sidechain {
                    0
                } else {
                    dest_port
                };
                (source_port, dest_port)
            }
        };

        let duplicate = self.connections.values().any(|c| {
            c.kind == kind
                && c.source == source
                && c.source_port == source_port
                && c.dest == dest
                && c.dest_port == dest_port
        });
        if duplicate {
            return Err(TopologyError::DuplicateConnection.into());
        }

        let mut edges = self.edges();
        if !self.is_feedback(source) {
            edges.push((source, dest));
        }
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        if topological_order(&ids, &edges).is_none() {
            return Err(TopologyError::Cycle {
                from: source,
                to: dest,
            }
            .into());
        }

        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.connections.insert(
            id,
            Connection {
                id,
                kind,
                source,
                source_port,
                dest,
                dest_port,
                gain_db: 0.0,
            },
        );
        debug!(%id, from = %source, to = %dest, ?kind, "connected");
        Ok(id)
    }

    pub fn disconnect(&mut self, id: ConnectionId) -> Result<Connection> {
        let removed = self
            .connections
            .remove(&id)
            .ok_or(Error::UnknownConnection(id))?;
        debug!(%id, "disconnected");
        Ok(removed)
    }

    pub fn set_connection_gain(&mut self, id: ConnectionId, gain_db: f32) -> Result<()> {
        if !gain_db.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "connection gain must be finite, got {gain_db}"
            )));
        }
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(Error::UnknownConnection(id))?;
        connection.gain_db = gain_db;
        Ok(())
    }

    fn is_feedback(&self, id: NodeId) -> bool {
        self.nodes.get(&id).is_some_and(|n| n.feedback)
    }

    /// Ordering edges: every connection except those leaving feedback nodes.
    fn edges(&self) -> Vec<(NodeId, NodeId)> {
        self.connections
            .values()
            .filter(|c| !self.is_feedback(c.source))
            .map(|c| (c.source, c.dest))
            .collect()
    }

    /// Current execution order.
    pub fn order(&self) -> Vec<NodeId> {
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        // Edits keep the graph acyclic, so the fallback never triggers.
        topological_order(&ids, &self.edges()).unwrap_or(ids)
    }

    pub fn latency(&self) -> LatencyPlan {
        self.latency_for(&self.order())
    }

    fn latency_for(&self, order: &[NodeId]) -> LatencyPlan {
        let latency: BTreeMap<NodeId, usize> = self
            .nodes
            .values()
            .map(|n| (n.id, n.latency))
            .collect();
        let feedback: BTreeSet<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.feedback)
            .map(|n| n.id)
            .collect();
        let connections: Vec<Connection> = self.connections.values().copied().collect();
        analyze_latency(
            order,
            &latency,
            &connections,
            &feedback,
            self.master.unwrap_or(NodeId(0)),
        )
    }

    /// Build the execution plan for the current topology.
    pub fn compile(&mut self) -> Box<CompiledGraph> {
        self.generation += 1;
        let order = self.order();
        let plan = self.latency_for(&order);

        let mut steps = Vec::with_capacity(order.len());
        for &id in &order {
            let Some(info) = self.nodes.get(&id) else {
                continue;
            };
            let feeds = self
                .connections
                .values()
                .filter(|c| c.dest == id)
                .filter_map(|c| self.feed_for(c, info, plan.delay_for(c.id)))
                .collect();
            steps.push(Step {
                node: id,
                slot: info.slot,
                feeds,
            });
        }

        let lookup = self.nodes.values().map(|n| (n.id, n.slot)).collect();
        let master_slot = self
            .master
            .and_then(|id| self.nodes.get(&id))
            .map(|n| n.slot);

        debug!(
            generation = self.generation,
            nodes = steps.len(),
            latency = plan.total,
            "graph compiled"
        );
        Box::new(CompiledGraph {
            generation: self.generation,
            steps,
            lookup,
            master_slot,
            total_latency: plan.total,
        })
    }

    fn feed_for(&self, c: &Connection, dest: &NodeInfo, delay: usize) -> Option<Feed> {
        let source = self.nodes.get(&c.source)?;
        let source_slot = source.slot;
        if c.kind == ConnectionKind::Midi {
            return Some(Feed {
                kind: c.kind,
                source_slot,
                source_port: 0,
                dest_port: 0,
                gain: 1.0,
                map: ChannelMap::Direct,
                align: None,
            });
        }

        let source_channels = source.outputs.get(usize::from(c.source_port))?.channels;
        let dest_channels = if c.kind == ConnectionKind::Audio {
            dest.inputs.get(usize::from(c.dest_port))?.channels
        } else {
            dest.sidechain.as_ref()?.channels
        };
        let map = if source_channels == dest_channels {
            ChannelMap::Direct
        } else if source_channels == 1 {
            ChannelMap::Widen
        } else if dest_channels == 1 {
            ChannelMap::MixDown
        } else {
            ChannelMap::Direct
        };

        Some(Feed {
            kind: c.kind,
            source_slot,
            source_port: usize::from(c.source_port),
            dest_port: usize::from(c.dest_port),
            gain: db_to_linear(c.gain_db),
            map,
            align: (delay > 0).then(|| DelayAlign::new(source_channels, delay, self.max_frames)),
        })
    }
}
