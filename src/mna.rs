use std::collections::{BTreeSet, HashMap};

use log::trace;
use nalgebra::{DMatrix, DVector};
use petgraph::unionfind::UnionFind;

use crate::circuit::{Component, ComponentMap, NodeId};
use crate::device::DeviceKind;
use crate::topology::Topology;

/// Row assignment for the nodal system: every node except the reference
/// nodes gets one row/column.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeLayout {
    /// One reference node per conducting island, each held at 0 V
    pub references: BTreeSet<NodeId>,
    /// Mapping from node IDs to matrix row/column indices
    pub node_map: HashMap<NodeId, usize>,
    /// Non-reference nodes in row order
    pub rows: Vec<NodeId>,
}

impl NodeLayout {
    /// Nodes joined through fully wired devices form an island. Each island
    /// is referenced to the negative terminal of its lowest-id battery, or
    /// to its lowest-id node when it has no battery.
    pub fn new(topology: &Topology, components: &ComponentMap) -> Self {
        let ids: Vec<NodeId> = topology.nodes().map(|n| n.id).collect();
        let position: HashMap<NodeId, usize> =
            ids.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let index_of = |node: Option<NodeId>| node.and_then(|n| position.get(&n).copied());

        let mut islands = UnionFind::new(ids.len());
        for component in components.values().filter(|c| c.is_fully_wired()) {
            let mut pins = component.pins.iter().filter_map(|p| index_of(p.node));
            if let Some(first) = pins.next() {
                for other in pins {
                    islands.union(first, other);
                }
            }
        }

        let mut reference: HashMap<usize, NodeId> = HashMap::new();
        let batteries = components
            .values()
            .filter(|c| c.kind() == DeviceKind::Battery && c.is_fully_wired());
        for battery in batteries {
            if let Some(i) = index_of(battery.pin_node(1)) {
                reference.entry(islands.find(i)).or_insert(ids[i]);
            }
        }
        for (i, id) in ids.iter().enumerate() {
            reference.entry(islands.find(i)).or_insert(*id);
        }
        let references: BTreeSet<NodeId> = reference.into_values().collect();

        let rows: Vec<NodeId> = ids
            .iter()
            .copied()
            .filter(|id| !references.contains(id))
            .collect();
        let node_map = rows.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        NodeLayout {
            references,
            node_map,
            rows,
        }
    }

    pub fn is_reference(&self, node: NodeId) -> bool {
        self.references.contains(&node)
    }

    pub fn size(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, node: NodeId) -> Option<usize> {
        self.node_map.get(&node).copied()
    }

    /// Voltage of a node in a solution vector; reference and unknown nodes read 0
    pub fn voltage(&self, solution: &DVector<f64>, node: NodeId) -> f64 {
        self.row(node).map_or(0.0, |i| solution[i])
    }

    /// Write a solution back into the node table
    pub fn scatter(&self, solution: &DVector<f64>, topology: &mut Topology) {
        for node in topology.nodes_mut() {
            node.voltage = self.voltage(solution, node.id);
        }
    }
}

/// Nodal system G·v = i
#[derive(Debug, Clone, PartialEq)]
pub struct MnaSystem {
    /// Conductance matrix G
    pub matrix: DMatrix<f64>,
    /// Injected current vector i
    pub rhs: DVector<f64>,
    pub size: usize,
}

impl MnaSystem {
    pub fn new(size: usize) -> Self {
        MnaSystem {
            matrix: DMatrix::zeros(size, size),
            rhs: DVector::zeros(size),
            size,
        }
    }

    /// Assemble the system from every component's stamp
    pub fn assemble(layout: &NodeLayout, components: &ComponentMap, dt: f64) -> Self {
        let mut system = MnaSystem::new(layout.size());
        for component in components.values() {
            system.add_component(layout, component, dt);
        }
        system
    }

    /// Scatter one component's stamp into the global system.
    ///
    /// Entries touching a reference node are dropped, the rest accumulate.
    pub fn add_component(&mut self, layout: &NodeLayout, component: &Component, dt: f64) {
        let stamp = component.stamp(dt);
        if stamp.is_empty() {
            trace!("Skipping {} ({}): not fully wired", component.id, component.kind());
            return;
        }

        let rows: Vec<Option<usize>> = stamp
            .pins
            .iter()
            .map(|&pin| component.pin_node(pin).and_then(|node| layout.row(node)))
            .collect();

        for (local_i, row_i) in rows.iter().enumerate() {
            let Some(i) = *row_i else { continue };
            self.rhs[i] += stamp.current[local_i];
            for (local_j, row_j) in rows.iter().enumerate() {
                if let Some(j) = *row_j {
                    self.matrix[(i, j)] += stamp.conductance[(local_i, local_j)];
                }
            }
        }
    }
}
