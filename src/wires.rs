use std::collections::HashMap;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::{depth_first_search, DfsEvent};

use crate::circuit::{ComponentMap, PinRef};
use crate::topology::Topology;

/// Current each pin pushes into its node, from the owning device's
/// last state update. Floating devices contribute nothing.
pub fn pin_injections(components: &ComponentMap) -> HashMap<PinRef, f64> {
    let mut injections = HashMap::new();
    for component in components.values() {
        if !component.is_fully_wired() {
            continue;
        }
        let currents = component.device.terminal_currents();
        for (pin, current) in currents.iter().enumerate().take(component.pins.len()) {
            injections.insert(PinRef::new(component.id, pin), *current);
        }
    }
    injections
}

/// Attribute a signed current to every wire.
///
/// Within a node the wires form a graph over its pins. Each connected piece
/// is walked depth-first from its first wire's `from` pin; a tree wire
/// carries the net injection of the subtree hanging below it. Wires closing
/// a loop carry nothing, since the split around a loop of ideal wires is
/// undetermined.
pub fn derive_wire_currents(topology: &mut Topology, components: &ComponentMap) {
    let injections = pin_injections(components);
    let wires = topology.wires();

    // Edge weight is the wire's position in the topology's list
    let mut graph: UnGraph<PinRef, usize> = UnGraph::default();
    let mut vertex: HashMap<PinRef, NodeIndex> = HashMap::new();
    for (index, wire) in wires.iter().enumerate() {
        let from = *vertex
            .entry(wire.from)
            .or_insert_with(|| graph.add_node(wire.from));
        let to = *vertex
            .entry(wire.to)
            .or_insert_with(|| graph.add_node(wire.to));
        graph.add_edge(from, to, index);
    }

    let mut tree = Vec::new();
    let roots = wires.iter().filter_map(|w| vertex.get(&w.from).copied());
    depth_first_search(&graph, roots, |event| {
        if let DfsEvent::TreeEdge(parent, child) = event {
            tree.push((parent, child));
        }
    });

    // A child's tree edges are all discovered after its own, so walking
    // backwards finishes every subtree before its parent edge
    let mut currents = vec![0.0; wires.len()];
    let mut subtree: HashMap<NodeIndex, f64> = HashMap::new();
    for &(parent, child) in tree.iter().rev() {
        let pin = graph[child];
        let total = injections.get(&pin).copied().unwrap_or(0.0)
            + subtree.get(&child).copied().unwrap_or(0.0);
        if let Some(edge) = graph.find_edge(parent, child) {
            let index = graph[edge];
            currents[index] = if wires[index].from == pin { total } else { -total };
        }
        *subtree.entry(parent).or_insert(0.0) += total;
    }

    for (wire, current) in topology.wires_mut().iter_mut().zip(currents) {
        wire.current = current;
    }
}
