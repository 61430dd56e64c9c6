use std::collections::BTreeMap;

use log::{debug, trace};

use crate::circuit::{ComponentId, ComponentMap, Node, NodeId, PinRef, Wire, WireId};
use crate::error::{EngineError, Result};

/// Owns the node table and the presentational wires.
///
/// Pins are the source of truth for which node they belong to; each node's
/// member list mirrors them. Every public mutation leaves both sides
/// consistent before returning.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    nodes: BTreeMap<NodeId, Node>,
    wires: Vec<Wire>,
    next_node: usize,
    next_wire: usize,
    dirty: bool,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.nodes.values_mut()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_voltage(&self, id: NodeId) -> f64 {
        self.nodes.get(&id).map_or(0.0, |n| n.voltage)
    }

    pub fn wires(&self) -> &[Wire] {
        &self.wires
    }

    pub fn wires_mut(&mut self) -> &mut [Wire] {
        &mut self.wires
    }

    /// True when a mutation happened since the last rebuild
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Join two pins into one electrical node.
    pub fn connect(&mut self, components: &mut ComponentMap, a: PinRef, b: PinRef) -> Result<()> {
        let node_a = pin_node(components, a)?;
        let node_b = pin_node(components, b)?;

        if a == b {
            return Ok(());
        }

        match (node_a, node_b) {
            (None, None) => {
                let id = self.create_node();
                self.attach(components, id, a);
                self.attach(components, id, b);
                debug!("Created node {} for {:?} and {:?}", id, a, b);
            }
            (Some(id), None) => self.attach(components, id, b),
            (None, Some(id)) => self.attach(components, id, a),
            (Some(x), Some(y)) if x == y => {
                trace!("Pins {:?} and {:?} already share node {}", a, b, x);
                return Ok(());
            }
            (Some(x), Some(y)) => {
                // Later-created node folds into the earlier one
                let (keep, absorb) = if x < y { (x, y) } else { (y, x) };
                self.merge(components, keep, absorb);
            }
        }

        self.push_wire(a, b);
        self.dirty = true;
        Ok(())
    }

    /// Remove a pin from its node. Floating pins are left alone.
    ///
    /// Pins that were wired through the removed one are chained together so
    /// the node's wires keep spanning all of its members.
    pub fn disconnect(&mut self, components: &mut ComponentMap, pin: PinRef) -> Result<()> {
        let Some(id) = pin_node(components, pin)? else {
            return Ok(());
        };

        if let Some(p) = components
            .get_mut(&pin.component)
            .and_then(|c| c.pins.get_mut(pin.pin))
        {
            p.node = None;
        }
        let neighbours: Vec<PinRef> = self
            .wires
            .iter()
            .filter_map(|w| {
                if w.from == pin {
                    Some(w.to)
                } else if w.to == pin {
                    Some(w.from)
                } else {
                    None
                }
            })
            .collect();
        self.wires.retain(|w| w.from != pin && w.to != pin);
        for pair in neighbours.windows(2) {
            self.push_wire(pair[0], pair[1]);
        }

        let emptied = match self.nodes.get_mut(&id) {
            Some(node) => {
                node.members.retain(|m| *m != pin);
                node.members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.nodes.remove(&id);
            debug!("Deleted empty node {}", id);
        }

        self.dirty = true;
        Ok(())
    }

    /// Disconnect every pin of a component
    pub fn detach_component(&mut self, components: &mut ComponentMap, id: ComponentId) -> Result<()> {
        let pin_count = components
            .get(&id)
            .map(|c| c.pins.len())
            .ok_or(EngineError::UnknownComponent(id))?;

        for pin in 0..pin_count {
            self.disconnect(components, PinRef::new(id, pin))?;
        }
        Ok(())
    }

    /// Re-derive node memberships from the pins, drop empty nodes and wires
    /// whose ends no longer share a node.
    pub fn rebuild(&mut self, components: &mut ComponentMap) {
        for node in self.nodes.values_mut() {
            node.members.clear();
        }

        for component in components.values_mut() {
            for (index, pin) in component.pins.iter_mut().enumerate() {
                let Some(id) = pin.node else { continue };
                match self.nodes.get_mut(&id) {
                    Some(node) => node.members.push(PinRef::new(component.id, index)),
                    None => pin.node = None,
                }
            }
        }

        self.nodes.retain(|_, node| !node.members.is_empty());

        // Pins now only point at live nodes
        let components = &*components;
        let node_of = |pin: PinRef| pin_node(components, pin).ok().flatten();
        self.wires.retain(|w| {
            let from = node_of(w.from);
            from.is_some() && from == node_of(w.to)
        });

        self.dirty = false;
        debug!(
            "Topology rebuilt: {} nodes, {} wires",
            self.nodes.len(),
            self.wires.len()
        );
    }

    /// Zero every node voltage and wire current
    pub fn clear_values(&mut self) {
        for node in self.nodes.values_mut() {
            node.voltage = 0.0;
        }
        for wire in &mut self.wires {
            wire.current = 0.0;
        }
    }

    fn create_node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        self.nodes.insert(id, Node::new(id));
        id
    }

    fn push_wire(&mut self, from: PinRef, to: PinRef) {
        let id = WireId(self.next_wire);
        self.next_wire += 1;
        self.wires.push(Wire {
            id,
            from,
            to,
            current: 0.0,
        });
    }

    fn attach(&mut self, components: &mut ComponentMap, id: NodeId, pin: PinRef) {
        if let Some(p) = components
            .get_mut(&pin.component)
            .and_then(|c| c.pins.get_mut(pin.pin))
        {
            p.node = Some(id);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.members.push(pin);
        }
    }

    fn merge(&mut self, components: &mut ComponentMap, keep: NodeId, absorb: NodeId) {
        let Some(absorbed) = self.nodes.remove(&absorb) else {
            return;
        };

        for member in &absorbed.members {
            if let Some(p) = components
                .get_mut(&member.component)
                .and_then(|c| c.pins.get_mut(member.pin))
            {
                p.node = Some(keep);
            }
        }
        if let Some(node) = self.nodes.get_mut(&keep) {
            node.members.extend(absorbed.members);
        }
        debug!("Merged node {} into {}", absorb, keep);
    }
}

/// Current node of a pin, validating that the pin exists
fn pin_node(components: &ComponentMap, pin: PinRef) -> Result<Option<NodeId>> {
    let component = components
        .get(&pin.component)
        .ok_or(EngineError::UnknownComponent(pin.component))?;
    component
        .pins
        .get(pin.pin)
        .map(|p| p.node)
        .ok_or(EngineError::UnknownPin(pin))
}
