use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::device::{Device, DeviceKind, Stamp};

/// Stable identity of a component. Never reused within an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// Handle into the node table. Ids grow monotonically, so a lower id
/// always means an earlier-created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WireId(pub usize);

/// A (component, pin index) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PinRef {
    pub component: ComponentId,
    pub pin: usize,
}

impl PinRef {
    pub fn new(component: ComponentId, pin: usize) -> Self {
        PinRef { component, pin }
    }
}

/// Canvas placement. The solver never looks at it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub rotation: f64,
}

impl Position {
    pub fn new(x: f64, y: f64) -> Self {
        Position { x, y, rotation: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Pin {
    /// Offset relative to the component's position
    pub offset: Position,
    /// `None` while the pin is floating
    pub node: Option<NodeId>,
}

/// Electrically identical set of pins
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub voltage: f64,
    pub members: Vec<PinRef>,
}

impl Node {
    pub fn new(id: NodeId) -> Self {
        Node {
            id,
            voltage: 0.0,
            members: Vec::new(),
        }
    }
}

/// Presentational link between two pins of the same node
#[derive(Debug, Clone, PartialEq)]
pub struct Wire {
    pub id: WireId,
    pub from: PinRef,
    pub to: PinRef,
    /// Signed current, positive when flowing from `from` to `to`
    pub current: f64,
}

/// A placed device instance
#[derive(Debug, Clone)]
pub struct Component {
    pub id: ComponentId,
    pub position: Position,
    pub device: Device,
    pub pins: Vec<Pin>,
}

impl Component {
    pub fn new(id: ComponentId, position: Position, device: Device) -> Self {
        let count = device.kind().pin_count();
        let pins = (0..count)
            .map(|i| Pin {
                // Pins laid out left to right one grid unit apart
                offset: Position::new(i as f64 * 40.0 - (count as f64 - 1.0) * 20.0, 0.0),
                node: None,
            })
            .collect();

        Component {
            id,
            position,
            device,
            pins,
        }
    }

    pub fn kind(&self) -> DeviceKind {
        self.device.kind()
    }

    pub fn pin_node(&self, pin: usize) -> Option<NodeId> {
        self.pins.get(pin).and_then(|p| p.node)
    }

    pub fn is_fully_wired(&self) -> bool {
        self.pins.iter().all(|p| p.node.is_some())
    }

    /// The device stamp, or an empty one while any pin is floating
    pub fn stamp(&self, dt: f64) -> Stamp {
        if self.is_fully_wired() {
            self.device.stamp(dt)
        } else {
            Stamp::empty()
        }
    }
}

/// Components keyed by id; iteration order is creation order
pub type ComponentMap = BTreeMap<ComponentId, Component>;
