use std::borrow::Cow;
use std::collections::BTreeMap;

use log::{debug, info, trace};
use serde::{Deserialize, Serialize};

use crate::circuit::{Component, ComponentId, ComponentMap, NodeId, PinRef, Position, WireId};
use crate::device::{Device, DeviceDefaults, DeviceKind, PropertyValue, Visual};
use crate::error::{EngineError, Result};
use crate::mna::{MnaSystem, NodeLayout};
use crate::solver::{LinearSolver, SolverConfig, SolverStats};
use crate::topology::Topology;
use crate::wires::derive_wire_currents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClockState {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    pub solver_config: SolverConfig,
    /// Longest wall-clock step a single tick may take, in seconds
    pub max_step: f64,
    /// Initial simulation speed factor
    pub speed: f64,
    pub devices: DeviceDefaults,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        SimulatorConfig {
            solver_config: SolverConfig::default(),
            max_step: 0.05,
            speed: 1.0,
            devices: DeviceDefaults::default(),
        }
    }
}

/// Snapshot of the engine handed to the rendering layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub time: f64,
    pub running: bool,
    pub speed: f64,
    /// Wiring changed since the last completed tick. Voltages and currents
    /// still describe the old wiring until the next tick solves the new one.
    pub pending_rebuild: bool,
    pub components: Vec<ComponentState>,
    pub nodes: Vec<NodeState>,
    pub wires: Vec<WireState>,
}

impl SimulationState {
    pub fn component(&self, id: ComponentId) -> Option<&ComponentState> {
        self.components.iter().find(|c| c.id == id)
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeState> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentState {
    pub id: ComponentId,
    pub kind: DeviceKind,
    pub position: Position,
    pub pins: Vec<Option<NodeId>>,
    pub properties: BTreeMap<String, PropertyValue>,
    pub current: f64,
    pub voltage_drop: f64,
    pub visual: Visual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeState {
    pub id: NodeId,
    pub voltage: f64,
    pub members: Vec<PinRef>,
    /// Reference node of its island, held at 0 V
    pub ground: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireState {
    pub id: WireId,
    pub from: PinRef,
    pub to: PinRef,
    pub current: f64,
}

/// Main simulator engine.
///
/// Owns every component and the node graph. The UI layer mutates it only
/// through the methods below and reads it back through [`Simulator::get_state`].
pub struct Simulator {
    config: SimulatorConfig,
    solver: LinearSolver,
    components: ComponentMap,
    topology: Topology,
    layout: NodeLayout,
    next_component: u64,
    clock: ClockState,
    speed: f64,
    elapsed: f64,
    ticks: u64,
    last_stats: SolverStats,
}

impl Simulator {
    /// Create a new simulator with default configuration
    pub fn new() -> Self {
        Self::with_config(SimulatorConfig::default())
    }

    /// Create a new simulator with custom configuration
    pub fn with_config(config: SimulatorConfig) -> Self {
        Simulator {
            solver: LinearSolver::with_config(config.solver_config.clone()),
            speed: config.speed,
            config,
            components: ComponentMap::new(),
            topology: Topology::new(),
            layout: NodeLayout::default(),
            next_component: 0,
            clock: ClockState::Stopped,
            elapsed: 0.0,
            ticks: 0,
            last_stats: SolverStats::default(),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    /// Place a new device. Properties are validated first; on any error
    /// nothing is added.
    pub fn add_component(
        &mut self,
        kind: DeviceKind,
        position: Position,
        properties: &[(&str, PropertyValue)],
    ) -> Result<ComponentId> {
        let mut device = Device::new(kind, &self.config.devices);
        for (key, value) in properties {
            device.set_property(key, *value)?;
        }

        let id = ComponentId(self.next_component);
        self.next_component += 1;
        self.components.insert(id, Component::new(id, position, device));
        debug!("Added {} {}", kind, id);
        Ok(id)
    }

    /// Unwire and drop a component. Unknown ids are ignored.
    pub fn remove_component(&mut self, id: ComponentId) -> Result<()> {
        if !self.components.contains_key(&id) {
            debug!("Ignoring removal of unknown component {}", id);
            return Ok(());
        }
        self.topology.detach_component(&mut self.components, id)?;
        self.components.remove(&id);
        debug!("Removed component {}", id);
        Ok(())
    }

    pub fn connect(&mut self, a: PinRef, b: PinRef) -> Result<()> {
        self.topology.connect(&mut self.components, a, b)
    }

    pub fn disconnect(&mut self, pin: PinRef) -> Result<()> {
        self.topology.disconnect(&mut self.components, pin)
    }

    pub fn set_property(&mut self, id: ComponentId, key: &str, value: PropertyValue) -> Result<()> {
        let component = self
            .components
            .get_mut(&id)
            .ok_or(EngineError::UnknownComponent(id))?;
        component.device.set_property(key, value)?;
        debug!("Set {}.{} = {:?}", id, key, value);
        Ok(())
    }

    pub fn start(&mut self) {
        if self.clock == ClockState::Stopped {
            self.clock = ClockState::Running;
            info!("Simulation started at t = {:.3}s", self.elapsed);
        }
    }

    pub fn stop(&mut self) {
        if self.clock == ClockState::Running {
            self.clock = ClockState::Stopped;
            info!("Simulation stopped at t = {:.3}s", self.elapsed);
        }
    }

    /// Zero voltages, wire currents and elapsed time and reset every device.
    /// The running/stopped state is left as it was.
    pub fn reset(&mut self) {
        self.topology.clear_values();
        for component in self.components.values_mut() {
            component.device.reset();
        }
        self.elapsed = 0.0;
        self.ticks = 0;
        self.last_stats = SolverStats::default();
        info!("Simulation reset");
    }

    pub fn set_speed(&mut self, factor: f64) -> Result<()> {
        if !factor.is_finite() || factor < 0.0 {
            return Err(EngineError::InvalidValue {
                key: "speed".to_string(),
                reason: "must be a finite, non-negative factor".to_string(),
            });
        }
        self.speed = factor;
        Ok(())
    }

    /// Advance by one wall-clock interval. Returns whether a step was solved.
    pub fn tick(&mut self, wall_dt: f64) -> bool {
        if self.clock != ClockState::Running || !wall_dt.is_finite() || wall_dt <= 0.0 {
            return false;
        }

        let dt = wall_dt.min(self.config.max_step) * self.speed;
        if dt <= 0.0 {
            return false;
        }

        self.step(dt);
        true
    }

    /// One solve: stamps, linear solve, device update, wire currents.
    fn step(&mut self, dt: f64) {
        if self.topology.is_dirty() || self.ticks == 0 {
            self.topology.rebuild(&mut self.components);
            self.layout = NodeLayout::new(&self.topology, &self.components);
        }

        let system = MnaSystem::assemble(&self.layout, &self.components, dt);
        let (solution, stats) = self.solver.solve(&system.matrix, &system.rhs);
        self.layout.scatter(&solution, &mut self.topology);

        for component in self.components.values_mut() {
            if component.is_fully_wired() {
                let voltages: Vec<f64> = component
                    .pins
                    .iter()
                    .map(|p| p.node.map_or(0.0, |n| self.topology.node_voltage(n)))
                    .collect();
                component.device.update_state(&voltages, dt);
            } else {
                component.device.isolate();
            }
        }

        derive_wire_currents(&mut self.topology, &self.components);

        self.elapsed += dt;
        self.ticks += 1;
        trace!(
            "Tick {}: t = {:.6}s, {} unknowns, residual {:.2e}",
            self.ticks,
            self.elapsed,
            stats.size,
            stats.residual_norm
        );
        self.last_stats = stats;
    }

    /// Snapshot of the last completed tick.
    ///
    /// Topology (nodes, members, wires, pins and reference flags) always
    /// reflects the current wiring. Voltages and currents come from the last
    /// solve: after a merge the surviving node keeps its old voltage, and a
    /// node created since then reads 0 V. `pending_rebuild` is set until the
    /// next tick brings them back in line.
    pub fn get_state(&self) -> SimulationState {
        let pending_rebuild = self.topology.is_dirty();
        let layout = if pending_rebuild {
            Cow::Owned(NodeLayout::new(&self.topology, &self.components))
        } else {
            Cow::Borrowed(&self.layout)
        };

        let components = self
            .components
            .values()
            .map(|c| {
                let voltage_at = |pin: usize| {
                    c.pin_node(pin)
                        .map_or(0.0, |n| self.topology.node_voltage(n))
                };
                let voltage_drop = if c.is_fully_wired() {
                    voltage_at(0) - voltage_at(1)
                } else {
                    0.0
                };
                ComponentState {
                    id: c.id,
                    kind: c.kind(),
                    position: c.position,
                    pins: c.pins.iter().map(|p| p.node).collect(),
                    properties: c
                        .device
                        .properties()
                        .into_iter()
                        .map(|(k, v)| (k.to_string(), v))
                        .collect(),
                    current: c.device.current(),
                    voltage_drop,
                    visual: c.device.visual(),
                }
            })
            .collect();

        let nodes = self
            .topology
            .nodes()
            .map(|n| NodeState {
                id: n.id,
                voltage: n.voltage,
                members: n.members.clone(),
                ground: layout.is_reference(n.id),
            })
            .collect();

        let wires = self
            .topology
            .wires()
            .iter()
            .map(|w| WireState {
                id: w.id,
                from: w.from,
                to: w.to,
                current: w.current,
            })
            .collect();

        SimulationState {
            time: self.elapsed,
            running: self.is_running(),
            speed: self.speed,
            pending_rebuild,
            components,
            nodes,
            wires,
        }
    }

    pub fn is_running(&self) -> bool {
        self.clock == ClockState::Running
    }

    pub fn clock_state(&self) -> ClockState {
        self.clock
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn last_solver_stats(&self) -> &SolverStats {
        &self.last_stats
    }

    pub fn components(&self) -> impl Iterator<Item = &Component> {
        self.components.values()
    }

    pub fn component(&self, id: ComponentId) -> Option<&Component> {
        self.components.get(&id)
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }
}

impl Default for Simulator {
    fn default() -> Self {
        Self::new()
    }
}
