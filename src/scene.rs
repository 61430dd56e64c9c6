use std::collections::{BTreeMap, HashMap};
use std::fs;

use anyhow::{anyhow, Context, Result};
use log::info;
use serde::{Deserialize, Serialize};

use crate::circuit::{ComponentId, PinRef, Position};
use crate::device::{DeviceKind, PropertyValue};
use crate::simulator::Simulator;

/// A stored circuit: named components plus the pin pairs wired together.
///
/// ```json
/// {
///   "title": "LED with current limiter",
///   "components": [
///     { "name": "B1", "kind": "battery", "properties": { "voltage": 5.0 } },
///     { "name": "R1", "kind": "resistor", "properties": { "resistance": 220 } },
///     { "name": "D1", "kind": "led" }
///   ],
///   "connections": [["B1.+", "R1.0"], ["R1.1", "D1.anode"], ["D1.cathode", "B1.-"]]
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    #[serde(default)]
    pub title: String,
    pub components: Vec<SceneComponent>,
    #[serde(default)]
    pub connections: Vec<(String, String)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneComponent {
    pub name: String,
    pub kind: DeviceKind,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl Scene {
    pub fn from_file(filename: &str) -> Result<Self> {
        let content = fs::read_to_string(filename)
            .map_err(|e| anyhow!("Failed to read file '{}': {}", filename, e))?;
        Self::from_json(&content).with_context(|| format!("Invalid circuit file '{}'", filename))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Replay the scene into a simulator through add/connect.
    /// Returns the id assigned to each component name.
    pub fn load_into(&self, simulator: &mut Simulator) -> Result<HashMap<String, ComponentId>> {
        let mut ids = HashMap::new();

        for component in &self.components {
            if ids.contains_key(&component.name) {
                return Err(anyhow!("Duplicate component name '{}'", component.name));
            }
            let properties: Vec<(&str, PropertyValue)> = component
                .properties
                .iter()
                .map(|(k, v)| (k.as_str(), *v))
                .collect();
            let id = simulator
                .add_component(component.kind, component.position, &properties)
                .with_context(|| format!("Cannot add component '{}'", component.name))?;
            ids.insert(component.name.clone(), id);
        }

        for (a, b) in &self.connections {
            let pin_a = resolve_pin(a, &ids, &self.components)?;
            let pin_b = resolve_pin(b, &ids, &self.components)?;
            simulator
                .connect(pin_a, pin_b)
                .with_context(|| format!("Cannot connect {} to {}", a, b))?;
        }

        info!(
            "Loaded circuit '{}': {} components, {} connections",
            self.title,
            self.components.len(),
            self.connections.len()
        );
        Ok(ids)
    }
}

/// Parse "NAME.PIN" where PIN is an index or a terminal alias
fn resolve_pin(
    reference: &str,
    ids: &HashMap<String, ComponentId>,
    components: &[SceneComponent],
) -> Result<PinRef> {
    let (name, pin) = reference
        .rsplit_once('.')
        .ok_or_else(|| anyhow!("Pin reference '{}' must look like NAME.PIN", reference))?;

    let id = *ids
        .get(name)
        .ok_or_else(|| anyhow!("Unknown component '{}' in '{}'", name, reference))?;
    let kind = components
        .iter()
        .find(|c| c.name == name)
        .map(|c| c.kind)
        .ok_or_else(|| anyhow!("Unknown component '{}' in '{}'", name, reference))?;

    let index = match (kind, pin.to_lowercase().as_str()) {
        (DeviceKind::Battery, "+" | "pos" | "positive") => 0,
        (DeviceKind::Battery, "-" | "neg" | "negative") => 1,
        (DeviceKind::Led | DeviceKind::Diode, "anode" | "a") => 0,
        (DeviceKind::Led | DeviceKind::Diode, "cathode" | "k") => 1,
        (_, other) => other
            .parse::<usize>()
            .map_err(|_| anyhow!("Unknown pin '{}' on {} '{}'", pin, kind, name))?,
    };
    Ok(PinRef::new(id, index))
}
