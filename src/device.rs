use std::fmt;
use std::str::FromStr;

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Kinds of devices the engine knows how to simulate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    Battery,
    Resistor,
    Switch,
    Led,
    Diode,
    Capacitor,
}

impl DeviceKind {
    pub fn name(&self) -> &'static str {
        match self {
            DeviceKind::Battery => "battery",
            DeviceKind::Resistor => "resistor",
            DeviceKind::Switch => "switch",
            DeviceKind::Led => "led",
            DeviceKind::Diode => "diode",
            DeviceKind::Capacitor => "capacitor",
        }
    }

    /// Every supported device is two-terminal.
    /// Battery: [positive, negative]. Diode/LED: [anode, cathode].
    pub fn pin_count(&self) -> usize {
        2
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DeviceKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "battery" | "source" | "voltage_source" => Ok(DeviceKind::Battery),
            "resistor" => Ok(DeviceKind::Resistor),
            "switch" => Ok(DeviceKind::Switch),
            "led" => Ok(DeviceKind::Led),
            "diode" => Ok(DeviceKind::Diode),
            "capacitor" => Ok(DeviceKind::Capacitor),
            _ => Err(EngineError::UnknownKind(s.to_string())),
        }
    }
}

/// A property value as supplied by the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Number(f64),
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Number(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

/// Tunable device constants and per-kind default property values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceDefaults {
    /// Penalty conductance pinning a battery's terminal voltage
    pub source_conductance: f64,
    pub switch_closed_conductance: f64,
    pub switch_open_conductance: f64,
    pub diode_reverse_resistance: f64,
    /// Upper bound on reported LED brightness (1.0 = nominal current)
    pub brightness_headroom: f64,

    pub battery_voltage: f64,
    pub resistance: f64,
    pub led_forward_voltage: f64,
    pub led_forward_resistance: f64,
    pub led_nominal_current: f64,
    pub diode_forward_voltage: f64,
    pub diode_forward_resistance: f64,
    pub capacitance: f64,
    pub capacitor_rated_voltage: f64,
}

impl Default for DeviceDefaults {
    fn default() -> Self {
        DeviceDefaults {
            source_conductance: 1e6,
            switch_closed_conductance: 1e6,
            switch_open_conductance: 1e-9,
            diode_reverse_resistance: 1e9,
            brightness_headroom: 2.0,
            battery_voltage: 5.0,
            resistance: 1000.0,
            led_forward_voltage: 2.0,
            led_forward_resistance: 5.0,
            led_nominal_current: 0.02,
            diode_forward_voltage: 0.7,
            diode_forward_resistance: 1.0,
            capacitance: 100e-6,
            capacitor_rated_voltage: 5.0,
        }
    }
}

/// A device's contribution to the nodal system, in pin-local coordinates.
///
/// `pins[k]` is the component pin that row/column `k` of `conductance`
/// and entry `k` of `current` refer to.
#[derive(Debug, Clone, PartialEq)]
pub struct Stamp {
    pub conductance: DMatrix<f64>,
    pub current: DVector<f64>,
    pub pins: Vec<usize>,
}

impl Stamp {
    /// Conductance `g` between pins 0 and 1 plus a current `i` injected
    /// into pin 0's node and drawn from pin 1's.
    pub fn two_terminal(g: f64, i: f64) -> Self {
        Stamp {
            conductance: DMatrix::from_row_slice(2, 2, &[g, -g, -g, g]),
            current: DVector::from_vec(vec![i, -i]),
            pins: vec![0, 1],
        }
    }

    pub fn empty() -> Self {
        Stamp {
            conductance: DMatrix::zeros(0, 0),
            current: DVector::zeros(0),
            pins: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }
}

/// Derived display state of a device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Visual {
    /// LED brightness in [0, 1], already capped for display
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brightness: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charge_percent: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Battery {
    pub voltage: f64,
    internal_conductance: f64,
    /// Current delivered out of the positive terminal
    pub current: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resistor {
    pub resistance: f64,
    pub current: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Switch {
    pub closed: bool,
    closed_conductance: f64,
    open_conductance: f64,
    pub current: f64,
}

impl Switch {
    fn conductance(&self) -> f64 {
        if self.closed {
            self.closed_conductance
        } else {
            self.open_conductance
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LightOutput {
    pub nominal_current: f64,
    headroom: f64,
    /// Uncapped brightness, may exceed 1.0 when over-driven
    pub brightness: f64,
}

/// Piecewise-linear PN junction shared by diodes and LEDs
#[derive(Debug, Clone, PartialEq)]
pub struct Junction {
    pub forward_voltage: f64,
    pub forward_resistance: f64,
    reverse_resistance: f64,
    /// Bias region found at the end of the previous tick
    pub conducting: bool,
    pub current: f64,
    pub light: Option<LightOutput>,
}

impl Junction {
    /// Current through the junction for a given anode-cathode drop,
    /// along with the region that drop falls into.
    fn evaluate(&self, drop: f64) -> (f64, bool) {
        if drop >= self.forward_voltage {
            ((drop - self.forward_voltage) / self.forward_resistance, true)
        } else {
            (drop / self.reverse_resistance, false)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Capacitor {
    pub capacitance: f64,
    pub rated_voltage: f64,
    /// Voltage across the plates after the last tick
    pub voltage: f64,
    pub current: f64,
}

impl Capacitor {
    fn companion_conductance(&self, dt: f64) -> f64 {
        if dt > 0.0 {
            self.capacitance / dt
        } else {
            0.0
        }
    }

    pub fn charge(&self) -> f64 {
        self.capacitance * self.voltage
    }

    pub fn charge_percent(&self) -> f64 {
        (self.voltage.abs() / self.rated_voltage).clamp(0.0, 1.0)
    }
}

/// A simulated device. The set of kinds is closed, so each operation is a
/// single match over the variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Device {
    Battery(Battery),
    Resistor(Resistor),
    Switch(Switch),
    Led(Junction),
    Diode(Junction),
    Capacitor(Capacitor),
}

impl Device {
    pub fn new(kind: DeviceKind, defaults: &DeviceDefaults) -> Self {
        match kind {
            DeviceKind::Battery => Device::Battery(Battery {
                voltage: defaults.battery_voltage,
                internal_conductance: defaults.source_conductance,
                current: 0.0,
            }),
            DeviceKind::Resistor => Device::Resistor(Resistor {
                resistance: defaults.resistance,
                current: 0.0,
            }),
            DeviceKind::Switch => Device::Switch(Switch {
                closed: false,
                closed_conductance: defaults.switch_closed_conductance,
                open_conductance: defaults.switch_open_conductance,
                current: 0.0,
            }),
            DeviceKind::Led => Device::Led(Junction {
                forward_voltage: defaults.led_forward_voltage,
                forward_resistance: defaults.led_forward_resistance,
                reverse_resistance: defaults.diode_reverse_resistance,
                conducting: false,
                current: 0.0,
                light: Some(LightOutput {
                    nominal_current: defaults.led_nominal_current,
                    headroom: defaults.brightness_headroom,
                    brightness: 0.0,
                }),
            }),
            DeviceKind::Diode => Device::Diode(Junction {
                forward_voltage: defaults.diode_forward_voltage,
                forward_resistance: defaults.diode_forward_resistance,
                reverse_resistance: defaults.diode_reverse_resistance,
                conducting: false,
                current: 0.0,
                light: None,
            }),
            DeviceKind::Capacitor => Device::Capacitor(Capacitor {
                capacitance: defaults.capacitance,
                rated_voltage: defaults.capacitor_rated_voltage,
                voltage: 0.0,
                current: 0.0,
            }),
        }
    }

    pub fn kind(&self) -> DeviceKind {
        match self {
            Device::Battery(_) => DeviceKind::Battery,
            Device::Resistor(_) => DeviceKind::Resistor,
            Device::Switch(_) => DeviceKind::Switch,
            Device::Led(_) => DeviceKind::Led,
            Device::Diode(_) => DeviceKind::Diode,
            Device::Capacitor(_) => DeviceKind::Capacitor,
        }
    }

    /// Linearized contribution at the present operating point.
    ///
    /// Callers are responsible for only asking fully wired devices.
    pub fn stamp(&self, dt: f64) -> Stamp {
        match self {
            Device::Battery(b) => {
                Stamp::two_terminal(b.internal_conductance, b.internal_conductance * b.voltage)
            }
            Device::Resistor(r) => Stamp::two_terminal(1.0 / r.resistance, 0.0),
            Device::Switch(s) => Stamp::two_terminal(s.conductance(), 0.0),
            Device::Led(j) | Device::Diode(j) => {
                // Linearized at the previous tick's bias, no inner iteration
                if j.conducting {
                    let g = 1.0 / j.forward_resistance;
                    Stamp::two_terminal(g, g * j.forward_voltage)
                } else {
                    Stamp::two_terminal(1.0 / j.reverse_resistance, 0.0)
                }
            }
            Device::Capacitor(c) => {
                let g = c.companion_conductance(dt);
                Stamp::two_terminal(g, g * c.voltage)
            }
        }
    }

    /// Recompute currents and derived state from the solved pin voltages.
    pub fn update_state(&mut self, pin_voltages: &[f64], dt: f64) {
        let drop = match pin_voltages {
            [a, b, ..] => a - b,
            _ => return,
        };

        match self {
            Device::Battery(b) => {
                b.current = (b.voltage - drop) * b.internal_conductance;
            }
            Device::Resistor(r) => {
                r.current = drop / r.resistance;
            }
            Device::Switch(s) => {
                s.current = drop * s.conductance();
            }
            Device::Led(j) | Device::Diode(j) => {
                let (current, conducting) = j.evaluate(drop);
                j.current = current;
                j.conducting = conducting;
                if let Some(light) = j.light.as_mut() {
                    light.brightness = if conducting {
                        (current / light.nominal_current).clamp(0.0, light.headroom)
                    } else {
                        0.0
                    };
                }
            }
            Device::Capacitor(c) => {
                let g = c.companion_conductance(dt);
                c.current = g * (drop - c.voltage);
                c.voltage = drop;
            }
        }
    }

    /// Return to the power-on state. User-set properties are kept.
    pub fn reset(&mut self) {
        match self {
            Device::Battery(b) => b.current = 0.0,
            Device::Resistor(r) => r.current = 0.0,
            Device::Switch(s) => s.current = 0.0,
            Device::Led(j) | Device::Diode(j) => {
                j.conducting = false;
                j.current = 0.0;
                if let Some(light) = j.light.as_mut() {
                    light.brightness = 0.0;
                }
            }
            Device::Capacitor(c) => {
                c.voltage = 0.0;
                c.current = 0.0;
            }
        }
    }

    /// A device with a floating pin carries no current. Stored charge and
    /// switch position survive being unplugged.
    pub fn isolate(&mut self) {
        match self {
            Device::Capacitor(c) => c.current = 0.0,
            _ => self.reset(),
        }
    }

    /// Signed device current. Passive devices report pin 0 to pin 1 through
    /// the device; a battery reports current delivered from its positive
    /// terminal.
    pub fn current(&self) -> f64 {
        match self {
            Device::Battery(b) => b.current,
            Device::Resistor(r) => r.current,
            Device::Switch(s) => s.current,
            Device::Led(j) | Device::Diode(j) => j.current,
            Device::Capacitor(c) => c.current,
        }
    }

    /// Current leaving the device through each pin into its node.
    pub fn terminal_currents(&self) -> [f64; 2] {
        let i = self.current();
        match self {
            Device::Battery(_) => [i, -i],
            _ => [-i, i],
        }
    }

    pub fn visual(&self) -> Visual {
        match self {
            Device::Led(Junction { light: Some(light), .. }) => Visual {
                brightness: Some(light.brightness.clamp(0.0, 1.0)),
                ..Visual::default()
            },
            Device::Switch(s) => Visual {
                closed: Some(s.closed),
                ..Visual::default()
            },
            Device::Capacitor(c) => Visual {
                charge_percent: Some(c.charge_percent()),
                ..Visual::default()
            },
            _ => Visual::default(),
        }
    }

    /// User-facing properties and their current values
    pub fn properties(&self) -> Vec<(&'static str, PropertyValue)> {
        match self {
            Device::Battery(b) => vec![("voltage", b.voltage.into())],
            Device::Resistor(r) => vec![("resistance", r.resistance.into())],
            Device::Switch(s) => vec![("closed", s.closed.into())],
            Device::Led(j) => {
                let mut props = vec![
                    ("forward_voltage", j.forward_voltage.into()),
                    ("forward_resistance", j.forward_resistance.into()),
                ];
                if let Some(light) = &j.light {
                    props.push(("nominal_current", light.nominal_current.into()));
                }
                props
            }
            Device::Diode(j) => vec![
                ("forward_voltage", j.forward_voltage.into()),
                ("forward_resistance", j.forward_resistance.into()),
            ],
            Device::Capacitor(c) => vec![
                ("capacitance", c.capacitance.into()),
                ("rated_voltage", c.rated_voltage.into()),
            ],
        }
    }

    /// Validate and apply a property. Nothing is changed on error.
    pub fn set_property(&mut self, key: &str, value: PropertyValue) -> Result<()> {
        let kind = self.kind();
        match (self, key) {
            (Device::Battery(b), "voltage") => b.voltage = finite(key, value)?,
            (Device::Resistor(r), "resistance") => r.resistance = positive(key, value)?,
            (Device::Switch(s), "closed") => s.closed = boolean(key, value)?,
            (Device::Led(j) | Device::Diode(j), "forward_voltage") => {
                j.forward_voltage = positive(key, value)?
            }
            (Device::Led(j) | Device::Diode(j), "forward_resistance") => {
                j.forward_resistance = positive(key, value)?
            }
            (Device::Led(Junction { light: Some(light), .. }), "nominal_current") => {
                light.nominal_current = positive(key, value)?
            }
            (Device::Capacitor(c), "capacitance") => c.capacitance = positive(key, value)?,
            (Device::Capacitor(c), "rated_voltage") => c.rated_voltage = positive(key, value)?,
            _ => {
                return Err(EngineError::UnknownProperty {
                    kind: kind.name(),
                    key: key.to_string(),
                })
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> EngineError {
    EngineError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn finite(key: &str, value: PropertyValue) -> Result<f64> {
    match value {
        PropertyValue::Number(v) if v.is_finite() => Ok(v),
        PropertyValue::Number(_) => Err(invalid(key, "must be a finite number")),
        PropertyValue::Bool(_) => Err(invalid(key, "expected a number")),
    }
}

fn positive(key: &str, value: PropertyValue) -> Result<f64> {
    let v = finite(key, value)?;
    if v <= 0.0 {
        return Err(invalid(key, "must be greater than zero"));
    }
    Ok(v)
}

fn boolean(key: &str, value: PropertyValue) -> Result<bool> {
    match value {
        PropertyValue::Bool(b) => Ok(b),
        PropertyValue::Number(_) => Err(invalid(key, "expected true or false")),
    }
}
