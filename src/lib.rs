pub mod circuit;
pub mod cli;
pub mod device;
pub mod error;
pub mod mna;
pub mod recorder;
pub mod scene;
pub mod simulator;
pub mod solver;
pub mod topology;
pub mod wires;

// Re-export commonly used types
pub use circuit::{ComponentId, NodeId, PinRef, Position};
pub use device::{DeviceKind, PropertyValue};
pub use error::EngineError;
pub use recorder::Recorder;
pub use scene::Scene;
pub use simulator::{SimulationState, Simulator, SimulatorConfig};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
