use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;

use anyhow::Result;
use colored::*;
use csv::Writer;
use log::info;
use serde::{Deserialize, Serialize};

use crate::circuit::ComponentId;
use crate::cli::OutputFormat;
use crate::simulator::SimulationState;

/// Values captured after one completed tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f64,
    pub node_voltages: BTreeMap<String, f64>,
    pub currents: BTreeMap<String, f64>,
}

/// Per-tick history of node voltages and component currents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recorder {
    #[serde(skip)]
    labels: HashMap<ComponentId, String>,
    pub samples: Vec<Sample>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report components under these names instead of their ids
    pub fn with_labels(labels: HashMap<ComponentId, String>) -> Self {
        Recorder {
            labels,
            samples: Vec::new(),
        }
    }

    pub fn label(&self, id: ComponentId) -> String {
        self.labels
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    pub fn record(&mut self, state: &SimulationState) {
        let node_voltages = state
            .nodes
            .iter()
            .map(|n| (n.id.to_string(), n.voltage))
            .collect();
        let currents = state
            .components
            .iter()
            .map(|c| (self.label(c.id), c.current))
            .collect();

        self.samples.push(Sample {
            time: state.time,
            node_voltages,
            currents,
        });
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Export recorded samples to file
    pub fn export(&self, filename: &str, format: OutputFormat) -> Result<()> {
        match format {
            OutputFormat::Csv => self.export_csv(filename),
            OutputFormat::Json => self.export_json(filename),
        }
    }

    /// Export samples to CSV format
    fn export_csv(&self, filename: &str) -> Result<()> {
        let file = File::create(filename)?;
        let mut writer = Writer::from_writer(file);

        // Nodes can come and go between ticks; take the union
        let nodes: BTreeSet<&String> = self
            .samples
            .iter()
            .flat_map(|s| s.node_voltages.keys())
            .collect();
        let components: BTreeSet<&String> =
            self.samples.iter().flat_map(|s| s.currents.keys()).collect();

        let mut header = vec!["time".to_string()];
        header.extend(nodes.iter().map(|n| format!("V({})", n)));
        header.extend(components.iter().map(|c| format!("I({})", c)));
        writer.write_record(&header)?;

        for sample in &self.samples {
            let mut record = vec![sample.time.to_string()];
            for node in &nodes {
                let voltage = sample.node_voltages.get(*node).unwrap_or(&0.0);
                record.push(voltage.to_string());
            }
            for component in &components {
                let current = sample.currents.get(*component).unwrap_or(&0.0);
                record.push(current.to_string());
            }
            writer.write_record(&record)?;
        }

        writer.flush()?;
        info!("Results exported to CSV: {}", filename);
        Ok(())
    }

    /// Export samples to JSON format
    fn export_json(&self, filename: &str) -> Result<()> {
        let file = File::create(filename)?;
        serde_json::to_writer_pretty(file, &self.samples)?;

        info!("Results exported to JSON: {}", filename);
        Ok(())
    }

    /// Print the final state of the run
    pub fn print_summary(&self, state: &SimulationState) {
        println!("\n{}", "=== Simulation Summary ===".bold());
        println!("Elapsed simulation time: {:.3}s", state.time);
        println!("Ticks recorded: {}", self.samples.len());

        if !state.nodes.is_empty() {
            println!("\nNode voltages:");
            for node in &state.nodes {
                let marker = if node.ground { " (ground)" } else { "" };
                println!("  V({}): {:.6}V{}", node.id, node.voltage, marker);
            }
        }

        if !state.components.is_empty() {
            println!("\nComponents:");
            for component in &state.components {
                let mut line = format!(
                    "  {} [{}]: I = {:.6}A, drop = {:.4}V",
                    self.label(component.id).bright_blue(),
                    component.kind,
                    component.current,
                    component.voltage_drop
                );
                if let Some(brightness) = component.visual.brightness {
                    line.push_str(&format!(", brightness {:.0}%", brightness * 100.0));
                }
                if let Some(closed) = component.visual.closed {
                    line.push_str(if closed { ", closed" } else { ", open" });
                }
                if let Some(charge) = component.visual.charge_percent {
                    line.push_str(&format!(", charge {:.0}%", charge * 100.0));
                }
                println!("{}", line);
            }
        }
    }
}
