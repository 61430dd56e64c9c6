use clap::{Arg, ArgMatches, Command};
use colored::*;
use log::{error, info, LevelFilter};
use std::path::Path;

use circuit_lab::cli::CliArgs;
use circuit_lab::{Recorder, Scene, Simulator, SimulatorConfig};

fn main() {
    let matches = create_cli().get_matches();
    init_logging(matches.get_count("verbose"));

    if let Err(e) = run_application(&matches) {
        error!("{}", format!("Error: {:#}", e).red());
        std::process::exit(1);
    }
}

/// `RUST_LOG` wins; otherwise each `-v` raises the level one step
fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn create_cli() -> Command {
    Command::new("circuitLab")
        .version(circuit_lab::VERSION)
        .about(circuit_lab::DESCRIPTION)
        .arg(
            Arg::new("input")
                .help("Circuit description file (.json)")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Output file for the per-tick history"),
        )
        .arg(
            Arg::new("ticks")
                .short('n')
                .long("ticks")
                .value_name("COUNT")
                .help("Number of ticks to run [default: 60]"),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .value_name("TIME")
                .help("Wall-clock time between ticks, e.g. 16ms or 60hz [default: 60hz]"),
        )
        .arg(
            Arg::new("speed")
                .long("speed")
                .value_name("FACTOR")
                .help("Simulation speed factor [default: 1.0]"),
        )
        .arg(
            Arg::new("max-step")
                .long("max-step")
                .value_name("TIME")
                .help("Longest step a single tick may take"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(clap::ArgAction::Count)
                .help("Increase verbosity level"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .value_name("FORMAT")
                .default_value("csv")
                .value_parser(["csv", "json"])
                .help("Output format"),
        )
}

fn run_application(matches: &ArgMatches) -> anyhow::Result<()> {
    let args = CliArgs::from_matches(matches)?;

    info!("{}", "Starting circuit simulation".green().bold());
    info!("Input file: {}", args.input_file.bright_blue());

    // Validate input file exists
    if !Path::new(&args.input_file).exists() {
        return Err(anyhow::anyhow!("Input file '{}' not found", args.input_file));
    }

    let mut config = SimulatorConfig::default();
    if let Some(max_step) = args.max_step {
        config.max_step = max_step;
    }

    let mut simulator = Simulator::with_config(config);
    simulator.set_speed(args.speed)?;

    let scene = Scene::from_file(&args.input_file)?;
    let ids = scene.load_into(&mut simulator)?;
    let labels = ids.into_iter().map(|(name, id)| (id, name)).collect();
    let mut recorder = Recorder::with_labels(labels);

    simulator.start();
    for _ in 0..args.ticks {
        if simulator.tick(args.interval) {
            recorder.record(&simulator.get_state());
        }
    }
    simulator.stop();

    let stats = simulator.last_solver_stats();
    info!(
        "Ran {} ticks; last solve {}x{}, residual {:.2e}",
        simulator.ticks(),
        stats.size,
        stats.size,
        stats.residual_norm
    );

    if let Some(output_file) = args.output_file {
        recorder.export(&output_file, args.output_format)?;
        info!("Results exported to: {}", output_file.bright_green());
    } else {
        recorder.print_summary(&simulator.get_state());
    }

    info!("{}", "Simulation completed successfully!".green().bold());
    Ok(())
}
