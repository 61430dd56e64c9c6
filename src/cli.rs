use anyhow::{anyhow, Result};
use clap::ArgMatches;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub input_file: String,
    pub output_file: Option<String>,
    pub ticks: usize,
    pub interval: f64,
    pub speed: f64,
    pub max_step: Option<f64>,
    pub output_format: OutputFormat,
    pub verbose_level: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Csv,
    Json,
}

impl CliArgs {
    pub fn from_matches(matches: &ArgMatches) -> Result<Self> {
        let input_file = matches
            .get_one::<String>("input")
            .ok_or_else(|| anyhow!("Input file is required"))?
            .clone();

        let output_file = matches.get_one::<String>("output").cloned();

        let verbose_level = matches.get_count("verbose");

        let output_format = match matches.get_one::<String>("format").map(String::as_str) {
            Some("csv") | None => OutputFormat::Csv,
            Some("json") => OutputFormat::Json,
            Some(other) => return Err(anyhow!("Invalid output format '{}'", other)),
        };

        let ticks = match matches.get_one::<String>("ticks") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| anyhow!("Tick count must be a whole number, got '{}'", value))?,
            None => 60,
        };

        let interval = match matches.get_one::<String>("interval") {
            Some(value) => parse_duration(value)?,
            None => 1.0 / 60.0,
        };
        if interval <= 0.0 {
            return Err(anyhow!("Tick interval must be positive"));
        }

        let speed = match matches.get_one::<String>("speed") {
            Some(value) => value.parse::<f64>()?,
            None => 1.0,
        };

        let max_step = matches
            .get_one::<String>("max-step")
            .map(|value| parse_duration(value))
            .transpose()?;
        if let Some(step) = max_step {
            if step <= 0.0 {
                return Err(anyhow!("Maximum step must be positive"));
            }
        }

        Ok(CliArgs {
            input_file,
            output_file,
            ticks,
            interval,
            speed,
            max_step,
            output_format,
            verbose_level,
        })
    }
}

/// Unit suffixes accepted for durations, longest first so "ms" wins over "s"
const TIME_UNITS: [(&str, f64); 4] = [("us", 1e-6), ("µs", 1e-6), ("ms", 1e-3), ("s", 1.0)];

/// Parse a duration in seconds: "16ms", "250us", "0.5s", a bare number of
/// seconds, or a tick rate such as "60hz" (one tick's period).
pub fn parse_duration(value: &str) -> Result<f64> {
    let value = value.trim().to_lowercase();
    let number = |text: &str| {
        text.trim()
            .parse::<f64>()
            .map_err(|_| anyhow!("Invalid duration '{}'", value))
    };

    if let Some(rate) = value.strip_suffix("hz") {
        let rate = number(rate)?;
        if rate <= 0.0 {
            return Err(anyhow!("Tick rate must be positive, got '{}'", value));
        }
        return Ok(1.0 / rate);
    }

    for (suffix, scale) in TIME_UNITS {
        if let Some(text) = value.strip_suffix(suffix) {
            return Ok(number(text)? * scale);
        }
    }
    number(value.as_str())
}
