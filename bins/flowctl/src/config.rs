use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use flow_api::Operator;
use flow_engine::EngineConfig;
use flow_log_sink::{LogSink, LogSinkConfig};
use flow_record::{Player, PlayerConfig, Recorder, RecorderConfig};
use flow_transform::{Concat, Expand, Unzip};

use crate::error::CliError;

#[derive(Parser)]
#[command(name = "flowctl", about = "Run operator pipelines and inspect recordings")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline described by a TOML file
    Run(RunArgs),
    /// Print the manifest and messages of a recording
    Inspect(InspectArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Path to the TOML pipeline file
    #[arg(long, default_value = "flow.toml", env = "CONFIG_PATH")]
    pub config: String,
}

#[derive(Args, Clone, Debug)]
pub struct InspectArgs {
    /// Recording to read
    pub file: PathBuf,
    /// One JSON object per line instead of text
    #[arg(long)]
    pub json: bool,
    /// Print at most this many messages (totals still count all of them)
    #[arg(long)]
    pub limit: Option<usize>,
}

// ---- TOML Config ----

#[derive(Debug, Deserialize)]
pub struct FlowConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    /// Built in file order; inputs must be declared by an earlier operator.
    #[serde(default)]
    pub operators: Vec<OperatorConfig>,
}

impl FlowConfig {
    pub fn load(path: &str) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path).map_err(|e| CliError::Config {
            context: "read",
            detail: format!("'{path}': {e}"),
        })?;
        Self::parse(&content).map_err(|e| match e {
            CliError::Config { context, detail } => CliError::Config {
                context,
                detail: format!("'{path}': {detail}"),
            },
            other => other,
        })
    }

    pub fn parse(content: &str) -> Result<Self, CliError> {
        toml::from_str(content).map_err(|e| CliError::Config {
            context: "parse",
            detail: e.to_string(),
        })
    }
}

/// Operators that can be expressed without code.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OperatorConfig {
    Replay {
        name: String,
        #[serde(flatten)]
        config: PlayerConfig,
    },
    Record {
        name: String,
        inputs: Vec<String>,
        #[serde(flatten)]
        config: RecorderConfig,
    },
    Log {
        name: String,
        inputs: Vec<String>,
        #[serde(flatten)]
        config: LogSinkConfig,
    },
    Concat {
        name: String,
        inputs: Vec<String>,
        output: String,
    },
    Unzip {
        name: String,
        inputs: Vec<String>,
        left: String,
        right: String,
    },
    Expand {
        name: String,
        inputs: Vec<String>,
        output: String,
    },
}

impl OperatorConfig {
    pub fn kind(&self) -> &'static str {
        match self {
            OperatorConfig::Replay { .. } => "replay",
            OperatorConfig::Record { .. } => "record",
            OperatorConfig::Log { .. } => "log",
            OperatorConfig::Concat { .. } => "concat",
            OperatorConfig::Unzip { .. } => "unzip",
            OperatorConfig::Expand { .. } => "expand",
        }
    }

    pub fn name(&self) -> &str {
        match self {
            OperatorConfig::Replay { name, .. }
            | OperatorConfig::Record { name, .. }
            | OperatorConfig::Log { name, .. }
            | OperatorConfig::Concat { name, .. }
            | OperatorConfig::Unzip { name, .. }
            | OperatorConfig::Expand { name, .. } => name,
        }
    }

    pub fn inputs(&self) -> &[String] {
        match self {
            OperatorConfig::Replay { .. } => &[],
            OperatorConfig::Record { inputs, .. }
            | OperatorConfig::Log { inputs, .. }
            | OperatorConfig::Concat { inputs, .. }
            | OperatorConfig::Unzip { inputs, .. }
            | OperatorConfig::Expand { inputs, .. } => inputs,
        }
    }

    pub fn into_operator(self) -> Box<dyn Operator> {
        match self {
            OperatorConfig::Replay { name, config } => Box::new(Player::new(name, config)),
            OperatorConfig::Record { name, config, .. } => Box::new(Recorder::new(name, config)),
            OperatorConfig::Log { name, config, .. } => Box::new(LogSink::new(name, config)),
            OperatorConfig::Concat { name, output, .. } => Box::new(Concat::new(name, output)),
            OperatorConfig::Unzip {
                name, left, right, ..
            } => Box::new(Unzip::new(name, left, right)),
            OperatorConfig::Expand { name, output, .. } => Box::new(Expand::new(name, output)),
        }
    }
}
