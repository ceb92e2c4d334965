use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use zinnia_config::ProcessDef;
use zinnia_engine::{
  ChannelNotifier, DefinitionRef, Engine, EngineConfig, ExecutableProcess, PartitionRunner, Trigger,
};

/// Zinnia - a process engine core
#[derive(Parser)]
#[command(name = "zinnia")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Log engine internals at debug level
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
  /// Check that a process definition is executable
  Validate {
    /// Path to the process definition (JSON)
    definition: PathBuf,
  },

  /// Run triggers against a process definition and print the records
  Run {
    /// Path to the process definition (JSON)
    definition: PathBuf,

    /// JSON array of triggers. Read from stdin when omitted; with no input a
    /// single instance is started.
    #[arg(long)]
    triggers: Option<PathBuf>,

    /// Partition id encoded into every key
    #[arg(long, default_value_t = 1)]
    partition_id: u16,

    /// Upper bound on commands per trigger
    #[arg(long)]
    max_commands: Option<usize>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.verbose);

  match cli.command {
    Some(Commands::Validate { definition }) => validate(&definition)?,
    Some(Commands::Run {
      definition,
      triggers,
      partition_id,
      max_commands,
    }) => {
      let mut config = EngineConfig::for_partition(partition_id);
      if let Some(max_commands) = max_commands {
        config.max_commands_per_step = max_commands;
      }
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(async { run(&definition, triggers.as_deref(), config).await })?;
    }
    None => {
      println!("zinnia - use --help to see available commands");
    }
  }

  Ok(())
}

/// Logs go to stderr; stdout carries records.
fn init_tracing(verbose: bool) {
  use tracing_subscriber::prelude::*;

  let filter = if verbose {
    "zinnia=debug,zinnia_engine=debug,warn"
  } else {
    "zinnia=info,zinnia_engine=info,warn"
  };
  tracing_subscriber::registry()
    .with(
      tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_filter(
          tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        ),
    )
    .init();
}

fn load_process(path: &Path) -> Result<ExecutableProcess> {
  let content = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read process definition: {}", path.display()))?;
  let def: ProcessDef = serde_json::from_str(&content)
    .with_context(|| format!("failed to parse process definition: {}", path.display()))?;
  ExecutableProcess::from_def(def)
    .with_context(|| format!("invalid process definition: {}", path.display()))
}

fn validate(path: &Path) -> Result<()> {
  let process = load_process(path)?;
  println!(
    "{} (version {}): {} elements, valid",
    process.process_id,
    process.version,
    process.element_count()
  );
  Ok(())
}

async fn run(path: &Path, triggers: Option<&Path>, config: EngineConfig) -> Result<()> {
  let process = load_process(path)?;
  let mut engine = Engine::new(config).context("invalid engine configuration")?;
  let definition = engine.deploy(process);
  let triggers = read_triggers(triggers, &definition)?;
  tracing::info!(triggers = triggers.len(), "submitting triggers");

  let (record_tx, mut record_rx) = mpsc::unbounded_channel();
  let runner = PartitionRunner::with_notifier(engine, ChannelNotifier::new(record_tx));
  let sender = runner.sender();
  let handle = tokio::spawn(runner.start(CancellationToken::new()));

  for trigger in triggers {
    sender
      .send(trigger)
      .await
      .context("partition runner stopped early")?;
  }
  drop(sender);

  let engine = handle.await.context("partition runner failed")?;
  while let Some(record) = record_rx.recv().await {
    println!("{}", serde_json::to_string(&record)?);
  }

  eprintln!("Live instances: {}", engine.instance_count());
  Ok(())
}

fn read_triggers(path: Option<&Path>, definition: &DefinitionRef) -> Result<Vec<Trigger>> {
  let input = match path {
    Some(path) => std::fs::read_to_string(path)
      .with_context(|| format!("failed to read triggers: {}", path.display()))?,
    None => read_stdin()?,
  };

  if input.trim().is_empty() {
    return Ok(vec![Trigger::StartInstance {
      definition: definition.clone(),
      variables: Default::default(),
    }]);
  }
  serde_json::from_str(&input).context("failed to parse triggers JSON")
}

fn read_stdin() -> Result<String> {
  use std::io::IsTerminal;

  let mut input = String::new();
  if !io::stdin().is_terminal() {
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read triggers from stdin")?;
  }
  Ok(input)
}
