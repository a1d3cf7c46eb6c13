//! fanout-listener binary entry point.
//!
//! Usage:
//!   fanout-listener --queue <name> [listen] [--once] [--timeout-secs <n>]
//!   fanout-listener --queue <name> publish <body> --nodes <n>
//!
//! Settings are read from `~/.fanout/config.json`, then `FANOUT_*`
//! environment variables, then the flags below.

use clap::{Parser, Subcommand};
use fanout_listener::{
    start_round, CommandSink, Listener, ListenerConfig, ListenerError, ListenerResult, NodeCount,
    Paths, QueueService, SqsQueue, StdoutSink,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

/// Deliver each command on a shared queue to every node of a cluster.
#[derive(Parser, Debug)]
#[command(name = "fanout-listener")]
#[command(about = "Long-poll a queue and fan each command out to every node")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Queue to listen on or publish to.
    #[arg(long, global = true)]
    queue: Option<String>,

    /// Long-poll wait per receive, in seconds (at most 20).
    #[arg(long, global = true)]
    wait_secs: Option<u32>,

    /// Pause after re-reading a command this node already ran, in seconds.
    #[arg(long, global = true)]
    quiescence_secs: Option<u64>,

    /// AWS region.
    #[arg(long, global = true)]
    region: Option<String>,

    /// SQS endpoint URL, e.g. a LocalStack address.
    #[arg(long, global = true)]
    endpoint_url: Option<String>,

    /// Config file (defaults to ~/.fanout/config.json).
    #[arg(long, global = true, env = "FANOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Write JSONL logs to this file instead of stderr.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Wait for commands and print each one on stdout (default).
    Listen {
        /// Exit after the first command.
        #[arg(long)]
        once: bool,

        /// With --once, give up after this many seconds.
        #[arg(long, requires = "once")]
        timeout_secs: Option<u64>,
    },
    /// Start a fan-out round by sending a command for N nodes.
    Publish {
        /// Command body, sent verbatim.
        body: String,

        /// Number of nodes that should receive the command.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        nodes: u32,
    },
}

impl Cli {
    /// Config file, then environment, then these flags.
    fn load_config(&self) -> ListenerResult<ListenerConfig> {
        let config_path = match &self.config {
            Some(path) => path.clone(),
            None => Paths::new()?.config_file(),
        };

        let mut config = ListenerConfig::load(&config_path)?;

        if let Some(queue) = &self.queue {
            config.queue_name = Some(queue.clone());
        }
        if let Some(wait_secs) = self.wait_secs {
            config.wait_secs = wait_secs;
        }
        if let Some(quiescence_secs) = self.quiescence_secs {
            config.quiescence_secs = quiescence_secs;
        }
        if let Some(region) = &self.region {
            config.region = Some(region.clone());
        }
        if let Some(endpoint_url) = &self.endpoint_url {
            config.endpoint_url = Some(endpoint_url.clone());
        }
        if let Some(log_level) = &self.log_level {
            config.log_level = log_level.clone();
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fanout-listener: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = observability::init_with_config(observability::LogConfig {
        service_name: "fanout-listener".into(),
        default_level: config.log_level.clone(),
        log_path: cli.log_file.clone(),
        also_stderr: false,
    }) {
        eprintln!("fanout-listener: failed to initialize logging: {e}");
        return ExitCode::FAILURE;
    }

    let command = cli.command.unwrap_or(Command::Listen {
        once: false,
        timeout_secs: None,
    });

    tokio::select! {
        result = run(command, config) => match result {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                error!(error = %e, fatal = e.is_fatal(), "Listener exited with error");
                eprintln!("fanout-listener: {e}");
                ExitCode::FAILURE
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, exiting...");
            ExitCode::SUCCESS
        }
    }
}

async fn run(command: Command, config: ListenerConfig) -> ListenerResult<()> {
    config.validate()?;
    let queue_name = config.queue_name()?;

    info!(
        queue = %queue_name,
        wait_secs = config.wait_secs,
        quiescence_secs = config.quiescence_secs,
        region = config.region.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    let queue = SqsQueue::connect(&config.sqs_settings()).await;

    match command {
        Command::Listen { once, timeout_secs } => {
            let mut listener = Listener::connect(queue, queue_name, config.poll_settings()).await?;
            let mut sink = StdoutSink;

            if once {
                let total = timeout_secs.map(Duration::from_secs);
                match listener.wait_for_command(total).await? {
                    Some(body) => sink.deliver(&body)?,
                    None => info!("No command received before the timeout"),
                }
                Ok(())
            } else {
                listener.run(&mut sink).await
            }
        }
        Command::Publish { body, nodes } => {
            let nodes = NodeCount::new(nodes).ok_or_else(|| {
                ListenerError::Config("--nodes must be greater than zero".to_string())
            })?;
            let endpoint = queue.resolve(queue_name).await?;
            start_round(&queue, &endpoint, &body, nodes).await
        }
    }
}
