//! CLI for the valuefs value store.
//!
//! Starts a store, prunes it periodically and on Ctrl-C, and serves a small
//! line-oriented shell over the filesystem view on stdin.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing_subscriber::EnvFilter;
use valuefs::fs::ValueFs;
use valuefs::path::{parse_duration, parse_latest_path};
use valuefs::sink::{JsonLinesSink, WriterSink, read_last_values};
use valuefs::{SampleSink, Store, ValueFsConfig};

/// valuefs: named numeric values with windowed reads, as files.
#[derive(Parser)]
#[command(name = "valuefs", version, about)]
struct Cli {
    /// JSON config file. Flags override its values.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of values to hold in memory.
    #[arg(long)]
    values: Option<usize>,

    /// Delay between writes to the sink (e.g. "1m", "30s").
    #[arg(long, value_parser = parse_delay)]
    write_delay: Option<Duration>,

    /// Capacity of the store's request queue.
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// Where pruned values are written. Defaults to stderr so that sink
    /// lines stay apart from shell output on stdout.
    #[arg(long, value_enum, default_value = "stderr")]
    sink: SinkKind,

    /// Output file for the `jsonl` sink.
    #[arg(long)]
    sink_path: Option<PathBuf>,

    /// JSON-lines file to restore last values from at startup.
    #[arg(long)]
    restore: Option<PathBuf>,
}

/// Persistence sink selection.
#[derive(Clone, Copy, ValueEnum)]
enum SinkKind {
    /// Keep values in memory only.
    None,
    /// Print `name<TAB>time<TAB>value` lines to stderr.
    Stderr,
    /// Print `name<TAB>time<TAB>value` lines to stdout, interleaved with
    /// shell output.
    Stdout,
    /// Append JSON lines to `--sink-path`.
    Jsonl,
}

fn parse_delay(s: &str) -> Result<Duration, String> {
    parse_duration(s).ok_or_else(|| format!("invalid duration '{s}'"))
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

/// Merges the config file with command-line overrides.
fn load_config(cli: &Cli) -> Result<ValueFsConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => ValueFsConfig::from_json_file(path)?,
        None => ValueFsConfig::default(),
    };
    if let Some(values) = cli.values {
        config.store.memory_values = values;
    }
    if let Some(capacity) = cli.queue_capacity {
        config.store.queue_capacity = capacity;
    }
    if let Some(delay) = cli.write_delay {
        config.write_delay = delay;
    }
    config.validate()?;
    Ok(config)
}

fn open_sink(
    kind: SinkKind,
    path: Option<&Path>,
) -> Result<Option<Box<dyn SampleSink>>, Box<dyn std::error::Error>> {
    let sink: Box<dyn SampleSink> = match kind {
        SinkKind::None => return Ok(None),
        SinkKind::Stderr => Box::new(WriterSink::stderr()),
        SinkKind::Stdout => Box::new(WriterSink::stdout()),
        SinkKind::Jsonl => {
            let path = path.ok_or("--sink jsonl requires --sink-path")?;
            Box::new(JsonLinesSink::open(path)?)
        }
    };
    Ok(Some(sink))
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(&cli)?;

    let mut builder = Store::builder(config.store.clone());
    if let Some(sink) = open_sink(cli.sink, cli.sink_path.as_deref())? {
        builder = builder.sink(sink);
    }
    if let Some(path) = &cli.restore {
        let restored = read_last_values(path)?;
        tracing::info!(path = %path.display(), count = restored.len(), "restoring values");
        builder = builder.restore(restored);
    }
    let store = builder.spawn()?;

    tracing::info!(
        memory_values = config.store.memory_values,
        write_delay = ?config.write_delay,
        "valuefs started"
    );

    let pruner = spawn_pruner(store.clone(), config.write_delay);
    let interrupts = spawn_interrupt_handler(store.clone());

    let fs = ValueFs::new(store.clone());
    let shell_result = shell(&fs).await;

    pruner.abort();
    interrupts.abort();
    let at = store.shutdown().await?;
    tracing::info!(at, "valuefs stopped");

    shell_result
}

/// Prunes every `delay` until the store closes.
fn spawn_pruner(store: Store, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(delay);
        // The first tick completes immediately.
        interval.tick().await;
        loop {
            interval.tick().await;
            match store.prune().await {
                Ok(report) => tracing::debug!(?report, "periodic prune"),
                Err(_) => return,
            }
        }
    })
}

/// Prunes on every Ctrl-C.
fn spawn_interrupt_handler(store: Store) -> JoinHandle<()> {
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("signal: interrupt");
            if store.prune().await.is_err() {
                return;
            }
        }
    })
}

/// A parsed shell line.
#[derive(Debug, PartialEq)]
enum Command {
    Ls,
    Cat(String),
    Stat(Option<String>),
    Touch(String),
    Write(String, String),
    Rm(String),
    Prune,
    Help,
    Quit,
}

impl Command {
    fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let mut arg = |usage: &str| {
            words
                .next()
                .map(str::to_string)
                .ok_or_else(|| format!("usage: {usage}"))
        };

        let command = match verb {
            "ls" => Self::Ls,
            "cat" => Self::Cat(arg("cat <name>")?),
            "stat" => Self::Stat(arg("stat [name]").ok()),
            "touch" => Self::Touch(arg("touch <name>")?),
            "write" => {
                let name = arg("write <name> <value>")?;
                Self::Write(name, arg("write <name> <value>")?)
            }
            "rm" => Self::Rm(arg("rm <name>")?),
            "prune" => Self::Prune,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(format!("unknown command '{other}', try 'help'")),
        };
        Ok(Some(command))
    }
}

const HELP: &str = "\
commands:
  ls                   list series
  cat <name>           print a value, e.g. cat cpu, cat cpu#5m
  stat [name]          print attributes as JSON
  touch <name>         create a series
  write <name> <value> write a value
  rm <name>            delete a series
  prune                write pending values and evict
  quit                 exit";

/// Reads commands from stdin until `quit` or end of input.
async fn shell(fs: &ValueFs) -> Result<(), Box<dyn std::error::Error>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(message) => {
                eprintln!("{message}");
                continue;
            }
        };
        if command == Command::Quit {
            break;
        }
        if let Err(e) = execute(fs, command).await {
            eprintln!("Error: {e}");
        }
    }
    Ok(())
}

async fn execute(fs: &ValueFs, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Ls => {
            for entry in fs.read_dir().await? {
                println!("{}\t{}", entry.inode, entry.name);
            }
        }
        Command::Cat(name) => {
            let mut file = fs.lookup(&name).await?;
            fs.attr(&mut file).await?;
            print!("{}", String::from_utf8_lossy(fs.read(&file)));
        }
        Command::Stat(None) => {
            println!("{}", serde_json::to_string(&fs.root_attr())?);
        }
        Command::Stat(Some(name)) => {
            let mut file = fs.lookup(&name).await?;
            let attr = fs.attr(&mut file).await?;
            println!("{}", serde_json::to_string(&attr)?);
        }
        Command::Touch(name) => {
            fs.create(&name).await?;
        }
        Command::Write(name, value) => {
            let mut file = if parse_latest_path(&name).is_some() {
                fs.create(&name).await?
            } else {
                fs.lookup(&name).await?
            };
            fs.write(&mut file, 0, value.as_bytes()).await?;
        }
        Command::Rm(name) => {
            fs.remove(&name).await?;
        }
        Command::Prune => {
            let report = fs.store().prune().await?;
            println!(
                "written {} pending {} evicted {} dropped {} remaining {}",
                report.written,
                report.pending,
                report.evicted,
                report.dropped_unwritten,
                report.remaining
            );
        }
        Command::Help => println!("{HELP}"),
        Command::Quit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(Command::parse("  ls ").unwrap(), Some(Command::Ls));
        assert_eq!(
            Command::parse("cat cpu#5m").unwrap(),
            Some(Command::Cat("cpu#5m".to_string()))
        );
        assert_eq!(Command::parse("stat").unwrap(), Some(Command::Stat(None)));
        assert_eq!(
            Command::parse("write cpu 4.5").unwrap(),
            Some(Command::Write("cpu".to_string(), "4.5".to_string()))
        );
        assert_eq!(Command::parse("exit").unwrap(), Some(Command::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Command::parse("cat").is_err());
        assert!(Command::parse("write cpu").is_err());
        assert!(Command::parse("mount /tmp").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from(["valuefs", "--values", "7", "--write-delay", "30s"]);
        let config = load_config(&cli).unwrap();
        assert_eq!(config.store.memory_values, 7);
        assert_eq!(config.write_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_sink_defaults_to_stderr() {
        let cli = Cli::parse_from(["valuefs"]);
        assert!(matches!(cli.sink, SinkKind::Stderr));

        let cli = Cli::parse_from(["valuefs", "--sink", "stdout"]);
        assert!(matches!(cli.sink, SinkKind::Stdout));
        assert!(open_sink(cli.sink, None).unwrap().is_some());
    }

    #[test]
    fn test_invalid_flags() {
        let cli = Cli::parse_from(["valuefs", "--queue-capacity", "0"]);
        assert!(load_config(&cli).is_err());

        assert!(Cli::try_parse_from(["valuefs", "--write-delay", "soon"]).is_err());
        assert!(open_sink(SinkKind::Jsonl, None).is_err());
    }
}
