use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use cinder_api::{ClusterApi, FixtureApi, RegistryApi};
use cinder_core::config::{ClusterConfig, Config, SchemaRegistryConfig};
use cinder_fetch::Fetcher;
use cinder_tui::{render, Connector, Page, PageBody, Ui};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod shell;
mod surface;

use shell::Command;
use surface::StdoutSurface;

#[derive(Parser, Debug)]
#[command(name = "cinderctl", version, about = "Cinder Kafka browser (line mode)")]
struct Cli {
    /// Config file (default: $CINDER_CONFIG or ~/.config/cinder/config.yaml)
    #[arg(long = "config", global = true)]
    config: Option<PathBuf>,

    /// Directory of JSON fixtures named `<cluster>.json` / `<registry>.json`
    #[arg(long = "fixtures", env = "CINDER_FIXTURES", global = true)]
    fixtures: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Resource {
    Info,
    Nodes,
    Topics,
    Topic,
    Groups,
    Group,
    Subjects,
    Versions,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive shell (default)
    Shell,
    /// Fetch one resource from the selected cluster and print it
    Get {
        #[arg(value_enum)]
        resource: Resource,
        /// Topic, group or subject name
        name: Option<String>,
        /// Cluster to use instead of the selected one
        #[arg(long = "cluster")]
        cluster: Option<String>,
    },
}

fn init_tracing() {
    let env = std::env::var("CINDER_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("CINDER_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            warn!(addr = %addr, "invalid CINDER_METRICS_ADDR; expected host:port");
        }
    }
}

/// Offline providers read from a fixture directory.
struct FixtureConnector {
    dir: PathBuf,
}

impl FixtureConnector {
    fn load(&self, name: &str) -> Result<FixtureApi> {
        let path = self.dir.join(format!("{name}.json"));
        FixtureApi::from_file(name, &path)
    }
}

impl Connector for FixtureConnector {
    fn cluster(&self, cfg: &ClusterConfig) -> Result<Arc<dyn ClusterApi>> {
        Ok(Arc::new(self.load(&cfg.name)?))
    }

    fn registry(&self, cfg: &SchemaRegistryConfig) -> Result<Arc<dyn RegistryApi>> {
        Ok(Arc::new(self.load(&cfg.name)?))
    }
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => Config::default_path().context("no config path: set CINDER_CONFIG or HOME")?,
    };
    Config::load(&path)
}

fn print_page(page: &Page) {
    println!("── {}", page.title);
    match &page.body {
        PageBody::Table { header, rows } => {
            println!("{}", header.join("\t"));
            for row in rows {
                println!("{}", row.join("\t"));
            }
        }
        PageBody::Text(text) => print!("{text}"),
    }
}

async fn get(config: Config, connector: FixtureConnector, resource: Resource, name: Option<String>, cluster: Option<String>) -> Result<()> {
    let cfg = match cluster.as_deref() {
        Some(n) => config.cluster(n).with_context(|| format!("unknown cluster {n}"))?,
        None => config.selected_cluster().context("no clusters configured")?,
    };
    let api = connector.cluster(cfg)?;
    let registry = match config.selected_registry() {
        Some(r) => Some(connector.registry(r)?),
        None => None,
    };
    let registry_name = config.selected_registry().map(|r| r.name.clone()).unwrap_or_default();
    let fetcher = Fetcher::new(api, config.api_timeout(), CancellationToken::new()).with_registry(registry);
    let need = |what: &str| name.clone().with_context(|| format!("{what} name required"));
    let t0 = std::time::Instant::now();
    let page = match resource {
        Resource::Info => render::cluster(&fetcher.describe_cluster().await?),
        Resource::Nodes => render::nodes(&cfg.name, &fetcher.list_nodes().await?),
        Resource::Topics => render::topics(&cfg.name, &fetcher.list_topics().await?),
        Resource::Topic => render::topic(&fetcher.describe_topic(&need("topic")?).await?),
        Resource::Groups => render::consumer_groups(&cfg.name, &fetcher.list_consumer_groups().await?),
        Resource::Group => render::consumer_group(&fetcher.describe_consumer_group(&need("group")?).await?),
        Resource::Subjects => render::subjects(&registry_name, &fetcher.list_subjects().await?),
        Resource::Versions => {
            let subject = need("subject")?;
            render::versions(&subject, &fetcher.list_versions(&subject).await?)
        }
    };
    info!(took_ms = %t0.elapsed().as_millis(), ?resource, "get ok");
    print_page(&page);
    Ok(())
}

fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(l) => {
                    if tx.send(l).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

/// Returns false on quit.
fn run_command(ui: &mut Ui, picker: &surface::Picker, cmd: Command) -> bool {
    match cmd {
        Command::Open(kind) => ui.open(kind),
        Command::Use(name) => match ui.context().select_cluster(&name) {
            Ok(()) => {
                ui.context().status().send_default_ttl(format!("selected cluster {name}"));
                ui.dispatcher().request(cinder_tui::EventKind::Clusters, true);
            }
            Err(e) => ui.context().status().error(format!("failed to select cluster {name}: {e:#}")),
        },
        Command::Select(row) => {
            if let Ok(mut rows) = picker.lock() {
                match rows.select(row) {
                    Ok(cell) => println!("selected {cell}"),
                    Err(e) => eprintln!("{e}"),
                }
            }
        }
        Command::Enter => ui.activate(),
        Command::Back => ui.backward(),
        Command::Forward => ui.forward(),
        Command::Close => ui.close_current(),
        Command::Refresh => ui.refresh(),
        Command::Filter(q) => ui.filter(&q),
        Command::Pages => ui.show_opened_pages(),
        Command::History => ui.show_status_history(),
        Command::Help => println!("{}", shell::HELP),
        Command::Quit => return false,
    }
    true
}

async fn run_shell(config: Config, connector: FixtureConnector) -> Result<()> {
    let cancel = CancellationToken::new();
    let picker = surface::Picker::default();
    let mut ui = cinder_tui::start(
        config,
        Arc::new(connector),
        Box::new(StdoutSurface::new(picker.clone())),
        cancel.clone(),
    );
    let mut lines = spawn_stdin_reader();
    let mut frame = tokio::time::interval(Duration::from_millis(50));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.recv() => {
                let Some(line) = line else { break };
                match shell::parse(&line) {
                    Ok(cmd) => {
                        if !run_command(&mut ui, &picker, cmd) {
                            break;
                        }
                    }
                    Err(e) if e.is_empty() => {}
                    Err(e) => eprintln!("{e}"),
                }
            }
            _ = frame.tick() => {}
        }
        ui.drain();
    }
    cancel.cancel();
    info!("shell stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let connector = FixtureConnector { dir: cli.fixtures };

    match cli.command.unwrap_or(Commands::Shell) {
        Commands::Shell => run_shell(config, connector).await,
        Commands::Get { resource, name, cluster } => get(config, connector, resource, name, cluster).await,
    }
}
