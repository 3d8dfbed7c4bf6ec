mod display;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use vigil_core::colors::CatppuccinExt;
use vigil_core::output::{get_formatter, OutputFormat};
use vigil_core::{
    BrandOutcome, Config, Coordinator, DnsResolver, FileProbeBackend, HttpProbeBackend,
    ProbeBackend, Prober, ProxyWorkflow, RedisHealthStore, SshShell,
};

use display::spinner::Spinner;

#[derive(Parser)]
#[command(name = "vigil")]
#[command(about = "Domain health monitor - evaluate, provision and publish replacement domains")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format (human or json)
    #[arg(short, long, default_value = "human")]
    format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitoring loop until Ctrl-C
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },
    /// Evaluate brands now and remediate the degraded ones
    Check {
        /// Brands to check (defaults to every configured brand)
        brands: Vec<String>,
    },
    /// Probe a domain and store the health summary
    Probe {
        /// Brand the domain belongs to
        brand: String,
        /// Domain or URL to probe
        url: String,
        /// Display name stored in the brand index
        #[arg(short, long)]
        name: Option<String>,
        /// Read exported probe rows from <dir>/<host>.json instead of probing
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Number of local requests when probing over HTTP
        #[arg(long, default_value_t = 5)]
        attempts: usize,
    },
    /// Add a domain alias to a brand's reverse-proxy block
    ProxyAdd {
        /// Brand whose block receives the alias
        brand: String,
        /// Domain to add
        domain: String,
    },
    /// Check whether a domain resolves through public DNS
    Verify {
        /// Fully qualified domain name
        fqdn: String,
        /// Address the record should point at
        #[arg(short, long)]
        expect: Option<String>,
        /// Nameserver to query (e.g., @1.1.1.1)
        #[arg(short, long)]
        server: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.command {
        Commands::Run { .. } => "info",
        _ => "warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let output_format: OutputFormat = cli.format.parse().unwrap_or_default();
    if let Err(e) = execute_command(cli.command, output_format).await {
        eprintln!("{} {:#}", "Error:".ctp_red(), e);
        std::process::exit(1);
    }
    Ok(())
}

async fn execute_command(command: Commands, output_format: OutputFormat) -> anyhow::Result<()> {
    let formatter = get_formatter(output_format);

    match command {
        Commands::Run { once } => {
            let config = Config::from_env()?;
            let coordinator = Coordinator::from_config(&config)?;
            if once {
                let report = coordinator.run_cycle(&coordinator.brand_names()).await?;
                println!("{}", formatter.format_cycle(&report));
            } else {
                coordinator.run_forever().await?;
            }
        }
        Commands::Check { brands } => {
            let config = Config::from_env()?;
            let coordinator = Coordinator::from_config(&config)?;
            let brands = if brands.is_empty() {
                coordinator.brand_names()
            } else {
                brands
            };

            let spinner = Spinner::new(&format!("Checking {} brand(s)...", brands.len()));
            let result = coordinator.manual_check(&brands).await;
            spinner.finish();

            let (report, text) = result?;
            match output_format {
                OutputFormat::Human => println!("{}", text),
                OutputFormat::Json => println!("{}", formatter.format_cycle(&report)),
            }

            let failed = report.count(BrandOutcome::Failed) + report.count(BrandOutcome::Unverified);
            if failed > 0 {
                std::process::exit(2);
            }
        }
        Commands::Probe {
            brand,
            url,
            name,
            dir,
            attempts,
        } => {
            let config = Config::from_env()?;
            let store = RedisHealthStore::new(&config.redis_url)?;
            let backend: Arc<dyn ProbeBackend> = match dir {
                Some(dir) => Arc::new(FileProbeBackend::new(dir)),
                None => Arc::new(HttpProbeBackend::new()?.with_attempts(attempts)),
            };
            let prober = Prober::new(backend, Arc::new(store));
            let name = name.unwrap_or_else(|| url.clone());

            let spinner = Spinner::new(&format!("Probing {}...", url));
            let result = prober.probe_and_store(&brand, &url, &name).await;
            spinner.finish();

            match result? {
                Some(summary) => println!("{}", formatter.format_summary(&summary)),
                None => {
                    eprintln!("{} probe returned no data for {}", "Warning:".peach(), url);
                    std::process::exit(2);
                }
            }
        }
        Commands::ProxyAdd { brand, domain } => {
            let config = Config::from_env()?;
            let proxy = config
                .proxy
                .clone()
                .context("reverse proxy is not configured (set CADDY_IP and CADDY_USER)")?;
            let profile = config.brands.get(&brand)?;
            let target_host = profile
                .target_host
                .clone()
                .with_context(|| format!("no target host configured for brand {}", brand))?;
            let domain = vigil_core::normalize_domain(&domain)?;

            let workflow = ProxyWorkflow::new(Arc::new(SshShell::from_config(&proxy)), proxy);
            let spinner = Spinner::new(&format!("Adding {} to {}...", domain, target_host));
            let state = workflow.add_alias(&target_host, &domain).await;
            spinner.finish();

            println!("{}", formatter.format_workflow(&state));
            if !state.success {
                std::process::exit(2);
            }
        }
        Commands::Verify {
            fqdn,
            expect,
            server,
        } => {
            let mut resolver = DnsResolver::new();
            if let Some(server) = server {
                resolver = resolver.with_nameserver(server.trim_start_matches('@'))?;
            }
            let expected = expect
                .map(|ip| ip.parse::<std::net::IpAddr>())
                .transpose()
                .context("invalid --expect address")?;
            let fqdn = vigil_core::normalize_domain(&fqdn)?;

            let check = resolver.verify(&fqdn, expected).await?;
            println!("{}", formatter.format_resolution(&check));
            if !check.matches_expected() {
                std::process::exit(2);
            }
        }
    }

    Ok(())
}
