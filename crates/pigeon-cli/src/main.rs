//! pigeonctl - stuck-queue inspection and remediation
//!
//! Usage:
//!   pigeonctl list --namespace NevecTW     # show stuck queues
//!   pigeonctl skip --queue <q> --message <id|all>
//!   pigeonctl namespaces                   # known namespaces

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use reqwest::Client;
use serde_json::json;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pigeon_core::config::{Endpoints, Environment, FileConfig, Settings};
use pigeon_core::credentials;
use pigeon_core::fleet::{self, Target};
use pigeon_core::skip::{self, SkipReport};
use pigeon_core::status::{self, SubscriptionStatus, TargetStatus};
use pigeon_core::transport;

const LONG_ABOUT: &str = "\
Inspect and discard stuck messages across the pigeon broker fleet.

Examples:
  pigeonctl list --namespace NevecTW
  pigeonctl list --namespace all
  pigeonctl skip --queue CQI.prod.q::CQO.prod.q.sub --message d925d129__0895
  pigeonctl skip --queue CQI.prod.q::CQO.prod.q.sub --message all

Add --int to operate on the staging fleet:
  pigeonctl --int list --namespace all";

#[derive(Parser)]
#[command(name = "pigeonctl")]
#[command(about = "pigeon queue management", long_about = LONG_ABOUT)]
struct Cli {
    /// Verbose progress logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Administrative role used to mint the role certificate
    #[arg(short, long, global = true)]
    role: Option<String>,

    /// Path to the PKI key file (autodetected when omitted)
    #[arg(short, long, global = true)]
    key: Option<PathBuf>,

    /// Path to the PKI certificate file (autodetected when omitted)
    #[arg(short, long, global = true)]
    certificate: Option<PathBuf>,

    /// Operate on the staging (int) fleet
    #[arg(short = 'i', long = "int", global = true)]
    staging: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show stuck queues across the fleet
    List {
        /// Namespace to show, or "all"
        #[arg(short, long)]
        namespace: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// Skip one message of a queue, or all stuck messages of a queue
    Skip {
        /// Subscription name identifying the queue
        #[arg(short, long)]
        queue: String,

        /// Message identifier, or "all"
        #[arg(short, long)]
        message: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        format: OutputFormat,
    },

    /// List the namespaces the fleet serves
    #[command(alias = "ns-list")]
    Namespaces,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable lines
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

const NAMESPACES: [&str; 9] = [
    "AdpostTW",
    "AuctionsHK",
    "AuctionsTW",
    "BillingTW",
    "DataMiningTW",
    "ECCentralTech",
    "NevecTW",
    "ShoppingMall",
    "Store-TW",
];

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Namespaces => {
            for namespace in NAMESPACES {
                println!("{namespace}");
            }
            Ok(())
        }
        Commands::List { namespace, format } => {
            let session = Session::establish(&cli)?;
            run_list(&session, namespace, *format).await
        }
        Commands::Skip {
            queue,
            message,
            format,
        } => {
            let session = Session::establish(&cli)?;
            run_skip(&session, queue, message, *format).await
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "pigeon_core=debug,pigeon_cli=debug,info"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Resolved configuration plus the two authenticated clients: the identity
/// client talks to the directory, the role-certificate client to brokers.
struct Session {
    settings: Settings,
    endpoints: Endpoints,
    identity_client: Client,
    role_client: Client,
}

impl Session {
    fn establish(cli: &Cli) -> Result<Session> {
        let file = FileConfig::load_default().context("loading config file")?;
        let environment = if cli.staging {
            Environment::Staging
        } else {
            Environment::Production
        };

        let mut settings = Settings::new(environment);
        if let Some(role) = &file.role {
            settings = settings.with_role(role.as_str());
        }
        if let Some(marker) = &file.tail_marker {
            settings = settings.with_tail_marker(marker.as_str());
        }
        if let Some(role) = &cli.role {
            settings = settings.with_role(role.as_str());
        }
        if let (Some(key), Some(cert)) = (&cli.key, &cli.certificate) {
            settings = settings.with_key_cert_override(key.clone(), cert.clone());
        }

        let mut endpoints = Endpoints::for_environment(environment);
        if let Some(raw) = &file.directory_url {
            endpoints = endpoints.with_directory_url(raw)?;
        }

        let identity =
            credentials::detect_identity(&settings).context("detecting client identity")?;
        let role_cert = credentials::acquire_role_cert(&settings, &identity)
            .context("acquiring role certificate")?;
        let identity_client =
            transport::build_client(&identity).context("building identity client")?;
        let role_client = transport::build_client(&identity.with_cert(role_cert))
            .context("building role-certificate client")?;

        Ok(Session {
            settings,
            endpoints,
            identity_client,
            role_client,
        })
    }

    async fn eligible_targets(&self) -> Result<Vec<Target>> {
        let targets = fleet::eligible_targets(
            &self.identity_client,
            &self.endpoints,
            &self.settings.tail_marker,
        )
        .await
        .context("looking up fleet membership")?;
        Ok(targets)
    }
}

async fn run_list(session: &Session, namespace: &str, format: OutputFormat) -> Result<()> {
    let targets = session.eligible_targets().await?;
    let mut statuses = status::collect_status(&session.role_client, &targets).await;
    statuses.sort_by(|a, b| a.target.host().cmp(b.target.host()));

    match format {
        OutputFormat::Table => print_status_table(&statuses, namespace),
        OutputFormat::Json => print_status_json(&statuses, namespace)?,
    }
    Ok(())
}

fn matches_namespace(sub: &SubscriptionStatus, namespace: &str) -> bool {
    sub.has_stuck_messages() && (namespace == "all" || sub.property == namespace)
}

fn print_status_table(statuses: &[TargetStatus], namespace: &str) {
    let mut matched = 0usize;
    let mut unreachable = 0usize;

    for status in statuses {
        match &status.result {
            Ok(broker) => {
                for sub in &broker.queue_report.subscriptions {
                    if !matches_namespace(sub, namespace) {
                        continue;
                    }
                    matched += 1;
                    println!();
                    println!(
                        "{} {} {}",
                        status.target.host(),
                        sub.property,
                        sub.subscription_name
                    );
                    for id in &sub.old_messages {
                        println!("{id}");
                    }
                }
            }
            Err(err) => {
                unreachable += 1;
                eprintln!("{} unreachable: {err}", status.target.host());
            }
        }
    }

    if matched == 0 {
        println!(
            "No stuck messages for namespace '{namespace}' on {} reachable broker(s).",
            statuses.len() - unreachable
        );
    }
}

fn print_status_json(statuses: &[TargetStatus], namespace: &str) -> Result<()> {
    let entries: Vec<_> = statuses
        .iter()
        .map(|status| match &status.result {
            Ok(broker) => {
                let subscriptions: Vec<_> = broker
                    .queue_report
                    .subscriptions
                    .iter()
                    .filter(|sub| matches_namespace(sub, namespace))
                    .collect();
                json!({
                    "host": status.target.host(),
                    "subscriptions": subscriptions,
                })
            }
            Err(err) => json!({
                "host": status.target.host(),
                "error": err.to_string(),
            }),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

async fn run_skip(session: &Session, queue: &str, message: &str, format: OutputFormat) -> Result<()> {
    let targets = session.eligible_targets().await?;
    let mut report = if message == skip::SKIP_ALL {
        skip::skip_all(&session.role_client, &targets, queue).await
    } else {
        skip::skip_one(&session.role_client, &targets, queue, message).await
    };
    report
        .outcomes
        .sort_by(|a, b| (&a.host, &a.message_id).cmp(&(&b.host, &b.message_id)));

    match format {
        OutputFormat::Table => print_skip_table(&report),
        OutputFormat::Json => print_skip_json(&report)?,
    }
    Ok(())
}

fn print_skip_table(report: &SkipReport) {
    for outcome in &report.outcomes {
        match &outcome.result {
            Ok(()) => println!("skipped {} on {}", outcome.message_id, outcome.host),
            Err(err) => println!(
                "failed to skip {} on {}: {err}",
                outcome.message_id, outcome.host
            ),
        }
    }
    for failure in &report.unreachable {
        eprintln!("{} unreachable: {}", failure.host, failure.error);
    }

    let skipped = report.outcomes.len() - report.failed_count();
    println!(
        "{skipped} skipped, {} failed, {} broker(s) unreachable",
        report.failed_count(),
        report.unreachable.len()
    );
}

fn print_skip_json(report: &SkipReport) -> Result<()> {
    let output = json!({
        "outcomes": report
            .outcomes
            .iter()
            .map(|o| json!({
                "host": o.host,
                "messageId": o.message_id,
                "skipped": o.succeeded(),
                "error": o.result.as_ref().err().map(|e| e.to_string()),
            }))
            .collect::<Vec<_>>(),
        "unreachable": report
            .unreachable
            .iter()
            .map(|f| json!({ "host": f.host, "error": f.error.to_string() }))
            .collect::<Vec<_>>(),
    });

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
