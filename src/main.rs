use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use fraud_rings::{Pipeline, PipelineConfig, PipelineOutput, RingScenario, load_graph, write_records};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "fraud-rings")]
#[command(about = "Detect collusive fraud rings in transaction graphs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a synthetic transaction feed with one planted ring
    Simulate {
        #[arg(short, long, default_value = "sim_transactions.csv")]
        out: PathBuf,

        #[arg(short, long, default_value = "0")]
        seed: u64,
    },

    /// Detect and rank suspicious communities
    Analyze {
        /// CSV with timestamp,sender,receiver,amount[,device_id,ip,instrument_id]
        #[arg(short, long)]
        transactions: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of communities to print
        #[arg(long)]
        top: Option<usize>,

        /// Ignore device, IP and instrument columns
        #[arg(long)]
        no_id_links: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match Cli::parse().command {
        Commands::Simulate { out, seed } => {
            let data = RingScenario::with_seed(seed).generate();
            write_records(&out, &data.records)
                .with_context(|| format!("writing {}", out.display()))?;
            info!(rows = data.records.len(), path = %out.display(), "wrote simulated transactions");
            println!(
                "Ring accounts: {}",
                data.ring_accounts.iter().cloned().collect::<Vec<_>>().join(", ")
            );
        }
        Commands::Analyze {
            transactions,
            config,
            top,
            no_id_links,
        } => {
            let mut config = match config {
                Some(path) => PipelineConfig::from_file(&path)
                    .with_context(|| format!("loading config {}", path.display()))?,
                None => PipelineConfig::default(),
            };
            if no_id_links {
                config.graph.include_id_links = false;
            }
            if let Some(top) = top {
                config.report.top = top;
            }

            let graph = load_graph(&transactions, config.graph.include_id_links)
                .with_context(|| format!("loading {}", transactions.display()))?;
            let top = config.report.top;
            let output = Pipeline::new(config).analyze(graph)?;
            print_summary(&output, top);
        }
    }

    Ok(())
}

fn print_summary(output: &PipelineOutput, top: usize) {
    println!(
        "Detected {} communities (modularity {:.3}) in {} nodes / {} edges",
        output.detection.communities.len(),
        output.detection.modularity,
        output.graph.node_count(),
        output.graph.edge_count()
    );
    for warning in &output.warnings {
        println!("warning: {warning}");
    }

    let rows: Vec<(f64, Option<f64>, &fraud_rings::Community)> = match &output.classified {
        Some(classified) => classified
            .iter()
            .map(|c| (c.heuristic_score, Some(c.probability), &c.community))
            .collect(),
        None => output
            .ranked
            .iter()
            .map(|s| (s.heuristic_score, None, &s.community))
            .collect(),
    };

    for (rank, (score, probability, community)) in rows.iter().take(top).enumerate() {
        let kinds = output.graph.kind_counts(community.members());
        let probability = probability.map_or_else(String::new, |p| format!(", fraud prob {p:.3}"));
        println!(
            "Community {} (heuristic {:.3}{}) accounts={} devices={} ips={} instruments={}",
            rank + 1,
            score,
            probability,
            kinds.accounts,
            kinds.devices,
            kinds.ips,
            kinds.instruments
        );
    }

    println!("Top hubs:");
    for (id, score) in output.top_hubs(5) {
        println!("  {id} {score:.4}");
    }
}
