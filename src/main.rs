use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hla_sim::config::{AnalysisConfig, Layout};
use hla_sim::{align, ca, cluster, db, simmat, typing};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "hla-sim",
    author,
    version,
    about = "HLA allele similarity, clustering and correspondence analysis",
    arg_required_else_help = true
)]
struct Cli {
    /// Working directory holding databases/, spreadsheets/ and output/
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,
    /// TOML file overriding analysis parameters
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Worker threads for the similarity matrix (0 = all cores)
    #[arg(short = 't', long, global = true, default_value_t = 0)]
    threads: usize,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build the allele sequence database from the IMGT/HLA downloads
    Retrieve,
    /// Check donor typings against the allele database
    Typecheck,
    /// Compare alleles interactively
    Align,
    /// Compare two alleles once
    Compare {
        first: String,
        second: String,
        /// Save the report and heatmap under output/alignments/<NAME>
        #[arg(short, long, value_name = "NAME")]
        save: Option<String>,
    },
    /// Compute the MHC I and MHC II similarity matrices
    Simmat,
    /// Embed and cluster the similarity matrices
    Cluster,
    /// Correspondence analysis of allele clusters against responses
    Ca,
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let fallback = std::env::var("HLA_SIM_LOG").unwrap_or_else(|_| default.to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&fallback)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.threads > 0 {
        rayon::ThreadPoolBuilder::new()
            .num_threads(cli.threads)
            .build_global()
            .context("cannot initialise the thread pool")?;
    }

    let cfg = AnalysisConfig::load(cli.config.as_deref())?;
    let layout = Layout::new(&cli.root);

    match cli.command {
        Commands::Retrieve => run_retrieve(&layout),
        Commands::Typecheck => run_typecheck(&layout, &cfg),
        Commands::Align => align::run_repl(&layout, &cfg),
        Commands::Compare { first, second, save } => {
            align::run_compare(&layout, &cfg, &first, &second, save.as_deref()).map(|_| ())
        }
        Commands::Simmat => run_simmat(&layout, &cfg),
        Commands::Cluster => {
            cluster::run(&layout, &cfg)?;
            println!("Clustering done. Run `hla-sim ca` to relate the clusters to antigen responses.");
            Ok(())
        }
        Commands::Ca => run_ca(&layout, &cfg),
    }
}

fn run_retrieve(layout: &Layout) -> Result<()> {
    let t0 = std::time::Instant::now();
    let s = db::retrieve(layout)?;
    info!(elapsed_ms = t0.elapsed().as_millis() as u64, "retrieve finished");
    println!(
        "{} groups covering {} alleles, {} sequences read, {} database entries",
        s.groups, s.grouped_alleles, s.sequences_read, s.entries
    );
    println!("HLA database saved to {}", layout.allele_db().display());
    Ok(())
}

fn run_typecheck(layout: &Layout, cfg: &AnalysisConfig) -> Result<()> {
    let issues = typing::check::run(layout, cfg)?;
    for issue in &issues {
        println!("{}\n", issue);
    }
    if issues.is_empty() {
        println!("All alleles were found in the HLA database.");
    } else {
        println!(
            "{} issue(s) written to {}",
            issues.len(),
            layout.output().join("typecheck.txt").display()
        );
    }
    Ok(())
}

fn run_simmat(layout: &Layout, cfg: &AnalysisConfig) -> Result<()> {
    let t0 = std::time::Instant::now();
    let set = simmat::run(layout, cfg)?;
    println!(
        "MHC I: {} alleles, MHC II: {} alleles ({:.1}s)",
        set.mhc_i.len(),
        set.mhc_ii.len(),
        t0.elapsed().as_secs_f64()
    );
    println!("Similarity matrices saved to {}", layout.sim_matrix_dir().display());
    Ok(())
}

fn run_ca(layout: &Layout, cfg: &AnalysisConfig) -> Result<()> {
    let results = ca::run(layout, cfg)?;
    let done = results.iter().filter(|r| r.analysis.is_some()).count();
    println!(
        "Correspondence analysis done for {} of {} response columns. Results are in {}",
        done,
        results.len(),
        layout.output().join("CA").display()
    );
    Ok(())
}
