use clap::{Parser, Subcommand};
use dragonball_bronze::runner::{
    PipelineConfigBuilder, SchemaStatus, ShowTarget, preview, preview_rows, run_pipeline, show,
};
use std::path::PathBuf;

#[derive(Parser, Clone)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Subcommand)]
enum Command {
    /// Load, clean, join and persist the character datasets
    Run {
        /// Lakehouse root directory
        #[arg(short, long, default_value = "lakehouse")]
        lakehouse_root: PathBuf,

        /// Override the stats source (kaggle://owner/dataset/file or a local path)
        #[arg(long)]
        stats_uri: Option<String>,

        /// Override the info source (kaggle://owner/dataset/file or a local path)
        #[arg(long)]
        info_uri: Option<String>,

        /// Show the plan without loading or writing anything
        #[arg(long)]
        dry_run: bool,

        /// Quiet mode - minimal output, only show summary
        #[arg(short, long)]
        quiet: bool,
    },

    /// Print a persisted table
    Show {
        /// Lakehouse root directory
        #[arg(short, long, default_value = "lakehouse")]
        lakehouse_root: PathBuf,

        /// Read a file dataset (e.g. Files/DragonBall/char_info_full) instead of the managed table
        #[arg(short, long)]
        path: Option<String>,

        /// Number of rows to print
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Run {
            lakehouse_root,
            stats_uri,
            info_uri,
            dry_run,
            quiet,
        } => run(lakehouse_root, stats_uri, info_uri, dry_run, quiet).await?,
        Command::Show {
            lakehouse_root,
            path,
            limit,
        } => show_table(lakehouse_root, path, limit).await?,
    }
    Ok(())
}

fn init_tracing(quiet: bool) {
    use tracing_subscriber::{EnvFilter, FmtSubscriber};
    let filter = if quiet {
        EnvFilter::new("dragonball_bronze=warn")
    } else {
        EnvFilter::new("dragonball_bronze=info")
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run(
    lakehouse_root: PathBuf,
    stats_uri: Option<String>,
    info_uri: Option<String>,
    dry_run: bool,
    quiet: bool,
) -> anyhow::Result<()> {
    init_tracing(quiet);

    let mut builder = PipelineConfigBuilder::default();
    builder.lakehouse_root(lakehouse_root);
    if let Some(uri) = stats_uri {
        builder.stats_uri(uri);
    }
    if let Some(uri) = info_uri {
        builder.info_uri(uri);
    }
    let config = builder.build()?;

    if !quiet {
        println!("Dragon Ball Bronze Pipeline");
        println!("===========================");
        println!("Lakehouse: {}", config.lakehouse_root.display());
        println!("Stats: {}", config.stats_uri);
        println!("Info: {}", config.info_uri);
        println!();
    }

    if dry_run {
        println!("DRY RUN MODE - No data will be loaded or written");
        println!();
        println!("Plan:");
        for (idx, step) in config.plan().iter().enumerate() {
            println!("  {}. {}", idx + 1, step);
        }
        println!();
        println!("To execute, run without --dry-run");
        return Ok(());
    }

    let report = run_pipeline(config).await?;

    println!();
    println!("Run Summary");
    println!("===========");
    println!("Run ID: {}", report.run_id);
    println!(
        "Rows loaded: {} across {} tables",
        report.stats.rows_loaded, report.stats.tables_loaded
    );
    println!("Duplicate stats rows removed: {}", report.stats.duplicates_removed);
    println!(
        "Joined rows: {} ({} without stats)",
        report.stats.rows_joined, report.stats.unmatched_rows
    );
    println!(
        "Schema: {}",
        match report.schema_status {
            SchemaStatus::Created => "created",
            SchemaStatus::AlreadyExists => "already existed",
        }
    );
    for (target, version) in &report.stats.commits {
        println!("Wrote {} (version {})", target, version);
    }
    for (stage, duration) in report.stats.stage_totals() {
        println!("  {:<8} {:.2}s", stage, duration.as_secs_f64());
    }
    println!("Duration: {:.2}s", report.duration.as_secs_f64());

    if !quiet {
        println!();
        println!("{}", preview(&report.table));
    }

    Ok(())
}

async fn show_table(lakehouse_root: PathBuf, path: Option<String>, limit: usize) -> anyhow::Result<()> {
    init_tracing(true);

    let target = match path {
        Some(path) => ShowTarget::Path(path),
        None => ShowTarget::default(),
    };
    let table = show(lakehouse_root, &target).await?;

    println!("{}", preview_rows(&table, limit));
    println!("{} rows x {} columns", table.num_rows(), table.num_columns());
    Ok(())
}
