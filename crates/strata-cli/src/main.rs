use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser, Debug)]
#[command(name = "strata", version, about = "Publish and inspect SQL-backed audit events")]
struct Cli {
    /// Path to the strata configuration file
    #[arg(long, short, default_value = "strata.yaml", env = "STRATA_CONFIG")]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish JSON-lines events to a topic, then shut down (flushing buffered writes).
    Publish {
        topic: String,

        /// File with one JSON event per line. Reads stdin when omitted.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Check each event against the topic's JSON schema and skip the ones that fail
        #[arg(long, default_value_t = false)]
        validate: bool,
    },

    /// Print one stored event.
    Read { topic: String, id: String },

    /// Query stored events of a topic, one JSON object per line.
    Query {
        topic: String,

        /// Equality filter on an event field, as `field=value`. Repeatable; all must match.
        #[arg(long = "filter-eq", value_name = "FIELD=VALUE")]
        filter_eq: Vec<String>,

        /// Sort key, `+field` (ascending) or `-field` (descending). Repeatable.
        #[arg(long)]
        sort: Vec<String>,

        #[arg(long)]
        page_size: Option<u32>,

        #[arg(long, default_value_t = 0)]
        offset: u32,
    },

    /// Check the configuration: mappings, schemas, dialect and buffering settings.
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.cmd {
        Command::Publish {
            topic,
            file,
            validate,
        } => commands::events::publish(&cli.config, &topic, file.as_deref(), validate).await?,

        Command::Read { topic, id } => commands::events::read(&cli.config, &topic, &id).await?,

        Command::Query {
            topic,
            filter_eq,
            sort,
            page_size,
            offset,
        } => {
            let request = commands::events::query_request(&filter_eq, &sort, page_size, offset)?;
            commands::events::query(&cli.config, &topic, &request).await?
        }

        Command::Validate => commands::check::run(&cli.config)?,
    }

    Ok(())
}
