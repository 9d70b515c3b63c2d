//! Sluice CLI - stream rows out of a relational table
//!
//! Records are printed as JSON lines; batches and pages as one JSON object
//! per group.

use clap::{Args, Parser, Subcommand, ValueEnum};
use sluice_rdbc::config::Driver;
use sluice_rdbc::prelude::*;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "sluice")]
#[command(about = "Sluice - stream, batch and paginate rows without loading whole tables")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    source: SourceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct SourceArgs {
    /// YAML configuration file
    #[arg(short, long, env = "SLUICE_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Full connection URL (overrides host/user/password/database)
    #[arg(long, env = "SLUICE_DATABASE_URL")]
    url: Option<String>,

    /// Database driver
    #[arg(long, value_enum)]
    driver: Option<DriverArg>,

    /// Server host
    #[arg(long)]
    host: Option<String>,

    /// Server port
    #[arg(long)]
    port: Option<u16>,

    /// User name
    #[arg(short, long)]
    user: Option<String>,

    /// Password
    #[arg(long, env = "SLUICE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Database name
    #[arg(short, long)]
    database: Option<String>,

    /// Table read by the default query
    #[arg(short, long)]
    table: Option<String>,

    /// Ordering column of the default query
    #[arg(long)]
    order_by: Option<String>,

    /// Custom SQL instead of the default `SELECT *` query
    #[arg(short, long)]
    query: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum DriverArg {
    Mysql,
    Postgres,
}

impl From<DriverArg> for Driver {
    fn from(arg: DriverArg) -> Self {
        match arg {
            DriverArg::Mysql => Driver::Mysql,
            DriverArg::Postgres => Driver::Postgres,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Stream records one at a time
    Stream {
        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<u64>,
    },

    /// Stream records in fixed-size batches
    Batches {
        /// Records per batch (defaults to the configured batch size)
        #[arg(short, long)]
        size: Option<usize>,

        /// Only keep records whose field is above this value
        #[arg(long)]
        above: Option<f64>,

        /// Field compared by --above
        #[arg(long, default_value = "age")]
        field: String,

        /// Hide batches left empty by the filter
        #[arg(long)]
        skip_empty: bool,
    },

    /// Fetch pages lazily with LIMIT/OFFSET
    Paginate {
        /// Records per page (defaults to the configured page size)
        #[arg(short, long)]
        page_size: Option<usize>,

        /// Offset of the first page
        #[arg(long, default_value = "0")]
        start: u64,
    },

    /// Average of a numeric field
    Average {
        /// Field to average
        #[arg(short, long, default_value = "age")]
        field: String,
    },
}

impl SourceArgs {
    /// Load the file configuration, then apply command line overrides
    fn into_config(self) -> anyhow::Result<(SluiceConfig, Option<String>)> {
        let mut config = match &self.config {
            Some(path) => SluiceConfig::from_file(path)?,
            None => SluiceConfig::default(),
        };

        let conn = &mut config.connection;
        if let Some(url) = self.url {
            conn.url = Some(SensitiveString::new(url));
        }
        if let Some(driver) = self.driver {
            conn.driver = driver.into();
        }
        if let Some(host) = self.host {
            conn.host = host;
        }
        if self.port.is_some() {
            conn.port = self.port;
        }
        if let Some(user) = self.user {
            conn.user = user;
        }
        if let Some(password) = self.password {
            conn.password = Some(SensitiveString::new(password));
        }
        if let Some(database) = self.database {
            conn.database = database;
        }
        if let Some(table) = self.table {
            config.table = table;
        }
        if let Some(order_by) = self.order_by {
            config.order_by = Some(order_by);
        }

        config.check()?;
        Ok((config, self.query))
    }
}

fn decoder_for(config: &SluiceConfig) -> RecordDecoder {
    RecordDecoder::passthrough().with_identifier_column(&config.identifier_column)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let (config, custom_sql) = cli.source.into_config()?;

    let connection = config.connection_config()?;
    info!(url = %connection.redacted_url(), table = %config.table, "Connecting");
    let provisioner = Provisioner::from_config(connection)?;
    let query = match custom_sql {
        Some(sql) => Query::new(sql),
        None => config.default_query()?,
    };

    match cli.command {
        Commands::Stream { limit } => {
            let mut stream =
                RecordStream::new(provisioner.clone(), query).with_decoder(decoder_for(&config));
            while let Some(record) = stream.next().await? {
                println!("{}", record.to_json());
                if limit.is_some_and(|l| stream.stats().records >= l) {
                    stream.close();
                }
            }
            info!(records = stream.stats().records, "Stream finished");
        }

        Commands::Batches {
            size,
            above,
            field,
            skip_empty,
        } => {
            let batch_size = size.unwrap_or(config.batch_size);
            let batches = BatchStream::new(provisioner.clone(), query, batch_size)?
                .with_decoder(decoder_for(&config));

            let mut filtered = batches.filter_batches(move |record: &Record| match above {
                Some(min) => record
                    .get_f64(&field)
                    .ok()
                    .flatten()
                    .is_some_and(|v| v > min),
                None => true,
            });
            if skip_empty {
                filtered = filtered.skip_empty();
            }

            while let Some(batch) = filtered.next().await? {
                let records: Vec<_> = batch.records().iter().map(Record::to_json).collect();
                println!(
                    "{}",
                    serde_json::json!({ "batch": batch.index(), "records": records })
                );
            }
            info!(
                batches = filtered.stats().batches,
                records = filtered.stats().records,
                "Batches finished"
            );
        }

        Commands::Paginate { page_size, start } => {
            let page_size = page_size.unwrap_or(config.page_size);
            let mut pages = Paginator::new(provisioner.clone(), query, page_size)?
                .with_decoder(decoder_for(&config))
                .starting_at(start);

            while let Some(page) = pages.next().await? {
                let records: Vec<_> = page.records().iter().map(Record::to_json).collect();
                println!(
                    "{}",
                    serde_json::json!({ "offset": page.offset(), "records": records })
                );
            }
            info!(pages = pages.stats().batches, "Pagination finished");
        }

        Commands::Average { field } => {
            let mean = average(&provisioner, query, &field).await?;
            println!("Average {}: {:.2}", field, mean);
        }
    }

    let stats = provisioner.stats();
    info!(
        acquisitions = stats.acquisitions,
        releases = stats.releases,
        statements = stats.statements,
        "Done"
    );
    Ok(())
}
