//! qspec: compile or run query specs
//!
//! # Usage
//!
//! ```bash
//! # Compile an inline spec to SQL
//! qspec --schema shop.qs compile --from customers --from orders \
//!     --select customers.name --agg "SUM(orders.total)" --group customers.name
//!
//! # Run a spec file over local snapshots
//! qspec --schema shop.json run --spec report.json --data snapshots.json
//!
//! # Pull a schema from PostgreSQL
//! qspec --database-url postgres://localhost/shop schema --pull -o shop.json
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use colored::*;
use qspec::parser;
use qspec::prelude::*;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "qspec")]
#[command(author = "qspec Contributors")]
#[command(version)]
#[command(about = "Compile query specs to SQL or run them over snapshots", long_about = None)]
#[command(after_help = "EXAMPLES:
    qspec --schema shop.qs compile --from customers --select customers.name
    qspec --schema shop.json run --spec report.json --data snapshots.json
    qspec --schema shop.json joins --from customers --from orders
    qspec schema --pull --schema-name public -o shop.json")]
struct Cli {
    /// Schema file (JSON or text)
    #[arg(short, long, global = true)]
    schema: Option<PathBuf>,

    /// Config file (defaults to <config dir>/qspec/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database connection URL
    #[arg(long, global = true, env = "QSPEC_DATABASE_URL")]
    database_url: Option<String>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a spec to SQL
    Compile {
        #[command(flatten)]
        spec: SpecArgs,
    },
    /// Run a spec over snapshots or a live database
    Run {
        #[command(flatten)]
        spec: SpecArgs,

        /// Snapshot file: {"schema.table": [rows], ...}
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Output format
        #[arg(short, long)]
        format: Option<OutputFormat>,
    },
    /// Show how the selected relations are joined
    Joins {
        #[command(flatten)]
        spec: SpecArgs,
    },
    /// Report problems in a spec
    Check {
        #[command(flatten)]
        spec: SpecArgs,
    },
    /// Print the loaded schema, or pull one from PostgreSQL
    Schema {
        /// Introspect the live database instead of reading a file
        #[arg(long)]
        pull: bool,

        /// Database schema to introspect
        #[arg(long, default_value = "public")]
        schema_name: String,

        /// Write the schema JSON here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// A spec from a JSON file, extended by inline flags.
#[derive(Args)]
struct SpecArgs {
    /// Spec file (JSON)
    #[arg(long)]
    spec: Option<PathBuf>,

    /// Relation to select; the first one anchors the joins
    #[arg(long = "from", value_parser = parser::parse_relation_id)]
    relations: Vec<RelationId>,

    /// Column to select, as table.column
    #[arg(long = "select", value_parser = parser::parse_column_id)]
    columns: Vec<ColumnId>,

    /// Aggregate, e.g. "SUM(orders.total)"
    #[arg(long = "agg", value_parser = parser::parse_aggregate)]
    aggregates: Vec<(ColumnId, AggregateFunc)>,

    /// Explicit join, e.g. "customers.id = orders.buyer_id left"
    #[arg(long = "join", value_parser = parser::parse_join)]
    joins: Vec<ExplicitJoin>,

    /// Filter, e.g. "orders.total >= 10"
    #[arg(long = "filter", value_parser = parser::parse_filter)]
    filters: Vec<Filter>,

    /// Group-by column
    #[arg(long = "group", value_parser = parser::parse_column_id)]
    group_by: Vec<ColumnId>,

    /// Sort term, e.g. "orders.total desc"
    #[arg(long = "order", value_parser = parser::parse_order)]
    order_by: Vec<OrderBy>,

    /// Row limit
    #[arg(long)]
    limit: Option<usize>,

    /// Calculated column, e.g. "margin = orders.total - orders.cost"
    #[arg(long = "calc", value_parser = parser::parse_calculated)]
    calculated: Vec<CalculatedColumn>,
}

impl SpecArgs {
    fn build(self, config: &QspecConfig) -> Result<QuerySpec> {
        let mut spec = match &self.spec {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read spec {}", path.display()))?;
                serde_json::from_str::<QuerySpec>(&text)
                    .with_context(|| format!("Invalid spec {}", path.display()))?
            }
            None => QuerySpec::new().limit(config.default_limit),
        };

        spec.relations.extend(self.relations);
        spec.columns.extend(self.columns);
        spec.aggregates.extend(self.aggregates);
        spec.joins.extend(self.joins);
        spec.filters.extend(self.filters);
        spec.group_by.extend(self.group_by);
        spec.order_by.extend(self.order_by);
        spec.calculated.extend(self.calculated);
        if let Some(n) = self.limit {
            if n == 0 {
                bail!("--limit must be positive");
            }
            spec.limit = n;
        }

        if spec.relations.is_empty() {
            bail!(QspecError::EmptyQuerySpec);
        }
        Ok(spec)
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("QSPEC_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = dispatch(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = QspecConfig::load(cli.config.as_deref()).context("Failed to load config")?;
    if let Some(url) = cli.database_url {
        config.database_url = Some(url);
    }
    if let Some(path) = cli.schema {
        config.schema_path = Some(path);
    }

    match cli.command {
        Commands::Compile { spec } => {
            let schema = load_schema(&config)?;
            let spec = spec.build(&config)?;
            println!("{}", qspec::compile(&schema, &spec)?);
        }
        Commands::Run { spec, data, format } => {
            let schema = load_schema(&config)?;
            let spec = spec.build(&config)?;
            let format = format.unwrap_or(config.format);
            run_spec(&config, &schema, &spec, data.as_deref(), format).await?;
        }
        Commands::Joins { spec } => {
            let schema = load_schema(&config)?;
            let spec = spec.build(&config)?;
            show_joins(&schema, &spec);
        }
        Commands::Check { spec } => {
            let schema = load_schema(&config)?;
            let spec = spec.build(&config)?;
            if !show_issues(&schema, &spec) {
                std::process::exit(1);
            }
        }
        Commands::Schema {
            pull,
            schema_name,
            output,
        } => {
            let schema = if pull {
                let db = connect(&config).await?;
                db.introspect(&schema_name).await?
            } else {
                load_schema(&config)?
            };
            let json = serde_json::to_string_pretty(&schema)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!(
                        "{} Wrote {} relations to {}",
                        "✓".green(),
                        schema.relations.len(),
                        path.display().to_string().cyan()
                    );
                }
                None => println!("{}", json),
            }
        }
    }

    Ok(())
}

fn load_schema(config: &QspecConfig) -> Result<Schema> {
    match &config.schema_path {
        Some(path) => Schema::from_file(path)
            .with_context(|| format!("Failed to load schema {}", path.display())),
        None => {
            tracing::warn!("No schema given; joins between relations will be cartesian");
            Ok(Schema::new())
        }
    }
}

async fn connect(config: &QspecConfig) -> Result<QspecDb> {
    let Some(url) = &config.database_url else {
        bail!("No database URL. Use --database-url or set QSPEC_DATABASE_URL");
    };
    tracing::info!("Connecting to database");
    Ok(QspecDb::connect(url, config.max_connections).await?)
}

async fn run_spec(
    config: &QspecConfig,
    schema: &Schema,
    spec: &QuerySpec,
    data: Option<&Path>,
    format: OutputFormat,
) -> Result<()> {
    if format == OutputFormat::Sql {
        println!("{}", qspec::compile(schema, spec)?);
        return Ok(());
    }

    let backend = match data {
        Some(path) => Backend::Local(qspec::interpreter::load_snapshots(path)?),
        None if config.database_url.is_some() => Backend::Live(connect(config).await?),
        None => bail!("Nothing to run against. Pass --data or a database URL"),
    };

    let rows = backend.execute(schema, spec).await?;
    format_output(&rows, format);
    Ok(())
}

fn show_joins(schema: &Schema, spec: &QuerySpec) {
    let anchor = &spec.relations[0];
    println!("{} {}", "Anchor:".dimmed(), anchor.to_string().white().bold());

    for join in resolve(schema, &spec.relations, &spec.joins) {
        let origin = match join.origin {
            JoinOrigin::CartesianFallback => join.origin.to_string().yellow(),
            JoinOrigin::Explicit => join.origin.to_string().green(),
            _ => join.origin.to_string().cyan(),
        };
        match &join.on {
            Some(on) => println!(
                "  {} JOIN {} ON {}.{} = {}.{}  [{}]",
                join.kind,
                join.target.to_string().white(),
                on.source.table,
                on.source_column,
                join.target.table,
                on.target_column,
                origin
            ),
            None => println!("  CROSS {}  [{}]", join.target.to_string().white(), origin),
        }
    }
}

/// Print validator issues; false when any is an error.
fn show_issues(schema: &Schema, spec: &QuerySpec) -> bool {
    let joins = resolve(schema, &spec.relations, &spec.joins);
    let issues = qspec::validator::check(schema, spec, &joins);

    if issues.is_empty() {
        println!("{} No issues found", "✓".green());
        return true;
    }

    for issue in &issues {
        match issue.severity {
            Severity::Error => println!("{} {}", "✗".red(), issue.message),
            Severity::Warning => println!("{} {}", "⚠".yellow(), issue.message),
        }
    }
    issues.iter().all(|i| i.severity != Severity::Error)
}

fn format_output(results: &[ResultRow], format: OutputFormat) {
    if results.is_empty() {
        println!("{}", "(no results)".dimmed());
        return;
    }

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(results).unwrap_or_default());
        return;
    }

    let columns: Vec<&String> = results[0].keys().collect();
    let widths: Vec<usize> = columns
        .iter()
        .map(|c| {
            results
                .iter()
                .filter_map(|row| row.get(*c))
                .map(|v| val_to_string(v).chars().count())
                .fold(c.chars().count(), usize::max)
        })
        .collect();

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:width$}", c, width = w))
        .collect();
    println!("{}", header.join(" │ ").white().bold());

    let sep: Vec<String> = widths.iter().map(|w| "─".repeat(*w)).collect();
    println!("{}", sep.join("─┼─").dimmed());

    for row in results {
        let cells: Vec<String> = columns
            .iter()
            .zip(&widths)
            .map(|(c, w)| {
                let val = row.get(*c).map(val_to_string).unwrap_or_default();
                format!("{:width$}", val, width = w)
            })
            .collect();
        println!("{}", cells.join(" │ "));
    }

    println!();
    println!("{} row(s) returned", results.len().to_string().cyan());
}

fn val_to_string(val: &serde_json::Value) -> String {
    match val {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s.clone(),
        _ => val.to_string(),
    }
}
