//! Sieve command-line tool
//!
//! Inspects a collection config offline: decodes a URL query string the way
//! a mounted controller would, then prints the assembled query, its SQL and
//! the canonical URL.
//!
//! Usage:
//!   sieve --config people.toml plan "name=ann&age=18,&sort=-created"
//!   sieve --config people.toml fields

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sieve::{Collection, CollectionConfig, Settings, SqlRenderer, UrlParams};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Collection config (TOML or JSON). Defaults to SIEVE_CONFIG.
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Decode URL parameters and print the resulting query.
    Plan {
        /// URL query string, with or without the leading `?`.
        #[arg(default_value = "")]
        query: String,

        /// Acting user, for tenant-aware executors.
        #[arg(long)]
        actor: Option<String>,

        /// Tenant the query is scoped to.
        #[arg(long)]
        tenant: Option<String>,
    },
    /// List the filterable fields with their resolved filter types.
    Fields,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env().context("failed to load settings")?;
    init_tracing(&settings.log_filter);

    let args = Args::parse();
    let path = args
        .config
        .or_else(|| settings.config_path.clone())
        .context("no collection config given (use --config or SIEVE_CONFIG)")?;

    let config = CollectionConfig::load(&path)?;
    let collection = Collection::from_config(config)
        .with_context(|| format!("invalid collection config {}", path.display()))?;
    for warning in collection.warnings() {
        warn!("{warning}");
    }

    match args.command {
        Cmd::Plan {
            query,
            actor,
            tenant,
        } => plan(&collection, &settings, &query, actor, tenant),
        Cmd::Fields => {
            fields(&collection);
            Ok(())
        }
    }
}

fn plan(
    collection: &Collection,
    settings: &Settings,
    query_string: &str,
    actor: Option<String>,
    tenant: Option<String>,
) -> Result<()> {
    let params = UrlParams::from_query_string(query_string);
    debug!(params = params.len(), "decoding URL parameters");

    let mut base = collection.base_query();
    if actor.is_some() || tenant.is_some() {
        base = base.for_actor(sieve::query::ActorContext { actor, tenant });
    }

    let controller = collection.controller(base, params);
    let query = controller.current_query();

    let mut renderer = SqlRenderer::new(settings.id_column.clone());
    if let Some(column) = &settings.tenant_column {
        renderer = renderer.with_tenant_column(column.clone());
    }
    let rendered = renderer.render(&query);

    println!("# query");
    println!(
        "{}",
        serde_json::to_string_pretty(&query).context("failed to serialize query")?
    );
    println!();
    println!("# sql");
    println!("{};", rendered.select);
    if let Some(count) = &rendered.count {
        println!("{count};");
    }
    if rendered.reversed {
        println!("-- rows are fetched in reverse and must be flipped");
    }
    println!();
    println!("# url");
    println!("?{}", controller.url_params().to_query_string());
    Ok(())
}

fn fields(collection: &Collection) {
    for meta in collection.fields().filter_metas() {
        let known = collection.registry().is_known(&meta.filter_type);
        let choices = collection
            .registry()
            .effective_options(&meta)
            .allowed_values()
            .join(",");
        println!(
            "{}\t{}\t{}{}\t{}",
            meta.field,
            meta.label,
            meta.filter_type,
            if known { "" } else { " (unknown)" },
            choices
        );
    }
    let sortable: Vec<&str> = collection
        .fields()
        .iter()
        .filter(|f| f.sortable)
        .map(|f| f.field.as_str())
        .collect();
    println!("sortable: {}", sortable.join(", "));
}

fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
