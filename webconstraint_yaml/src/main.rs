//! `webconstraint-explain` - resolve a YAML deployment and inspect the result.
//!
//! - `explain FILE --path /p --method GET` shows the constraint for one request
//! - `permissions FILE` lists the exported web permissions
//! - `shadow FILE` compares both fragment metadata modes

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use tracing::info;
use webconstraint::permissions::{self, WebPermission};
use webconstraint::Caller;
use webconstraint_yaml::{explain, format_explain, load_deployment_file, resolve_file, shadow_compare};

/// Resolve servlet security constraints from a YAML deployment file
#[derive(Parser)]
#[command(name = "webconstraint-explain")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "WEBCONSTRAINT_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Print JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the effective constraint for one request
    Explain(ExplainArgs),

    /// List the web permissions of the resolved module
    Permissions {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Resolve under both fragment metadata modes and report differences
    Shadow {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

#[derive(Args)]
struct ExplainArgs {
    #[arg(value_name = "FILE")]
    file: PathBuf,

    /// Request path, relative to the context root
    #[arg(long)]
    path: String,

    #[arg(long, default_value = "GET")]
    method: String,

    /// Check an authenticated caller holding these roles
    #[arg(long, value_delimiter = ',')]
    roles: Option<Vec<String>>,

    /// Check an unauthenticated caller
    #[arg(long, conflicts_with = "roles")]
    anonymous: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    match cli.command {
        Commands::Explain(args) => run_explain(args, cli.json),
        Commands::Permissions { file } => run_permissions(file, cli.json),
        Commands::Shadow { file } => run_shadow(file, cli.json),
    }
}

fn run_explain(args: ExplainArgs, as_json: bool) -> Result<()> {
    let file = load_deployment_file(&args.file)
        .with_context(|| format!("Failed to load {}", args.file.display()))?;
    let table = resolve_file(&file).context("Failed to resolve deployment")?;
    info!(patterns = table.pattern_count(), "deployment resolved");

    let caller = match (args.roles, args.anonymous) {
        (Some(roles), _) => Some(Caller::authenticated(roles)),
        (None, true) => Some(Caller::anonymous()),
        (None, false) => None,
    };
    let method = args.method.to_ascii_uppercase();
    let result = explain(&table, &args.path, &method, caller.as_ref());

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{}", format_explain(&result));
    }
    Ok(())
}

fn run_permissions(path: PathBuf, as_json: bool) -> Result<()> {
    let file = load_deployment_file(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    let table = resolve_file(&file).context("Failed to resolve deployment")?;
    let set = permissions::export(&table);

    if as_json {
        let list = |perms: &[WebPermission]| {
            perms
                .iter()
                .map(|p| json!({ "name": p.name, "actions": p.actions }))
                .collect::<Vec<_>>()
        };
        let roles: serde_json::Map<String, serde_json::Value> = set
            .roles
            .iter()
            .map(|(role, perms)| (role.clone(), json!(list(perms))))
            .collect();
        let value = json!({
            "excluded": list(&set.excluded),
            "unchecked": list(&set.unchecked),
            "roles": roles,
            "user_data": list(&set.user_data),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    print_section("excluded", &set.excluded);
    print_section("unchecked", &set.unchecked);
    for (role, perms) in &set.roles {
        print_section(&format!("role {}", role), perms);
    }
    print_section("user-data", &set.user_data);
    Ok(())
}

fn print_section(title: &str, perms: &[WebPermission]) {
    if perms.is_empty() {
        return;
    }
    println!("{}:", title);
    for perm in perms {
        println!("  {}", perm);
    }
}

fn run_shadow(path: PathBuf, as_json: bool) -> Result<()> {
    let file = load_deployment_file(&path).with_context(|| format!("Failed to load {}", path.display()))?;
    let result = shadow_compare(&file).context("Failed to translate deployment")?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    for side in [&result.baseline, &result.candidate] {
        match &side.error {
            Some(err) => println!("{}: error: {}", side.mode, err),
            None => println!("{}: {} patterns", side.mode, side.patterns),
        }
    }
    if result.outcomes_match {
        println!("no divergences");
    }
    for d in &result.divergences {
        let show = |o: &Option<webconstraint_yaml::PartitionOutcome>| match o {
            Some(o) => format!("{} {} ({})", o.roles, o.transport, o.source),
            None => "-".to_string(),
        };
        println!(
            "{} {}: {} | {}",
            d.pattern,
            d.partition,
            show(&d.baseline),
            show(&d.candidate)
        );
    }
    Ok(())
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
