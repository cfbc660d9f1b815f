//! `reg ls` - list entries, optionally filtered by namespace/category/status.

use anyhow::Context;
use clap::Args;
use hyperreg::{Category, RegistryConfig, SearchFilters, Status};

use crate::output::{create_table, format_bytes, OutputFormat};

/// List entries, optionally filtered
#[derive(Args)]
pub struct LsArgs {
    /// Filter by exact namespace
    #[arg(long)]
    namespace: Option<String>,

    /// Filter by category
    #[arg(long)]
    category: Option<String>,

    /// Filter by status (registered, active, inactive, draining, deprecated, failed, unloaded)
    #[arg(long)]
    status: Option<String>,

    /// Output format
    #[arg(long, short = 'f', value_enum, default_value = "table")]
    format: OutputFormat,
}

fn parse_status(s: &str) -> anyhow::Result<Status> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .with_context(|| format!("unknown status: {s}"))
}

pub async fn run(args: LsArgs, config: &RegistryConfig) -> anyhow::Result<()> {
    let registry = crate::store::open(config).await?;

    let filters = SearchFilters {
        namespace: args.namespace,
        category: args.category.as_deref().map(|c| c.parse::<Category>()).transpose()?,
        status: args.status.as_deref().map(parse_status).transpose()?,
        ..SearchFilters::none()
    };

    let entries = registry.search(&filters).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Table => {
            let mut table = create_table();
            table.set_header(vec!["ID", "NAMESPACE", "NAME", "VERSION", "CATEGORY", "STATUS", "SIZE"]);
            for entry in &entries {
                table.add_row(vec![
                    entry.id.to_string(),
                    entry.namespace.clone(),
                    entry.name.clone(),
                    entry.version.to_string(),
                    entry.category.to_string(),
                    format!("{:?}", entry.status),
                    format_bytes(entry.size_bytes),
                ]);
            }
            println!("{table}");
        }
    }

    Ok(())
}
