//! `reg rm` - delete an entry by id.

use clap::Args;
use hyperreg::{EntryId, RegistryConfig};

use crate::output::print_success;

/// Delete an entry by id
#[derive(Args)]
pub struct RmArgs {
    /// Id of the entry to delete
    id: String,

    /// Delete even if other entries still depend on it
    #[arg(long)]
    force: bool,
}

pub async fn run(args: RmArgs, config: &RegistryConfig) -> anyhow::Result<()> {
    let registry = crate::store::open(config).await?;
    let id = EntryId::from(args.id.clone());

    registry.delete(&id, args.force).await?;
    print_success(&format!("deleted {}", args.id));
    Ok(())
}
