use std::process::ExitCode;

use clap::{Parser, Subcommand};
use hyperreg::RegistryError;

mod commands;
mod output;
mod store;

use commands::{add, hotswap, ls, propagate, rm, search};

/// Command-line client for the hyperreg universal registry.
#[derive(Parser)]
#[command(name = "reg")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and mutate a hyperreg registry from the command line", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register a new entry from a JSON file (or stdin)
    Add(add::AddArgs),

    /// Delete an entry by id
    Rm(rm::RmArgs),

    /// List entries, optionally filtered
    Ls(ls::LsArgs),

    /// Search entries by namespace, category, status, or facet
    Search(search::SearchArgs),

    /// Propagate an update from one entry to a set of targets
    Propagate(propagate::PropagateArgs),

    /// Hot-swap an entry to a new version with verification
    Hotswap(hotswap::HotswapArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = hyperreg::RegistryConfig::from_env();
    hyperreg::telemetry::init_tracing_from_config(&config);

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Add(args) => add::run(args, &config).await,
        Commands::Rm(args) => rm::run(args, &config).await,
        Commands::Ls(args) => ls::run(args, &config).await,
        Commands::Search(args) => search::run(args, &config).await,
        Commands::Propagate(args) => propagate::run(args, &config).await,
        Commands::Hotswap(args) => hotswap::run(args, &config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err
                .downcast_ref::<RegistryError>()
                .map(|e| e.category().exit_code())
                .unwrap_or(10);
            output::print_error(&err.to_string());
            ExitCode::from(code as u8)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clap_parses_known_subcommands() {
        let cli = Cli::try_parse_from(["reg", "ls"]).expect("parse ls");
        assert!(matches!(cli.command, Commands::Ls(_)));

        let cli = Cli::try_parse_from(["reg", "rm", "abc"]).expect("parse rm");
        assert!(matches!(cli.command, Commands::Rm(_)));

        let cli = Cli::try_parse_from([
            "reg",
            "propagate",
            "src",
            "--target",
            "dst",
            "--mode",
            "cascade",
        ])
        .expect("parse propagate");
        assert!(matches!(cli.command, Commands::Propagate(_)));
    }

    #[test]
    fn clap_enforces_required_args() {
        assert!(Cli::try_parse_from(["reg", "rm"]).is_err());
        assert!(Cli::try_parse_from(["reg", "hotswap"]).is_err());
        assert!(Cli::try_parse_from(["reg", "propagate", "src"]).is_err());
    }
}
