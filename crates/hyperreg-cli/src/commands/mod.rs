//! # CLI Commands
//!
//! Subcommands for the `reg` binary, each mirroring one registry operation:
//!
//! - `add`: register a new entry
//! - `rm`: delete an entry
//! - `ls`: list entries
//! - `search`: search entries by namespace, category, status, or facet
//! - `propagate`: propagate an update across the entry graph
//! - `hotswap`: replace a live entry with a verified new version

pub mod add;
pub mod hotswap;
pub mod ls;
pub mod propagate;
pub mod rm;
pub mod search;

#[cfg(test)]
mod tests {
    #[test]
    fn command_modules_are_linked() {
        let _ = std::any::type_name::<super::add::AddArgs>();
        let _ = std::any::type_name::<super::hotswap::HotswapArgs>();
    }
}
