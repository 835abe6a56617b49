//! Process-level configuration: where on-disk state lives, how large the
//! B+ tree page caches are, and how verbose logging should be.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "ticket-engine",
    version,
    about = "Disk-backed train ticket reservation engine"
)]
pub struct CliArgs {
    /// Base directory for every heap/index file this process owns.
    #[arg(long, default_value = ".")]
    pub data_dir: PathBuf,

    /// Page cache capacity for B+ tree index nodes.
    #[arg(long, default_value_t = 1024)]
    pub index_cache_size: usize,

    /// Page cache capacity for B+ tree leaf nodes.
    #[arg(long, default_value_t = 2048)]
    pub leaf_cache_size: usize,

    /// Raise log verbosity; repeatable (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl CliArgs {
    /// The `tracing` filter directive implied by `-v`'s repeat count, used
    /// when `RUST_LOG` is not set.
    pub fn default_log_filter(&self) -> &'static str {
        match self.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let args = CliArgs::parse_from(["ticket-engine"]);
        assert_eq!(args.data_dir, PathBuf::from("."));
        assert_eq!(args.index_cache_size, 1024);
        assert_eq!(args.leaf_cache_size, 2048);
        assert_eq!(args.verbose, 0);
    }

    #[test]
    fn verbose_flag_is_repeatable() {
        let args = CliArgs::parse_from(["ticket-engine", "-vv"]);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.default_log_filter(), "trace");
    }
}
