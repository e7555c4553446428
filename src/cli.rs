//! Command line interface.

use clap::Parser;
use std::path::PathBuf;

/// Small keyboard-driven music player.
#[derive(Debug, Parser)]
#[command(name = "klangwerk", version, about)]
pub struct Cli {
    /// Music library root (falls back to the config file, then $MUSICPATH)
    #[arg(env = "MUSICPATH")]
    pub library: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_argument() {
        let cli = Cli::parse_from(["klangwerk", "/music"]);
        assert_eq!(cli.library, Some(PathBuf::from("/music")));
        assert!(!cli.verbose);
    }

    #[test]
    fn test_verbose_flag() {
        let cli = Cli::parse_from(["klangwerk", "--verbose"]);
        assert!(cli.verbose);
    }
}
