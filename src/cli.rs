use std::{net::IpAddr, path::PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use searchlab::{server::DEFAULT_PORT, symbols::SymbolKind};

#[derive(Debug, Parser)]
#[command(
    name = "searchlab",
    about = "Small full-text search applications built on tantivy"
)]
pub struct Cli {
    /// Override the XDG data directory
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Increase log verbosity (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index the lines of text files on disk and search them
    Lines(LinesArgs),
    /// Scan Rust sources for items and search them in memory
    Symbols(SymbolsArgs),
    /// Serve time zone search over HTTP
    Serve(ServeArgs),
    /// Generate shell completions
    #[command(hide = true)]
    Completions(CompletionsArgs),
}

#[derive(Debug, clap::Args)]
pub struct LinesArgs {
    /// Keywords to search for (runs a demo set of searches when omitted)
    pub queries: Vec<String>,

    /// Directory of text files to index
    #[arg(long, default_value = "short-stories")]
    pub docs: PathBuf,

    /// Maximum number of hits per search
    #[arg(short = 'n', long, default_value_t = 10)]
    pub limit: usize,

    /// Also list lines whose number is at most N
    #[arg(long, value_name = "N")]
    pub max_line: Option<u64>,

    /// Search the existing index without rebuilding it
    #[arg(long, conflicts_with = "index_only")]
    pub skip_index: bool,

    /// Rebuild the index and exit without searching
    #[arg(long)]
    pub index_only: bool,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct SymbolsArgs {
    /// Keywords to search for (runs a demo set of searches when omitted)
    pub keywords: Vec<String>,

    /// Directory to scan for Rust sources
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// Maximum number of hits per field
    #[arg(short = 'n', long, default_value_t = searchlab::symbols::DEFAULT_LIMIT)]
    pub limit: usize,

    /// Only return items of this kind
    #[arg(long, value_enum)]
    pub kind: Option<SymbolKind>,

    /// Output results as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, clap::Args)]
pub struct ServeArgs {
    /// Port to listen on
    #[arg(long, env = "SEARCHLAB_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    pub bind: IpAddr,
}

#[derive(Debug, clap::Args)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

impl CompletionsArgs {
    pub fn generate(&self) {
        clap_complete::generate(
            self.shell,
            &mut Cli::command(),
            "searchlab",
            &mut std::io::stdout(),
        );
    }
}
