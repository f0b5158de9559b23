use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "zipstow")]
#[command(version)]
#[command(about = "Create, append to, list, extract and prune ZIP archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipstow add docs.zip README.md src -r     add a file and a folder tree\n  \
  zipstow extract data1.zip -x joe          extract all files except joe\n  \
  zipstow extract -p foo.zip | more         send contents of foo.zip via pipe into more\n  \
  zipstow remove docs.zip README.md         drop an entry by rebuilding the archive")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add files to an archive, creating it if needed
    Add(AddArgs),
    /// List the entries of an archive
    List(ListArgs),
    /// Extract entries from an archive
    Extract(ExtractArgs),
    /// Remove entries from an archive
    Remove(RemoveArgs),
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Archive to create or append to
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Files or folders to add
    #[arg(value_name = "PATHS", required = true)]
    pub paths: Vec<PathBuf>,

    /// Store without compression
    #[arg(short = '0', long = "store")]
    pub store: bool,

    /// Keep DEFLATE output even when it is larger than the input
    #[arg(long)]
    pub force_deflate: bool,

    /// Recurse into folders
    #[arg(short = 'r')]
    pub recursive: bool,

    /// Archive comment
    #[arg(short = 'c', value_name = "COMMENT")]
    pub comment: Option<String>,

    /// Encode names as CP437 instead of UTF-8
    #[arg(long)]
    pub legacy_names: bool,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Detailed table with sizes, ratios and timestamps (also implied by -v)
    #[arg(short = 'l', long = "long")]
    pub long: bool,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Files to extract (default: all)
    #[arg(value_name = "FILES")]
    pub files: Vec<String>,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR")]
    pub extract_dir: Option<PathBuf>,

    /// Extract files to pipe, no messages
    #[arg(short = 'p')]
    pub pipe: bool,

    /// Exclude files that follow
    #[arg(short = 'x', value_name = "FILE", num_args = 1..)]
    pub exclude: Vec<String>,

    /// Never overwrite existing files
    #[arg(short = 'n', conflicts_with = "overwrite")]
    pub never_overwrite: bool,

    /// Overwrite files WITHOUT prompting
    #[arg(short = 'o')]
    pub overwrite: bool,

    /// Junk paths (do not make directories)
    #[arg(short = 'j')]
    pub junk_paths: bool,
}

#[derive(Args, Debug)]
pub struct RemoveArgs {
    #[arg(value_name = "ARCHIVE")]
    pub archive: PathBuf,

    /// Entry names to remove
    #[arg(value_name = "NAMES", required = true)]
    pub names: Vec<String>,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0 || matches!(&self.command, Command::Extract(args) if args.pipe)
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }

    /// Default log level when `RUST_LOG` is unset.
    pub fn log_level(&self) -> &'static str {
        match (self.is_very_quiet(), self.verbose) {
            (true, _) => "error",
            (false, 0) => "warn",
            (false, 1) => "info",
            (false, 2) => "debug",
            _ => "trace",
        }
    }
}
