use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cloudrec")]
#[command(author = "Alberto Cavalcante")]
#[command(version)]
#[command(about = "Reconcile declared cloud resources with their live state", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ~/.config/cloudrec/cloudrec.toml)
    #[arg(long, global = true, env = "CLOUDREC_CONFIG")]
    pub config: Option<PathBuf>,

    /// State file (default: ~/.local/state/cloudrec/state.json)
    #[arg(long, global = true, env = "CLOUDREC_STATE")]
    pub state: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Encode or decode composite identities
    #[command(subcommand)]
    Id(IdCommand),

    /// Print the content hash of a tag set
    Hash {
        /// Tags as key=value; a trailing ! marks the tag as propagating
        #[arg(required = true)]
        tags: Vec<String>,
    },

    /// Re-read every configured resource and update the state file
    Refresh(RefreshArgs),

    /// Show drift between configuration and live state without writing
    Diff(SnapshotArgs),

    /// Create or update configured resources
    Apply(ApplyArgs),

    /// Delete a resource and drop its record
    Destroy {
        /// Composite identity
        identity: String,

        #[command(flatten)]
        remote: SnapshotArgs,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Inspect the persisted state
    #[command(subcommand)]
    State(StateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Identity Commands
// ============================================================================

#[derive(Subcommand)]
pub enum IdCommand {
    /// Join identifier components into one composite identity
    Encode {
        /// Identifier components, in order
        #[arg(required = true)]
        components: Vec<String>,

        /// Separator character
        #[arg(short, long, default_value_t = reconcile::DEFAULT_SEPARATOR)]
        separator: char,
    },

    /// Split a composite identity into its components
    Decode {
        /// Composite identity
        id: String,

        /// Expected number of components
        #[arg(short, long)]
        arity: usize,

        /// Separator character
        #[arg(short, long, default_value_t = reconcile::DEFAULT_SEPARATOR)]
        separator: char,
    },
}

// ============================================================================
// Remote Commands
// ============================================================================

#[derive(clap::Args)]
pub struct SnapshotArgs {
    /// Snapshot file standing in for the remote control plane
    #[arg(long, env = "CLOUDREC_SNAPSHOT")]
    pub snapshot: PathBuf,
}

#[derive(Parser)]
pub struct RefreshArgs {
    #[command(flatten)]
    pub remote: SnapshotArgs,

    /// Number of parallel jobs
    #[arg(short, long, default_value = "4")]
    pub jobs: usize,

    /// Abort outstanding work after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

#[derive(Parser)]
pub struct ApplyArgs {
    #[command(flatten)]
    pub remote: SnapshotArgs,

    /// Show what would change without applying
    #[arg(long)]
    pub dry_run: bool,

    /// Skip confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// Abort outstanding work after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

// ============================================================================
// State Commands
// ============================================================================

#[derive(Subcommand)]
pub enum StateCommand {
    /// List all records
    List,

    /// Show one record
    Show {
        /// Composite identity
        identity: String,
    },

    /// Forget a record without touching the remote entity
    Rm {
        /// Composite identity
        identity: String,

        /// Skip confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}
