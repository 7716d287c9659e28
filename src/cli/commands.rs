use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "taquero")]
#[command(version, about = "Food-safety records for small kitchens")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbose logging (debug level)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new taquero project in the current directory
    Init {
        /// Address the record service will listen on
        #[arg(long)]
        bind: Option<String>,
    },

    /// Run the HTTP record service
    Serve {
        /// Override the configured listen address
        #[arg(long)]
        bind: Option<String>,
    },

    /// List record modules and their required fields
    Modules {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List active records of a module, newest first
    List {
        /// Module (temperature-logs, cleaning-checklists, incident-reports, suppliers, staff-sickness)
        module: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create or overwrite a record
    Add {
        module: String,

        /// Field in key=value form (can be specified multiple times)
        #[arg(long = "field", short = 'f')]
        fields: Vec<String>,

        /// Read a JSON object from stdin; --field values take precedence
        #[arg(long)]
        stdin: bool,

        /// Send through the client cache to the configured endpoint; queued when unreachable
        #[arg(long)]
        remote: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Delete a record (soft or hard depending on the module)
    Delete {
        module: String,

        id: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'f')]
        force: bool,

        /// Delete a cached record through its endpoint; queued when unreachable
        #[arg(long)]
        remote: bool,
    },

    /// Proving methods for cooking, cooling and reheating
    Proving(ProvingCommand),

    /// Refresh the client cache of a module from its endpoint
    Fetch {
        /// Module slug or proving store (proving-cooking, ...)
        store: String,
    },

    /// Show the client cache of a module without touching the network
    Cached {
        store: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replay queued client writes
    Sync {
        store: String,
    },
}

#[derive(Args, Debug)]
pub struct ProvingCommand {
    #[command(subcommand)]
    pub action: ProvingAction,
}

#[derive(Subcommand, Debug)]
pub enum ProvingAction {
    /// List methods with their batch progress
    List {
        /// Procedure kind (cooking, cooling, reheating)
        kind: String,

        /// Only methods with this status (in-progress, proven)
        #[arg(long)]
        status: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Create a method to be proven
    Create {
        kind: String,

        /// Food item the method applies to
        food_item: String,

        /// How the procedure is carried out
        #[arg(long, short = 'd')]
        description: String,

        #[arg(long)]
        by: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record a measured batch against a method
    Batch {
        kind: String,

        method_id: String,

        /// Final core temperature in Celsius
        #[arg(long)]
        end_temp: f64,

        #[arg(long)]
        by: String,

        /// Batch number (defaults to the next one)
        #[arg(long)]
        number: Option<u32>,

        /// Date of the batch (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        start_time: Option<String>,

        #[arg(long)]
        start_temp: Option<f64>,

        #[arg(long)]
        end_time: Option<String>,

        #[arg(long)]
        notes: Option<String>,

        /// Record against the cached method through its endpoint; queued when unreachable
        #[arg(long)]
        remote: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Clear a method's batches and return it to in-progress
    Reset {
        kind: String,

        method_id: String,
    },
}
