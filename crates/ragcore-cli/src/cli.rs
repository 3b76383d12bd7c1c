use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ragcore",
    about = "Multi-tenant metadata ingestion and graph-RAG control plane",
    version
)]
pub struct Cli {
    /// Connect to a remote ragcore server instead of running in-process.
    #[arg(long, env = "RAGCORE_URL", global = true)]
    pub remote: Option<String>,

    /// Bearer token for the remote API. Falls back to ~/.ragcore/token.
    #[arg(long, env = "RAGCORE_TOKEN", global = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the control-plane API server (local only).
    Serve {
        #[command(flatten)]
        settings: ragcore_config::ServerSettings,
    },

    /// Manage source endpoints.
    Endpoint {
        #[command(subcommand)]
        command: EndpointCommand,
    },

    /// Manage ingestion units.
    Unit {
        #[command(subcommand)]
        command: UnitCommand,
    },

    /// Show endpoint/unit health summary.
    Status {
        /// Restrict to a single endpoint.
        #[arg(long)]
        endpoint_id: Option<String>,
    },

    /// List recent audit events.
    Events {
        #[arg(long)]
        endpoint_id: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },

    /// GraphRAG operations.
    Graphrag {
        #[command(subcommand)]
        command: GraphragCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum EndpointCommand {
    /// List endpoints.
    List {
        #[arg(long)]
        project_id: Option<String>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Register a new endpoint.
    Add {
        id: String,
        #[arg(long)]
        driver_id: String,
        #[arg(long)]
        url: String,
        #[arg(long)]
        display_name: Option<String>,
        #[arg(long)]
        project_id: Option<String>,
    },
    /// Soft-delete an endpoint.
    Rm {
        id: String,
        #[arg(long, default_value = "removed via CLI")]
        reason: String,
    },
}

#[derive(Debug, Subcommand)]
pub enum UnitCommand {
    /// List discoverable units and their status for an endpoint.
    List { endpoint_id: String },
    /// Load unit configuration from a YAML/JSON file and apply it.
    Configure {
        endpoint_id: String,
        unit_id: String,
        /// Path to a JSON file with the UnitConfig body.
        config_file: std::path::PathBuf,
    },
    /// Start a run for a unit.
    Start { endpoint_id: String, unit_id: String },
    /// Request a cooperative pause of an in-flight run.
    Pause { endpoint_id: String, unit_id: String },
    /// Clear the stored checkpoint so the next run starts from scratch.
    ResetCheckpoint { endpoint_id: String, unit_id: String },
}

#[derive(Debug, Subcommand)]
pub enum GraphragCommand {
    /// Build a RAG context for a query.
    Context {
        tenant_id: String,
        query: String,
        #[arg(long, default_value_t = 10)]
        top_k: i64,
    },
    /// Expand the graph outward from a set of seed node ids.
    Expand {
        tenant_id: String,
        #[arg(value_delimiter = ',')]
        seeds: Vec<String>,
        #[arg(long, default_value_t = 2)]
        max_hops: usize,
    },
    /// Generate an answer from a context previously produced by `context`.
    Answer {
        tenant_id: String,
        query: String,
        /// Path to a JSON file holding the `RagContext` from `graphrag context --output json`.
        context_file: std::path::PathBuf,
        #[arg(long, default_value_t = 512)]
        max_tokens: usize,
    },
}
