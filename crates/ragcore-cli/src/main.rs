mod cli;
mod commands;
mod output;

use clap::Parser;
use cli::{Cli, Command, EndpointCommand, GraphragCommand, UnitCommand};
use commands::{InvalidConfig, RemoteError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let remote = cli.remote.clone();
    let token = cli.token.clone();

    let result = match cli.command {
        Command::Serve { settings } => commands::serve(settings).await,
        Command::Endpoint { command } => match command {
            EndpointCommand::List { project_id, search } => {
                commands::endpoint_list(remote, token, project_id, search).await
            }
            EndpointCommand::Add { id, driver_id, url, display_name, project_id } => {
                commands::endpoint_add(remote, token, id, driver_id, url, display_name, project_id).await
            }
            EndpointCommand::Rm { id, reason } => commands::endpoint_rm(remote, token, id, reason).await,
        },
        Command::Unit { command } => match command {
            UnitCommand::List { endpoint_id } => commands::unit_list(remote, token, endpoint_id).await,
            UnitCommand::Configure { endpoint_id, unit_id, config_file } => {
                commands::unit_configure(remote, token, endpoint_id, unit_id, config_file).await
            }
            UnitCommand::Start { endpoint_id, unit_id } => {
                commands::unit_start(remote, token, endpoint_id, unit_id).await
            }
            UnitCommand::Pause { endpoint_id, unit_id } => {
                commands::unit_pause(remote, token, endpoint_id, unit_id).await
            }
            UnitCommand::ResetCheckpoint { endpoint_id, unit_id } => {
                commands::unit_reset_checkpoint(remote, token, endpoint_id, unit_id).await
            }
        },
        Command::Status { endpoint_id } => commands::status(remote, token, endpoint_id).await,
        Command::Events { endpoint_id, limit } => commands::events(remote, token, endpoint_id, limit).await,
        Command::Graphrag { command } => match command {
            GraphragCommand::Context { tenant_id, query, top_k } => {
                commands::graphrag_context(remote, token, tenant_id, query, top_k).await
            }
            GraphragCommand::Expand { tenant_id, seeds, max_hops } => {
                commands::graphrag_expand(remote, token, tenant_id, seeds, max_hops).await
            }
            GraphragCommand::Answer { tenant_id, query, context_file, max_tokens } => {
                commands::graphrag_answer(remote, token, tenant_id, query, context_file, max_tokens).await
            }
        },
    };

    if let Err(err) = result {
        eprintln!("error: {err:#}");
        std::process::exit(exit_code_for(&err));
    }
}

/// Maps a failure to the process exit code a calling script can branch on (§6): invalid
/// configuration, authorization failure, retriable transport failure, non-retriable remote
/// failure, or an unclassified internal error.
fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<InvalidConfig>().is_some() {
        return 2;
    }
    if let Some(remote) = err.downcast_ref::<RemoteError>() {
        return match remote.status.as_u16() {
            401 | 403 => 3,
            429 | 503 => 4,
            _ => 5,
        };
    }
    64
}
