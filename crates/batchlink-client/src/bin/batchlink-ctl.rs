// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Batchlink Control CLI
//!
//! Administrative tool for batch servers.
//!
//! Usage:
//!   batchlink-ctl <command> [options]
//!
//! Commands:
//!   terminate                     Shut down every configured server
//!   delete <name>...              Delete jobs or reservations
//!   help                          Show usage

use std::process::ExitCode;

use batchlink_client::{
    AggregateOutcome, BatchClient, BatchError, ClientConfig, ConnectionHandle, DeleteRequest,
    DeleteTarget, ShardStatus, ShutdownManner, ShutdownMode,
};
use tracing::warn;

fn print_usage() {
    eprintln!(
        r#"Usage: batchlink-ctl <command> [options]

Administer batch servers.

COMMANDS:
    terminate                       Shut down every configured server
    delete <name>...                Delete jobs or reservations
    help                            Show this message

TERMINATE OPTIONS:
    --manner <m>                    immediate | delay | quick (default: immediate)
    --scheduler                     Also shut down the scheduler
    --moms                          Also shut down the execution hosts
    --extend <text>                 Extension string passed to the server
    --detail                        Print one line per server

DELETE OPTIONS:
    --type <t>                      job | reservation (default: job)
    --force                         Delete even if the server would refuse
    --extend <text>                 Extension string passed to the server

ENVIRONMENT:
    BATCHLINK_SERVERS               Comma separated host:port list (default: 127.0.0.1:15001)
    BATCHLINK_SKIP_CERT_VERIFICATION  Skip TLS verification (default: false)
    BATCHLINK_USER                  Requesting user (default: $USER)

EXAMPLES:
    # Quick shutdown of all servers, schedulers included
    batchlink-ctl terminate --manner quick --scheduler --detail

    # Force-delete two jobs
    batchlink-ctl delete 12.server 13.server --force
"#
    );
}

#[derive(Debug, PartialEq, Eq)]
enum Command {
    Help,
    Terminate {
        manner: ShutdownManner,
        extend: Option<String>,
        detail: bool,
    },
    Delete {
        target: DeleteTarget,
        names: Vec<String>,
        force: bool,
        extend: Option<String>,
    },
}

fn parse_args() -> Result<Command, String> {
    let args: Vec<String> = std::env::args().collect();
    parse_args_from_vec(&args)
}

fn parse_manner(value: &str) -> Result<ShutdownMode, String> {
    match value {
        "immediate" => Ok(ShutdownMode::Immediate),
        "delay" => Ok(ShutdownMode::Delay),
        "quick" => Ok(ShutdownMode::Quick),
        other => Err(format!("Invalid manner: {}", other)),
    }
}

fn parse_target(value: &str) -> Result<DeleteTarget, String> {
    match value {
        "job" => Ok(DeleteTarget::Job),
        "reservation" | "resv" => Ok(DeleteTarget::Reservation),
        other => Err(format!("Invalid type: {}", other)),
    }
}

fn parse_args_from_vec(args: &[String]) -> Result<Command, String> {
    if args.len() < 2 {
        return Err("No command specified".to_string());
    }

    match args[1].as_str() {
        "help" | "--help" | "-h" => Ok(Command::Help),
        "terminate" => {
            let mut mode = ShutdownMode::Immediate;
            let mut scheduler = false;
            let mut moms = false;
            let mut extend: Option<String> = None;
            let mut detail = false;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--manner" => {
                        i += 1;
                        mode = parse_manner(args.get(i).ok_or("--manner requires a value")?)?;
                    }
                    "--scheduler" => scheduler = true,
                    "--moms" => moms = true,
                    "--extend" => {
                        i += 1;
                        extend = Some(args.get(i).ok_or("--extend requires a value")?.clone());
                    }
                    "--detail" => detail = true,
                    arg => return Err(format!("Unknown argument: {}", arg)),
                }
                i += 1;
            }

            let mut manner = ShutdownManner::new(mode);
            if scheduler {
                manner = manner.with_scheduler();
            }
            if moms {
                manner = manner.with_moms();
            }
            Ok(Command::Terminate {
                manner,
                extend,
                detail,
            })
        }
        "delete" => {
            let mut target = DeleteTarget::Job;
            let mut names = Vec::new();
            let mut force = false;
            let mut extend: Option<String> = None;

            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "--type" => {
                        i += 1;
                        target = parse_target(args.get(i).ok_or("--type requires a value")?)?;
                    }
                    "--force" => force = true,
                    "--extend" => {
                        i += 1;
                        extend = Some(args.get(i).ok_or("--extend requires a value")?.clone());
                    }
                    arg if arg.starts_with("--") => {
                        return Err(format!("Unknown argument: {}", arg));
                    }
                    name => names.push(name.to_string()),
                }
                i += 1;
            }

            if names.is_empty() {
                return Err("At least one object name required".to_string());
            }
            if force && extend.is_some() {
                return Err("--force and --extend are mutually exclusive".to_string());
            }
            Ok(Command::Delete {
                target,
                names,
                force,
                extend,
            })
        }
        cmd => Err(format!("Unknown command: {}", cmd)),
    }
}

fn print_outcome(outcome: &AggregateOutcome) {
    for shard in outcome.outcomes() {
        match &shard.status {
            ShardStatus::Succeeded => println!("{}: ok", shard.endpoint),
            ShardStatus::Failed(e) => println!("{}: failed [{}] {}", shard.endpoint, e.code(), e),
            ShardStatus::Unreachable(reason) => {
                println!("{}: unreachable ({})", shard.endpoint, reason)
            }
        }
    }
    println!(
        "{} attempted, {} succeeded, {} failed, {} unreachable",
        outcome.attempted(),
        outcome.succeeded(),
        outcome.failed(),
        outcome.unreachable()
    );
}

async fn execute_command(client: &BatchClient, cmd: Command) -> Result<(), BatchError> {
    let handle = client.connect().await?;
    let result = run_command(client, handle, cmd).await;
    if let Err(e) = client.disconnect(handle).await {
        warn!("Failed to disconnect: {}", e);
    }
    result
}

async fn run_command(
    client: &BatchClient,
    handle: ConnectionHandle,
    cmd: Command,
) -> Result<(), BatchError> {
    match cmd {
        Command::Help => Ok(()),
        Command::Terminate {
            manner,
            extend,
            detail,
        } => {
            let outcome = client
                .terminate_with_outcome(handle, manner, extend.as_deref())
                .await?;
            if detail {
                print_outcome(&outcome);
            }
            outcome.into_result()
        }
        Command::Delete {
            target,
            names,
            force,
            extend,
        } => {
            let mut request = DeleteRequest::new(target, names);
            if force {
                request = request.force();
            }
            if let Some(extend) = extend {
                request = request.with_extend(extend);
            }
            let statuses = client.delete(handle, request).await?;
            let mut rejected = None;
            for status in &statuses {
                if status.code == 0 {
                    println!("{}: deleted", status.name);
                } else {
                    println!("{}: failed [{}]", status.name, status.code);
                    rejected = Some(BatchError::Server {
                        code: status.code,
                        text: Some(format!("delete of {} refused", status.name)),
                    });
                }
            }
            rejected.map_or(Ok(()), Err)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "batchlink_client=info".into()),
        )
        .init();

    let cmd = match parse_args() {
        Ok(Command::Help) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Ok(cmd) => cmd,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!();
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    let config = match ClientConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let client = BatchClient::new(config);
    match execute_command(&client, cmd).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            ExitCode::FAILURE
        }
    }
}
