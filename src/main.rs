// SPDX-License-Identifier: MIT

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenv::dotenv;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

use studyflow::config::Config;
use studyflow::edit::{self, CommandDecider};
use studyflow::pipeline::{self, TemplateGenerator};
use studyflow::workflow::orchestrator::Outcome;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Data directory, overrides STUDYFLOW_DATA_DIR
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a new unit of work for a conversation
    Start {
        /// Conversation id
        #[arg(short, long)]
        conversation: String,

        /// The question to prepare study notes for
        #[arg(short, long)]
        question: String,
    },
    /// Answer a suspended conversation
    Resume {
        #[arg(short, long)]
        conversation: String,

        /// Reply, e.g. `replace "old" with "new"` or `done`
        #[arg(short, long)]
        message: String,

        /// Continuation token from the last suspension
        #[arg(long)]
        continuation: Option<u64>,
    },
    /// Re-run a conversation halted by a failure
    Retry {
        #[arg(short, long)]
        conversation: String,
    },
    /// Print the latest checkpoint
    State {
        #[arg(short, long)]
        conversation: String,
    },
    /// Delete a conversation and close its session
    Delete {
        #[arg(short, long)]
        conversation: String,
    },
    /// Fuzzy find-and-replace inside a file, printing the result
    Patch {
        /// Document to patch
        #[arg(short, long)]
        file: PathBuf,

        /// Excerpt to look for
        #[arg(short, long)]
        target: String,

        /// Replacement text
        #[arg(short, long)]
        replacement: String,

        #[arg(long, default_value_t = edit::DEFAULT_THRESHOLD)]
        threshold: f64,
    },
}

fn print_outcome(outcome: &Outcome) {
    match outcome {
        Outcome::Suspended {
            payload,
            session_id,
            continuation,
        } => {
            println!("Suspended (session {}, continuation {})", session_id, continuation);
            if let Some(message) = payload.get("message").and_then(Value::as_str) {
                println!("{}", message);
            }
            if let Some(document) = payload.get("document").and_then(Value::as_str) {
                println!("\n{}", document);
            }
        }
        Outcome::Completed { result, session_id } => {
            println!("Completed (session {})", session_id);
            if let Some(document) = result.get("final_document").and_then(Value::as_str) {
                println!("\n{}", document);
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    let mut config = Config::from_env()?;
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }

    if let Commands::Patch {
        file,
        target,
        replacement,
        threshold,
    } = &args.command
    {
        let document = tokio::fs::read_to_string(file)
            .await
            .with_context(|| format!("reading {:?}", file))?;
        let result = edit::patch(&document, target, replacement, *threshold).ok_or_not_found()?;
        log::info!(
            "Matched {:?} with similarity {:.3}",
            result.matched_text,
            result.similarity
        );
        print!("{}", result.document);
        return Ok(());
    }

    let orchestrator = pipeline::open(
        &config,
        Arc::new(TemplateGenerator),
        Arc::new(CommandDecider::new()),
    )
    .await?;

    match args.command {
        Commands::Start {
            conversation,
            question,
        } => {
            let outcome = orchestrator.start(&conversation, json!(question)).await?;
            print_outcome(&outcome);
        }
        Commands::Resume {
            conversation,
            message,
            continuation,
        } => {
            let response = json!({ "message": message });
            let outcome = match continuation {
                Some(token) => {
                    orchestrator
                        .resume_from(&conversation, token, response)
                        .await?
                }
                None => orchestrator.resume(&conversation, response).await?,
            };
            print_outcome(&outcome);
        }
        Commands::Retry { conversation } => {
            let outcome = orchestrator.retry(&conversation).await?;
            print_outcome(&outcome);
        }
        Commands::State { conversation } => {
            let checkpoint = orchestrator.get_state(&conversation).await?;
            println!("{}", serde_json::to_string_pretty(&checkpoint)?);
        }
        Commands::Delete { conversation } => {
            orchestrator.delete_thread(&conversation).await?;
            println!("Deleted {}", conversation);
        }
        Commands::Patch { .. } => {}
    }

    Ok(())
}
