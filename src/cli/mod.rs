//! Command-line interface parsing and handling
//!
//! This module handles parsing command-line arguments and executing the appropriate commands.

pub mod account;
pub mod chat;
pub mod conversation_list;
pub mod model_list;
pub mod settings;

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::cli::chat::{run_chat, ChatOptions};
use crate::cli::conversation_list::ListOptions;
use crate::cli::settings::ConfigAction;
use crate::core::client::ApiClient;
use crate::core::config::Config;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("VERGEN_GIT_SHA"), ")");

#[derive(Parser)]
#[command(name = "chatwire")]
#[command(version = VERSION)]
#[command(about = "Talk to a chat backend from the terminal")]
#[command(
    long_about = "chatwire signs in to a chat backend, streams replies to your messages and \
browses your saved conversations.\n\n\
Configuration:\n\
  Settings are read from config.toml in the platform config directory \
(run 'chatwire config' to see where; 'chatwire config set <key> <value>' changes one).\n\n\
Environment Variables:\n\
  CHATWIRE_BASE_URL   Backend URL (overrides the config file)\n\
  CHATWIRE_LOG        Log filter for diagnostics on stderr (default: warn)"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend URL to talk to for this invocation
    #[arg(long, global = true, value_name = "URL")]
    pub base_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in and store the session
    Login {
        /// Account name (prompted when omitted)
        username: Option<String>,
    },
    /// Create an account and sign in
    Register {
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Sign out and forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// List the models the backend offers
    Models,
    /// List saved conversations
    Conversations {
        /// Conversations per page
        #[arg(long, value_name = "N")]
        take: Option<usize>,
        /// Keep fetching pages until the list is exhausted
        #[arg(long)]
        all: bool,
        /// Group by recency (today, yesterday, ...)
        #[arg(long)]
        grouped: bool,
    },
    /// Print a conversation's messages
    History {
        conversation: String,
    },
    /// Create an empty conversation
    Create {
        #[arg(required = true, trailing_var_arg = true)]
        title: Vec<String>,
    },
    /// Change a conversation's title
    Rename {
        conversation: String,
        #[arg(required = true, trailing_var_arg = true)]
        title: Vec<String>,
    },
    /// Delete a conversation
    Delete {
        conversation: String,
    },
    /// Show token usage for a conversation (by external id)
    Usage {
        conversation: String,
    },
    /// Print the effective configuration, or change a stored setting
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
    /// Send a message and stream the reply
    Chat {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        message: Vec<String>,
        /// Continue an existing conversation
        #[arg(short, long, value_name = "ID")]
        conversation: Option<String>,
        /// Agent to route the message to
        #[arg(short, long)]
        agent: Option<String>,
        /// Model id to answer with
        #[arg(short, long)]
        model: Option<String>,
        /// Attach a file (images, PDF or CSV, up to 8 MB); repeatable
        #[arg(long = "attach", value_name = "FILE")]
        attachments: Vec<PathBuf>,
    },
}

pub fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    tokio::runtime::Runtime::new()?.block_on(async_main())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CHATWIRE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Client for the configured backend; an ended session prints a sign-in hint.
pub fn build_client(config: &Config) -> ApiClient {
    ApiClient::builder(config.base_url())
        .token_store(config.token_store())
        .on_session_ended(|| {
            eprintln!("🔒 Your session has ended. Run 'chatwire login' to sign in again.");
        })
        .build()
}

async fn async_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    let mut config = Config::load()?;
    if let Some(base_url) = args.base_url {
        config.base_url = Some(base_url);
    }

    let client = build_client(&config);
    match args.command {
        Commands::Login { username } => account::login(&client, username).await,
        Commands::Register { username, email } => {
            account::register(&client, username, email).await
        }
        Commands::Logout => account::logout(&client).await,
        Commands::Whoami => account::whoami(&client).await,
        Commands::Models => model_list::list_models(&client, &config).await,
        Commands::Conversations {
            take,
            all,
            grouped,
        } => {
            conversation_list::list_conversations(
                &client,
                ListOptions {
                    page_size: take.unwrap_or_else(|| config.page_size()),
                    all,
                    grouped,
                },
            )
            .await
        }
        Commands::History { conversation } => {
            conversation_list::print_history(&client, &conversation).await
        }
        Commands::Create { title } => {
            conversation_list::create(&client, &title.join(" ")).await
        }
        Commands::Rename {
            conversation,
            title,
        } => conversation_list::rename(&client, &conversation, &title.join(" ")).await,
        Commands::Delete { conversation } => {
            conversation_list::delete(&client, &conversation).await
        }
        Commands::Usage { conversation } => {
            conversation_list::print_usage(&client, &conversation).await
        }
        Commands::Chat {
            message,
            conversation,
            agent,
            model,
            attachments,
        } => {
            run_chat(
                &client,
                &config,
                ChatOptions {
                    message: message.join(" "),
                    conversation,
                    agent,
                    model,
                    attachments,
                },
            )
            .await
        }
        Commands::Config { action } => settings::run(action, &config),
    }
}

#[cfg(test)]
mod tests;
