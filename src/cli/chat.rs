//! Non-interactive "chat" command: send one message and stream the reply

use std::error::Error;
use std::io::{self, Write};
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::debug;

use crate::api::{ChatRequest, StreamPacket};
use crate::core::attachments::attachment_from_path;
use crate::core::catalog::select_model;
use crate::core::client::ApiClient;
use crate::core::config::Config;

pub struct ChatOptions {
    pub message: String,
    pub conversation: Option<String>,
    pub agent: Option<String>,
    pub model: Option<String>,
    pub attachments: Vec<PathBuf>,
}

/// The model to request: explicit flag, configured default, then whatever
/// the backend's catalog marks as its default.
async fn resolve_model(client: &ApiClient, config: &Config, requested: Option<String>) -> Option<String> {
    if let Some(model) = requested.or_else(|| config.default_model.clone()) {
        return Some(model);
    }
    match client.list_models().await {
        Ok(models) => select_model(&models, None).map(|model| model.model_id.clone()),
        Err(err) => {
            debug!(error = %err, "Model catalog unavailable; letting the backend choose");
            None
        }
    }
}

pub async fn run_chat(
    client: &ApiClient,
    config: &Config,
    options: ChatOptions,
) -> Result<(), Box<dyn Error>> {
    if options.message.trim().is_empty() {
        return Err("Usage: chatwire chat <message>".into());
    }

    let files = options
        .attachments
        .iter()
        .map(|path| attachment_from_path(path))
        .collect::<Result<Vec<_>, _>>()?;

    let mut request = ChatRequest::new(options.message).with_files(files);
    if let Some(conversation) = options.conversation {
        request = request.in_conversation(conversation);
    }
    if let Some(agent) = options.agent.or_else(|| config.default_agent.clone()) {
        request = request.with_agent(agent);
    }
    if let Some(model) = resolve_model(client, config, options.model).await {
        request = request.with_model(model);
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<StreamPacket>();
    let stream = client.stream_chat(request, tx);

    let cancel = stream.cancel_token();
    let interrupt = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        }
    });

    let mut conversation_id = None;
    let mut failure = None;
    while let Some(packet) = rx.recv().await {
        if !packet.conversation_id().is_empty() {
            conversation_id = Some(packet.conversation_id().to_string());
        }
        match packet {
            StreamPacket::Started(started) => {
                debug!(
                    conversation = %started.conversation_id,
                    model = ?started.model_id,
                    "Reply started"
                );
            }
            StreamPacket::Delta(delta) => {
                print!("{}", delta.delta);
                io::stdout().flush()?;
            }
            StreamPacket::Completed(completed) => {
                println!();
                if let (Some(input), Some(output)) =
                    (completed.input_tokens, completed.output_tokens)
                {
                    eprintln!("📊 {input} input / {output} output tokens");
                }
            }
            StreamPacket::Error(error) => {
                failure = Some(error.error);
            }
        }
    }
    interrupt.abort();
    if cancel.is_cancelled() {
        eprintln!("\n⏹  Cancelled");
    }

    stream.outcome().await?;

    if let Some(id) = conversation_id.filter(|id| !id.is_empty()) {
        eprintln!("💬 Conversation: {id}");
    }
    if let Some(message) = failure {
        eprintln!("\n❌ Error: {message}");
        std::process::exit(1);
    }
    Ok(())
}
