//! Conversation browsing commands

use std::error::Error;

use chrono::{Local, Utc};

use crate::api::Conversation;
use crate::core::catalog::ToolNames;
use crate::core::client::ApiClient;
use crate::core::conversations::{group_by_recency, ConversationBook};
use crate::core::message::{DisplayMessage, DisplayRole, MessagePart};

pub struct ListOptions {
    pub page_size: usize,
    pub all: bool,
    pub grouped: bool,
}

fn format_conversation(conversation: &Conversation) -> String {
    let when = conversation
        .activity_at()
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M");
    let title = if conversation.title.is_empty() {
        "(untitled)"
    } else {
        conversation.title.as_str()
    };
    format!("{}  {when}  {title}", conversation.id)
}

pub async fn list_conversations(
    client: &ApiClient,
    options: ListOptions,
) -> Result<(), Box<dyn Error>> {
    if !client.is_logged_in() {
        return Err("Not signed in. Run 'chatwire login' first.".into());
    }

    let mut book = ConversationBook::new(options.page_size);
    book.refresh(client).await;
    if options.all {
        while book.has_more() && book.load_more(client).await > 0 {}
    }

    if book.conversations().is_empty() {
        println!("No conversations.");
        return Ok(());
    }

    if options.grouped {
        for group in group_by_recency(book.conversations(), Utc::now()) {
            println!("{}", group.label);
            for conversation in &group.items {
                println!("  {}", format_conversation(conversation));
            }
            println!();
        }
    } else {
        for conversation in book.sorted() {
            println!("{}", format_conversation(conversation));
        }
    }

    if book.has_more() {
        eprintln!("… more available (use --all)");
    }
    Ok(())
}

fn render_message(message: &DisplayMessage, tools: &ToolNames) -> Vec<String> {
    let speaker = match message.role {
        DisplayRole::User => "You",
        DisplayRole::Assistant => "Assistant",
    };
    let mut lines = vec![format!("{speaker}:")];
    for part in &message.parts {
        match part {
            MessagePart::Text { text } => {
                lines.extend(text.lines().map(|line| format!("  {line}")));
            }
            MessagePart::ToolInvocation(invocation) => {
                let result = match &invocation.result {
                    Some(serde_json::Value::String(text)) => text.clone(),
                    Some(value) => value.to_string(),
                    None => "(no result)".to_string(),
                };
                lines.push(format!(
                    "  🔧 {} {} → {}",
                    tools.resolve(&invocation.tool_name),
                    invocation.arguments,
                    result
                ));
            }
        }
    }
    lines
}

pub async fn print_history(client: &ApiClient, conversation: &str) -> Result<(), Box<dyn Error>> {
    let thread = client.load_history(conversation).await?;
    if thread.is_empty() {
        println!("(no messages)");
        return Ok(());
    }

    let tools = if thread.iter().any(DisplayMessage::has_tool_invocation) {
        client.tool_names().await
    } else {
        ToolNames::default()
    };
    for message in &thread {
        for line in render_message(message, &tools) {
            println!("{line}");
        }
        println!();
    }
    Ok(())
}

pub async fn create(client: &ApiClient, title: &str) -> Result<(), Box<dyn Error>> {
    let conversation = client.create_conversation(title).await?;
    println!("✅ Created {}", format_conversation(&conversation));
    Ok(())
}

pub async fn rename(client: &ApiClient, conversation: &str, title: &str) -> Result<(), Box<dyn Error>> {
    let conversation = client.rename_conversation(conversation, title).await?;
    println!("✅ Renamed {}", format_conversation(&conversation));
    Ok(())
}

pub async fn delete(client: &ApiClient, conversation: &str) -> Result<(), Box<dyn Error>> {
    client.delete_conversation(conversation).await?;
    println!("✅ Deleted {conversation}");
    Ok(())
}

pub async fn print_usage(client: &ApiClient, conversation: &str) -> Result<(), Box<dyn Error>> {
    let usage = client.usage_for_conversation(conversation).await;
    if usage.is_empty() {
        println!("No usage recorded for {conversation}.");
        return Ok(());
    }

    let mut total = 0;
    for invocation in &usage {
        let tokens = &invocation.tokens;
        let count = tokens.total_token_count.unwrap_or_else(|| {
            tokens.input_token_count.unwrap_or(0) + tokens.output_token_count.unwrap_or(0)
        });
        total += count;
        println!(
            "{}  {:>7} tokens  {}",
            invocation.chat_message_external_id,
            count,
            tokens.model_id.as_deref().unwrap_or("-")
        );
    }
    println!("Total: {total} tokens across {} replies", usage.len());
    Ok(())
}
