//! Conversation listing, paging and history loading.

use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, Months, Utc};
use reqwest::Method;
use tracing::{debug, warn};

use crate::api::conversation::{Conversation, ConversationDetail, TitleRequest};
use crate::core::client::{ApiClient, NO_BODY};
use crate::core::error::ClientResult;
use crate::core::message::DisplayMessage;
use crate::core::reconstruct::reconstruct;
use crate::utils::url::paged_path;

pub const DEFAULT_PAGE_SIZE: usize = 50;

const CONVERSATION_PATH: &str = "/api/conversation";

fn conversation_path(id: &str) -> String {
    format!("{CONVERSATION_PATH}/{id}")
}

impl ApiClient {
    pub async fn list_conversations(
        &self,
        skip: usize,
        take: usize,
    ) -> ClientResult<Vec<Conversation>> {
        self.get_json(&paged_path(CONVERSATION_PATH, skip, take), true)
            .await
    }

    pub async fn get_conversation(&self, id: &str) -> ClientResult<ConversationDetail> {
        self.get_json(&conversation_path(id), true).await
    }

    pub async fn create_conversation(&self, title: &str) -> ClientResult<Conversation> {
        self.send_json(Method::POST, CONVERSATION_PATH, &TitleRequest { title }, true)
            .await
    }

    pub async fn rename_conversation(&self, id: &str, title: &str) -> ClientResult<Conversation> {
        self.send_json(Method::PUT, &conversation_path(id), &TitleRequest { title }, true)
            .await
    }

    pub async fn delete_conversation(&self, id: &str) -> ClientResult<()> {
        self.send_empty(Method::DELETE, &conversation_path(id), NO_BODY, true)
            .await
    }

    /// Fetch a conversation's rows and rebuild them into a display thread.
    pub async fn load_history(&self, id: &str) -> ClientResult<Vec<DisplayMessage>> {
        let mut detail = self.get_conversation(id).await?;
        detail.messages.sort_by_key(|row| row.sequence);
        debug!(conversation = id, rows = detail.messages.len(), "Reconstructing history");
        Ok(reconstruct(&detail.messages))
    }
}

/// The locally cached, paged list of the user's conversations.
#[derive(Debug, Clone)]
pub struct ConversationBook {
    page_size: usize,
    conversations: Vec<Conversation>,
    has_more: bool,
}

impl Default for ConversationBook {
    fn default() -> Self {
        Self::new(DEFAULT_PAGE_SIZE)
    }
}

impl ConversationBook {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            conversations: Vec::new(),
            has_more: true,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Reload the first page. A failed fetch leaves an empty, exhausted book.
    pub async fn refresh(&mut self, client: &ApiClient) {
        match client.list_conversations(0, self.page_size).await {
            Ok(page) => {
                self.has_more = page.len() >= self.page_size;
                self.conversations = page;
            }
            Err(err) => {
                warn!(error = %err, "Failed to load conversations");
                self.conversations.clear();
                self.has_more = false;
            }
        }
    }

    /// Append the next page. Returns how many conversations were added.
    pub async fn load_more(&mut self, client: &ApiClient) -> usize {
        if !self.has_more {
            return 0;
        }
        match client
            .list_conversations(self.conversations.len(), self.page_size)
            .await
        {
            Ok(page) => {
                let added = page.len();
                self.has_more = added >= self.page_size;
                self.conversations.extend(page);
                added
            }
            Err(err) => {
                debug!(error = %err, "Failed to load more conversations");
                0
            }
        }
    }

    /// Delete remotely, then drop the local entry whether or not the backend
    /// accepted the delete.
    pub async fn remove(&mut self, client: &ApiClient, id: &str) {
        if let Err(err) = client.delete_conversation(id).await {
            debug!(conversation = id, error = %err, "Remote delete failed");
        }
        self.conversations.retain(|conversation| conversation.id != id);
    }

    /// Replace the conversation with the same id, or put it first.
    pub fn upsert(&mut self, conversation: Conversation) {
        match self
            .conversations
            .iter_mut()
            .find(|existing| existing.id == conversation.id)
        {
            Some(existing) => *existing = conversation,
            None => self.conversations.insert(0, conversation),
        }
    }

    pub fn find_by_external_id(&self, external_id: &str) -> Option<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.external_conversation_id == external_id)
    }

    /// Conversations ordered by most recent activity first.
    pub fn sorted(&self) -> Vec<&Conversation> {
        let mut sorted: Vec<&Conversation> = self.conversations.iter().collect();
        sorted.sort_by_key(|conversation| std::cmp::Reverse(conversation.activity_at()));
        sorted
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConversationGroup {
    pub id: String,
    pub label: String,
    pub items: Vec<Conversation>,
}

impl ConversationGroup {
    fn new(id: impl Into<String>, label: impl Into<String>, items: Vec<Conversation>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            items,
        }
    }
}

/// Bucket conversations into Today, Yesterday, Last week, Last month and
/// then one group per calendar month, newest first. Empty buckets are omitted.
pub fn group_by_recency(conversations: &[Conversation], now: DateTime<Utc>) -> Vec<ConversationGroup> {
    let today = now.date_naive();
    let yesterday = today.pred_opt();
    let week_ago = now - Duration::days(7);
    let month_ago = now.checked_sub_months(Months::new(1)).unwrap_or(week_ago);

    let mut today_items = Vec::new();
    let mut yesterday_items = Vec::new();
    let mut week_items = Vec::new();
    let mut month_items = Vec::new();
    let mut older: BTreeMap<(i32, u32), Vec<Conversation>> = BTreeMap::new();

    for conversation in conversations {
        let at = conversation.activity_at();
        let day = at.date_naive();
        if day == today {
            today_items.push(conversation.clone());
        } else if Some(day) == yesterday {
            yesterday_items.push(conversation.clone());
        } else if at >= week_ago {
            week_items.push(conversation.clone());
        } else if at >= month_ago {
            month_items.push(conversation.clone());
        } else {
            older
                .entry((at.year(), at.month()))
                .or_default()
                .push(conversation.clone());
        }
    }

    let mut groups = Vec::new();
    for (id, label, items) in [
        ("today", "Today", today_items),
        ("yesterday", "Yesterday", yesterday_items),
        ("last-week", "Last week", week_items),
        ("last-month", "Last month", month_items),
    ] {
        if !items.is_empty() {
            groups.push(ConversationGroup::new(id, label, items));
        }
    }
    for ((year, month), items) in older.into_iter().rev() {
        let label = items[0].activity_at().format("%B %Y").to_string();
        groups.push(ConversationGroup::new(
            format!("{year:04}-{month:02}"),
            label,
            items,
        ));
    }
    groups
}
