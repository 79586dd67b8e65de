//! Streaming chat client.
//!
//! A chat message is POSTed to `/api/chat/stream` and the reply arrives as
//! server-sent events. [`SseDecoder`] turns body chunks into packets no
//! matter where the chunks split, and [`ApiClient::stream_chat`] runs the
//! request on its own task, dispatching each packet to a [`StreamHandler`]
//! until the stream closes or is cancelled. Cancelling never touches the
//! stored session or a token refresh already under way.

use futures_util::StreamExt;
use memchr::memchr;
use reqwest::Method;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::api::{
    ChatRequest, CompletedPacket, DeltaPacket, ErrorPacket, StartedPacket, StreamPacket,
};
use crate::core::client::{error_details, ApiClient};
use crate::core::error::ClientResult;

const CHAT_STREAM_PATH: &str = "/api/chat/stream";
const EVENT_STREAM: &str = "text/event-stream";

/// Receives the packets of one chat stream, in arrival order.
pub trait StreamHandler: Send {
    fn on_started(&mut self, _packet: StartedPacket) {}
    fn on_delta(&mut self, _packet: DeltaPacket) {}
    fn on_completed(&mut self, _packet: CompletedPacket) {}
    fn on_error(&mut self, _packet: ErrorPacket) {}
}

impl StreamHandler for mpsc::UnboundedSender<StreamPacket> {
    fn on_started(&mut self, packet: StartedPacket) {
        let _ = self.send(StreamPacket::Started(packet));
    }

    fn on_delta(&mut self, packet: DeltaPacket) {
        let _ = self.send(StreamPacket::Delta(packet));
    }

    fn on_completed(&mut self, packet: CompletedPacket) {
        let _ = self.send(StreamPacket::Completed(packet));
    }

    fn on_error(&mut self, packet: ErrorPacket) {
        let _ = self.send(StreamPacket::Error(packet));
    }
}

pub fn dispatch<H: StreamHandler + ?Sized>(packet: StreamPacket, handler: &mut H) {
    match packet {
        StreamPacket::Started(packet) => handler.on_started(packet),
        StreamPacket::Delta(packet) => handler.on_delta(packet),
        StreamPacket::Completed(packet) => handler.on_completed(packet),
        StreamPacket::Error(packet) => handler.on_error(packet),
    }
}

fn extract_data_payload(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

/// Parse one SSE line into a packet.
///
/// Blank lines, `event:` lines, non-`data:` lines, `[DONE]`, empty payloads
/// and payloads that are not a known packet all yield `None`.
pub fn parse_sse_line(line: &str) -> Option<StreamPacket> {
    let line = line.trim();
    if line.is_empty() || line.starts_with("event:") {
        return None;
    }
    let payload = extract_data_payload(line)?;
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }
    match serde_json::from_str::<StreamPacket>(payload) {
        Ok(packet) => Some(packet),
        Err(err) => {
            trace!(error = %err, "Dropping unparseable stream line");
            None
        }
    }
}

/// Incremental UTF-8 decoding that carries incomplete sequences over to the
/// next chunk. Invalid sequences decode to U+FFFD.
#[derive(Debug, Default)]
struct Utf8Decoder {
    pending: Vec<u8>,
}

impl Utf8Decoder {
    fn decode_into(&mut self, chunk: &[u8], out: &mut String) {
        self.pending.extend_from_slice(chunk);
        let mut start = 0;
        while start < self.pending.len() {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(text) => {
                    out.push_str(text);
                    start = self.pending.len();
                }
                Err(err) => {
                    let valid_end = start + err.valid_up_to();
                    out.push_str(&String::from_utf8_lossy(&self.pending[start..valid_end]));
                    match err.error_len() {
                        Some(invalid_len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            start = valid_end + invalid_len;
                        }
                        None => {
                            start = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..start);
    }
}

/// Turns raw body chunks into packets, independent of chunk boundaries.
#[derive(Debug, Default)]
pub struct SseDecoder {
    utf8: Utf8Decoder,
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk and return the packets of every line it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<StreamPacket> {
        self.utf8.decode_into(chunk, &mut self.buffer);

        let mut packets = Vec::new();
        let mut consumed = 0;
        while let Some(offset) = memchr(b'\n', &self.buffer.as_bytes()[consumed..]) {
            let line = &self.buffer[consumed..consumed + offset];
            if let Some(packet) = parse_sse_line(line) {
                packets.push(packet);
            }
            consumed += offset + 1;
        }
        self.buffer.drain(..consumed);
        packets
    }

    /// Parse whatever is left after the body ended. Only a closing packet
    /// (`completed` or `error`) is accepted from an unterminated line.
    pub fn finish(self) -> Option<StreamPacket> {
        parse_sse_line(&self.buffer).filter(StreamPacket::is_terminal)
    }
}

/// A chat stream running in the background.
pub struct ChatStream {
    cancel: CancellationToken,
    task: JoinHandle<ClientResult<()>>,
}

impl ChatStream {
    /// Abort the transport. No further packets are dispatched.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for the stream to finish.
    ///
    /// Server-side failures were already delivered as `error` packets; this
    /// only fails on transport errors.
    pub async fn outcome(self) -> ClientResult<()> {
        match self.task.await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(_) => Ok(()),
        }
    }
}

impl ApiClient {
    /// POST a chat message and stream the reply into `handler`.
    pub fn stream_chat<H>(&self, request: ChatRequest, handler: H) -> ChatStream
    where
        H: StreamHandler + 'static,
    {
        let cancel = CancellationToken::new();
        let cancel_token = cancel.clone();
        let client = self.clone();

        let task = tokio::spawn(async move {
            let mut handler = handler;
            tokio::select! {
                biased;
                _ = cancel_token.cancelled() => {
                    debug!("Chat stream cancelled");
                    Ok(())
                }
                result = client.run_chat_stream(&request, &mut handler, &cancel_token) => result,
            }
        });

        ChatStream { cancel, task }
    }

    async fn run_chat_stream<H: StreamHandler>(
        &self,
        request: &ChatRequest,
        handler: &mut H,
        cancel: &CancellationToken,
    ) -> ClientResult<()> {
        let response = match self
            .execute(
                Method::POST,
                CHAT_STREAM_PATH,
                Some(request),
                Some(EVENT_STREAM),
                true,
            )
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_auth_failure() => {
                handler.on_error(ErrorPacket::synthesized(err.to_string()));
                return Ok(());
            }
            Err(err) => return Err(err),
        };

        if !response.status().is_success() {
            let (status, message) = error_details(response).await;
            debug!(status, "Chat stream rejected");
            handler.on_error(ErrorPacket::synthesized(message));
            return Ok(());
        }

        debug!(
            conversation_id = request.conversation_id.as_deref().unwrap_or("<new>"),
            "Chat stream connected"
        );
        let mut body = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for packet in decoder.push(&chunk) {
                if cancel.is_cancelled() {
                    return Ok(());
                }
                dispatch(packet, handler);
            }
        }

        if cancel.is_cancelled() {
            return Ok(());
        }
        if let Some(packet) = decoder.finish() {
            dispatch(packet, handler);
        }
        debug!("Chat stream finished");
        Ok(())
    }
}
