use async_trait::async_trait;
use byte_common::{Error, MessageHandle, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::traits::{Attachment, MessageSink};

/// One recorded sink operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkOp {
    Sent { handle: MessageHandle, text: String },
    Edited { handle: MessageHandle, text: String },
    Deleted { handle: MessageHandle },
    Files { handle: MessageHandle, files: Vec<Attachment> },
}

/// Process-local sink that records every operation and keeps the current
/// text of each live message. Used by tests and local runs.
pub struct MemorySink {
    channel_id: String,
    ops: Mutex<Vec<SinkOp>>,
    live: Mutex<HashMap<MessageHandle, String>>,
    next_id: AtomicUsize,
    edit_delay: Option<Duration>,
    max_message_chars: Option<usize>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MemorySink {
    pub fn new(channel_id: impl Into<String>) -> Self {
        Self {
            channel_id: channel_id.into(),
            ops: Mutex::new(Vec::new()),
            live: Mutex::new(HashMap::new()),
            next_id: AtomicUsize::new(1),
            edit_delay: None,
            max_message_chars: None,
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Make every edit take `delay`, to observe edit overlap.
    pub fn with_edit_delay(mut self, delay: Duration) -> Self {
        self.edit_delay = Some(delay);
        self
    }

    /// Reject sends and edits longer than `limit` characters, like the
    /// platform does.
    pub fn with_max_message_chars(mut self, limit: usize) -> Self {
        self.max_message_chars = Some(limit);
        self
    }

    pub fn ops(&self) -> Vec<SinkOp> {
        self.ops.lock().map(|ops| ops.clone()).unwrap_or_default()
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SinkOp::Sent { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn edits_of(&self, handle: &MessageHandle) -> Vec<String> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                SinkOp::Edited { handle: h, text } if &h == handle => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn files(&self) -> Vec<Attachment> {
        self.ops()
            .into_iter()
            .flat_map(|op| match op {
                SinkOp::Files { files, .. } => files,
                _ => Vec::new(),
            })
            .collect()
    }

    pub fn was_deleted(&self, handle: &MessageHandle) -> bool {
        self.ops()
            .iter()
            .any(|op| matches!(op, SinkOp::Deleted { handle: h } if h == handle))
    }

    /// Current text of a live (sent, not deleted) message.
    pub fn current_text(&self, handle: &MessageHandle) -> Option<String> {
        self.live.lock().ok()?.get(handle).cloned()
    }

    /// Highest number of edits observed running at the same time.
    pub fn max_concurrent_edits(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn record(&self, op: SinkOp) -> Result<()> {
        self.ops
            .lock()
            .map_err(|_| Error::Channel("memory sink poisoned".into()))?
            .push(op);
        Ok(())
    }

    fn check_length(&self, text: &str) -> Result<()> {
        match self.max_message_chars {
            Some(limit) if text.chars().count() > limit => Err(Error::Channel(format!(
                "message of {} chars exceeds limit of {limit}",
                text.chars().count()
            ))),
            _ => Ok(()),
        }
    }

    fn new_handle(&self) -> MessageHandle {
        MessageHandle::new(format!(
            "{}-{}",
            self.channel_id,
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ))
    }
}

#[async_trait]
impl MessageSink for MemorySink {
    fn channel_id(&self) -> &str {
        &self.channel_id
    }

    async fn send(&self, text: &str) -> Result<MessageHandle> {
        self.check_length(text)?;
        let handle = self.new_handle();
        if let Ok(mut live) = self.live.lock() {
            live.insert(handle.clone(), text.to_string());
        }
        self.record(SinkOp::Sent {
            handle: handle.clone(),
            text: text.to_string(),
        })?;
        Ok(handle)
    }

    async fn edit(&self, handle: &MessageHandle, text: &str) -> Result<()> {
        self.check_length(text)?;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.edit_delay {
            tokio::time::sleep(delay).await;
        }

        let result = match self.live.lock() {
            Ok(mut live) => match live.get_mut(handle) {
                Some(current) => {
                    *current = text.to_string();
                    Ok(())
                }
                None => Err(Error::Channel(format!("unknown message {handle}"))),
            },
            Err(_) => Err(Error::Channel("memory sink poisoned".into())),
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result?;

        self.record(SinkOp::Edited {
            handle: handle.clone(),
            text: text.to_string(),
        })
    }

    async fn delete(&self, handle: &MessageHandle) -> Result<()> {
        if let Ok(mut live) = self.live.lock() {
            live.remove(handle);
        }
        self.record(SinkOp::Deleted {
            handle: handle.clone(),
        })
    }

    async fn send_files(&self, files: Vec<Attachment>) -> Result<MessageHandle> {
        let handle = self.new_handle();
        self.record(SinkOp::Files {
            handle: handle.clone(),
            files,
        })?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_send_edit_delete() {
        let sink = MemorySink::new("chan");
        let handle = sink.send("thinking...").await.unwrap();
        sink.edit(&handle, "partial").await.unwrap();
        sink.edit(&handle, "partial answer").await.unwrap();

        assert_eq!(sink.current_text(&handle).as_deref(), Some("partial answer"));
        assert_eq!(sink.edits_of(&handle), vec!["partial", "partial answer"]);

        sink.delete(&handle).await.unwrap();
        assert!(sink.was_deleted(&handle));
        assert!(sink.current_text(&handle).is_none());
        assert!(sink.edit(&handle, "late").await.is_err());
    }

    #[tokio::test]
    async fn send_file_records_attachment() {
        let sink = MemorySink::new("chan");
        sink.send_file(b"hello".to_vec(), "response.txt").await.unwrap();
        let files = sink.files();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].filename, "response.txt");
        assert_eq!(files[0].bytes, b"hello");
    }

    #[tokio::test]
    async fn length_limit_rejects_long_messages() {
        let sink = MemorySink::new("chan").with_max_message_chars(5);
        assert!(sink.send("123456").await.is_err());
        let handle = sink.send("12345").await.unwrap();
        assert!(sink.edit(&handle, "abcdefg").await.is_err());
        assert_eq!(sink.current_text(&handle).as_deref(), Some("12345"));
    }

    #[tokio::test]
    async fn handles_are_unique() {
        let sink = MemorySink::new("c");
        let a = sink.send("a").await.unwrap();
        let b = sink.send("b").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(sink.channel_id(), "c");
    }
}
