use crate::stream::PlayableHandle;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    Pending,
    Streaming,
    Ready,
    Error,
}

impl fmt::Display for SegmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SegmentStatus::Pending => "pending",
            SegmentStatus::Streaming => "streaming",
            SegmentStatus::Ready => "ready",
            SegmentStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// One independently synthesized unit of audio, such as a slide's narration.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    pub index: usize,
    pub source_text: String,
    pub status: SegmentStatus,
    pub handle: Option<PlayableHandle>,
    pub error: Option<String>,
}

impl Segment {
    pub fn new(index: usize, source_text: impl Into<String>) -> Self {
        Self {
            index,
            source_text: source_text.into(),
            status: SegmentStatus::Pending,
            handle: None,
            error: None,
        }
    }
}

/// Shared, ordered list of segments.
///
/// Producers publish buffers into it; the sequencer reads it. Clones share
/// the same table.
#[derive(Debug, Clone, Default)]
pub struct SegmentTable {
    segments: Arc<RwLock<Vec<Segment>>>,
}

impl SegmentTable {
    pub fn new(segments: Vec<Segment>) -> Self {
        Self {
            segments: Arc::new(RwLock::new(segments)),
        }
    }

    /// Creates `count` pending segments with empty source text.
    pub fn with_len(count: usize) -> Self {
        Self::new((0..count).map(|i| Segment::new(i, String::new())).collect())
    }

    pub fn from_texts<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            texts
                .into_iter()
                .enumerate()
                .map(|(i, text)| Segment::new(i, text))
                .collect(),
        )
    }

    pub async fn len(&self) -> usize {
        self.segments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.segments.read().await.is_empty()
    }

    pub async fn get(&self, index: usize) -> Option<Segment> {
        self.segments.read().await.get(index).cloned()
    }

    pub async fn snapshot(&self) -> Vec<Segment> {
        self.segments.read().await.clone()
    }

    /// Mark a pending segment as being synthesized.
    pub async fn mark_streaming(&self, index: usize) -> bool {
        let mut segments = self.segments.write().await;
        match segments.get_mut(index) {
            Some(segment) if segment.status == SegmentStatus::Pending => {
                segment.status = SegmentStatus::Streaming;
                true
            }
            _ => false,
        }
    }

    /// Store a new buffer snapshot for `index`.
    ///
    /// A final snapshot makes the segment ready. Older versions and updates
    /// to failed segments are ignored.
    pub async fn publish(&self, index: usize, handle: PlayableHandle) -> bool {
        let mut segments = self.segments.write().await;
        let Some(segment) = segments.get_mut(index) else {
            return false;
        };
        if segment.status == SegmentStatus::Error {
            return false;
        }
        if let Some(current) = &segment.handle
            && current.version >= handle.version
        {
            return false;
        }
        segment.status = if handle.is_final {
            SegmentStatus::Ready
        } else {
            SegmentStatus::Streaming
        };
        segment.handle = Some(handle);
        true
    }

    pub async fn mark_error(&self, index: usize, message: impl Into<String>) -> bool {
        let mut segments = self.segments.write().await;
        match segments.get_mut(index) {
            Some(segment) => {
                segment.status = SegmentStatus::Error;
                segment.error = Some(message.into());
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::AudioFormat;

    fn handle(version: u64, is_final: bool) -> PlayableHandle {
        let mut handle = PlayableHandle::from_complete(vec![0u8; 1_600], AudioFormat::Mp3);
        handle.version = version;
        handle.is_final = is_final;
        handle
    }

    #[tokio::test]
    async fn test_segments_start_pending() {
        let table = SegmentTable::from_texts(["one", "two"]);
        assert_eq!(table.len().await, 2);

        let segment = table.get(1).await.unwrap();
        assert_eq!(segment.index, 1);
        assert_eq!(segment.source_text, "two");
        assert_eq!(segment.status, SegmentStatus::Pending);
    }

    #[tokio::test]
    async fn test_publish_progresses_to_ready() {
        let table = SegmentTable::with_len(1);
        assert!(table.mark_streaming(0).await);
        assert!(table.publish(0, handle(1, false)).await);
        assert_eq!(table.get(0).await.unwrap().status, SegmentStatus::Streaming);

        assert!(table.publish(0, handle(2, true)).await);
        assert_eq!(table.get(0).await.unwrap().status, SegmentStatus::Ready);
    }

    #[tokio::test]
    async fn test_publish_ignores_older_versions() {
        let table = SegmentTable::with_len(1);
        table.publish(0, handle(3, true)).await;

        assert!(!table.publish(0, handle(2, false)).await);
        let segment = table.get(0).await.unwrap();
        assert_eq!(segment.handle.unwrap().version, 3);
        assert_eq!(segment.status, SegmentStatus::Ready);
    }

    #[tokio::test]
    async fn test_error_is_sticky() {
        let table = SegmentTable::with_len(1);
        table.mark_error(0, "fetch failed").await;

        assert!(!table.publish(0, handle(1, true)).await);
        let segment = table.get(0).await.unwrap();
        assert_eq!(segment.status, SegmentStatus::Error);
        assert_eq!(segment.error.as_deref(), Some("fetch failed"));
    }

    #[tokio::test]
    async fn test_out_of_range_updates_are_rejected() {
        let table = SegmentTable::with_len(1);
        assert!(!table.publish(5, handle(1, true)).await);
        assert!(!table.mark_error(5, "x").await);
        assert!(!table.mark_streaming(5).await);
        assert!(table.get(5).await.is_none());
    }

    #[tokio::test]
    async fn test_clones_share_table() {
        let table = SegmentTable::with_len(2);
        let producer = table.clone();
        producer.publish(1, handle(1, true)).await;
        assert_eq!(table.get(1).await.unwrap().status, SegmentStatus::Ready);
    }
}
