//! Content deduplication

use crate::clipboard::ContentKind;
use bytes::Bytes;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct LastSeen {
    content: Bytes,
    kind: Option<ContentKind>,
}

/// Remembers the last clipboard value the hub has seen, from any source.
///
/// The compare and the update happen under one lock, so when two peers
/// deliver the same update at the same time only one of them wins.
#[derive(Debug, Default)]
pub struct ContentGuard {
    last: Mutex<LastSeen>,
}

impl ContentGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` and records `(content, kind)` when it differs from the
    /// last value seen; returns `false` and leaves the state alone otherwise.
    pub fn is_new_content(&self, content: &Bytes, kind: ContentKind) -> bool {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());

        if last.kind == Some(kind) && last.content == *content {
            return false;
        }

        last.content = content.clone();
        last.kind = Some(kind);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    #[test]
    fn test_repeat_is_not_new() {
        let guard = ContentGuard::new();
        let hello = Bytes::from_static(b"hello");

        assert!(guard.is_new_content(&hello, ContentKind::Text));
        assert!(!guard.is_new_content(&hello, ContentKind::Text));
    }

    #[test]
    fn test_only_last_value_is_remembered() {
        let guard = ContentGuard::new();
        let a = Bytes::from_static(b"a");
        let b = Bytes::from_static(b"b");

        assert!(guard.is_new_content(&a, ContentKind::Text));
        assert!(guard.is_new_content(&b, ContentKind::Text));
        assert!(guard.is_new_content(&a, ContentKind::Text));
    }

    #[test]
    fn test_same_bytes_different_kind_is_new() {
        let guard = ContentGuard::new();
        let data = Bytes::from_static(b"\x89PNG");

        assert!(guard.is_new_content(&data, ContentKind::Text));
        assert!(guard.is_new_content(&data, ContentKind::Image));
        assert!(!guard.is_new_content(&data, ContentKind::Image));
    }

    #[test]
    fn test_empty_content_first_time_is_new() {
        let guard = ContentGuard::new();
        assert!(guard.is_new_content(&Bytes::new(), ContentKind::Text));
        assert!(!guard.is_new_content(&Bytes::new(), ContentKind::Text));
    }

    #[test]
    fn test_concurrent_identical_updates_admit_one() {
        let guard = Arc::new(ContentGuard::new());
        guard.is_new_content(&Bytes::from_static(b"before"), ContentKind::Text);

        let threads = 16;
        let barrier = Arc::new(Barrier::new(threads));
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let barrier = Arc::clone(&barrier);
                let admitted = Arc::clone(&admitted);
                std::thread::spawn(move || {
                    barrier.wait();
                    if guard.is_new_content(&Bytes::from_static(b"after"), ContentKind::Text) {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }

    proptest! {
        #[test]
        fn prop_second_identical_call_is_rejected(
            content in proptest::collection::vec(any::<u8>(), 0..256),
            is_image in any::<bool>(),
        ) {
            let guard = ContentGuard::new();
            let content = Bytes::from(content);
            let kind = ContentKind::from_is_image(is_image);

            prop_assert!(guard.is_new_content(&content, kind));
            prop_assert!(!guard.is_new_content(&content, kind));
        }
    }
}
