//! # Image fragment reconstruction
//!
//! Gateways stream generated images as `image_url` chunks keyed by index.
//! A chunk is one of three shapes, and the checks must run in this order:
//!
//! 1. a self-contained URL (`https://...`, `/api/v1/attachments/...`):
//!    replaces the slot and completes it
//! 2. a `data:image/` header when the slot already holds data: a new image
//!    restarting at the header
//! 3. anything else: a base64 continuation appended to the buffer
//!
//! A data URI is a strict subset of possible chunk shapes, so testing it
//! before URL completeness would corrupt attachment links.

use chatwire_core::messages::ImageRef;

/// Prefixes that mark a chunk as a complete, self-contained reference.
pub const COMPLETE_URL_PREFIXES: &[&str] = &[
    "http://",
    "https://",
    "/api/v1/attachments/",
    "attachment://",
];

pub const DATA_URI_HEADER: &str = "data:image/";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImagePhase {
    /// Nothing received yet.
    Fresh,
    /// Accumulating a data URI.
    Continuing,
    /// Holds a complete URL; continuations are ignored.
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChunkKind {
    CompleteUrl,
    /// Restart at this byte offset into the chunk.
    DataUriRestart(usize),
    Continuation,
}

/// Classify one chunk against the slot's current buffer.
pub fn classify(chunk: &str, existing: &str) -> ChunkKind {
    let trimmed = chunk.trim_start();
    if COMPLETE_URL_PREFIXES.iter().any(|p| trimmed.starts_with(p)) {
        return ChunkKind::CompleteUrl;
    }
    if !existing.is_empty() {
        if let Some(offset) = chunk.find(DATA_URI_HEADER) {
            return ChunkKind::DataUriRestart(offset);
        }
    }
    ChunkKind::Continuation
}

/// One image under construction.
#[derive(Clone, Debug)]
pub struct ImageSlot {
    url: String,
    phase: ImagePhase,
}

impl Default for ImageSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSlot {
    pub fn new() -> Self {
        Self {
            url: String::new(),
            phase: ImagePhase::Fresh,
        }
    }

    pub fn phase(&self) -> ImagePhase {
        self.phase
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fold one chunk in. Returns whether the URL changed.
    pub fn apply(&mut self, chunk: &str) -> bool {
        if chunk.is_empty() {
            return false;
        }
        match classify(chunk, &self.url) {
            ChunkKind::CompleteUrl => {
                let url = chunk.trim_start();
                if self.phase == ImagePhase::Complete && self.url == url {
                    return false;
                }
                self.url = url.to_string();
                self.phase = ImagePhase::Complete;
            }
            ChunkKind::DataUriRestart(offset) => {
                self.url = chunk[offset..].to_string();
                self.phase = ImagePhase::Continuing;
            }
            ChunkKind::Continuation => {
                if self.phase == ImagePhase::Complete {
                    return false;
                }
                self.url.push_str(chunk);
                self.phase = ImagePhase::Continuing;
            }
        }
        true
    }

    pub fn to_image_ref(&self) -> ImageRef {
        ImageRef { url: self.url.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_url_is_complete() {
        let mut slot = ImageSlot::new();
        assert!(slot.apply("/api/v1/attachments/abc"));
        assert_eq!(slot.url(), "/api/v1/attachments/abc");
        assert_eq!(slot.phase(), ImagePhase::Complete);
    }

    #[test]
    fn complete_url_ignores_continuations() {
        let mut slot = ImageSlot::new();
        slot.apply("https://cdn.example/img.png");
        assert!(!slot.apply("iVBORw0KGgo"));
        assert_eq!(slot.url(), "https://cdn.example/img.png");
    }

    #[test]
    fn leading_whitespace_before_url_is_trimmed() {
        let mut slot = ImageSlot::new();
        slot.apply("data:image/png;base64,AAA");
        slot.apply("  https://cdn.example/x.png");
        assert_eq!(slot.url(), "https://cdn.example/x.png");
        assert_eq!(slot.phase(), ImagePhase::Complete);
    }

    #[test]
    fn data_uri_accumulates_continuations() {
        let mut slot = ImageSlot::new();
        slot.apply("data:image/png;base64,iVBOR");
        slot.apply("w0KGgo");
        slot.apply("AAAA");
        assert_eq!(slot.url(), "data:image/png;base64,iVBORw0KGgoAAAA");
        assert_eq!(slot.phase(), ImagePhase::Continuing);
    }

    #[test]
    fn data_uri_header_restarts_non_empty_slot() {
        let mut slot = ImageSlot::new();
        slot.apply("data:image/png;base64,OLD");
        slot.apply("junk data:image/jpeg;base64,NEW");
        assert_eq!(slot.url(), "data:image/jpeg;base64,NEW");
    }

    #[test]
    fn header_on_empty_slot_is_plain_append() {
        assert_eq!(classify("data:image/png;base64,A", ""), ChunkKind::Continuation);
        assert_eq!(
            classify("xx data:image/png;base64,A", "data:image/gif;base64,B"),
            ChunkKind::DataUriRestart(3)
        );
    }

    #[test]
    fn url_check_wins_over_data_uri() {
        assert_eq!(
            classify("https://x/?q=data:image/png", "data:image/png;base64,A"),
            ChunkKind::CompleteUrl
        );
    }

    #[test]
    fn tiny_single_chunk_still_yields_ref() {
        let mut slot = ImageSlot::new();
        assert!(slot.apply("A"));
        assert_eq!(slot.to_image_ref().url, "A");
    }

    #[test]
    fn empty_chunk_is_no_change() {
        let mut slot = ImageSlot::new();
        assert!(!slot.apply(""));
        assert_eq!(slot.phase(), ImagePhase::Fresh);
    }
}
