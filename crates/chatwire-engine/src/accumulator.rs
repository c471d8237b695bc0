//! # Delta accumulation
//!
//! `StreamState` is the turn-private model of the assistant reply. The loop
//! owns it exclusively, folds each chunk payload into it, and derives every
//! store write from it via [`StreamState::snapshot`].

use std::collections::BTreeMap;

use chatwire_core::ids::ToolCallId;
use chatwire_core::messages::{
    render_with_reasoning, ImageRef, Part, ToolCallBlock, ToolInvocationPart, ToolState,
};
use chatwire_core::store::MessageUpdate;
use chatwire_core::stream::{ChunkPayload, ToolCallDelta};
use chatwire_core::usage::Usage;

use crate::executor::ToolExecution;
use crate::images::ImageSlot;

/// A tool call being assembled from streamed fragments.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ToolCallFragment {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

impl ToolCallFragment {
    fn absorb(&mut self, delta: &ToolCallDelta) {
        if self.id.is_empty() {
            if let Some(id) = delta.id.as_deref().filter(|s| !s.is_empty()) {
                self.id = id.to_string();
            }
        }
        if let Some(function) = &delta.function {
            if self.name.is_empty() {
                if let Some(name) = function.name.as_deref().filter(|s| !s.is_empty()) {
                    self.name = name.to_string();
                }
            }
            if let Some(args) = &function.arguments {
                self.arguments.push_str(args);
            }
        }
    }

    fn finalize(self) -> ToolCallBlock {
        let id = if self.id.is_empty() {
            ToolCallId::new()
        } else {
            ToolCallId::from_raw(self.id)
        };
        ToolCallBlock {
            id,
            name: self.name,
            arguments: self.arguments,
        }
    }
}

#[derive(Debug, Default)]
pub struct StreamState {
    content: String,
    reasoning: String,
    /// Images finished in earlier iterations of this turn.
    images: Vec<ImageRef>,
    /// Images of the current response, keyed by their per-response index.
    image_slots: BTreeMap<usize, ImageSlot>,
    parts: Vec<Part>,
    usage: Usage,
    iteration_usage: Option<Usage>,
    /// Byte offset into `content` where text not yet captured in a part begins.
    iteration_content_start: usize,
    tool_calls: BTreeMap<usize, ToolCallFragment>,
}

impl StreamState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one payload in. Returns whether anything a flush would show changed.
    pub fn apply(&mut self, payload: &ChunkPayload) -> bool {
        let mut changed = false;

        if let Some(choice) = payload.choices.first() {
            let delta = &choice.delta;

            if let Some(reasoning) = delta.reasoning_text().filter(|s| !s.is_empty()) {
                self.reasoning.push_str(reasoning);
                changed = true;
            }
            if let Some(content) = delta.content.as_deref().filter(|s| !s.is_empty()) {
                self.content.push_str(content);
                changed = true;
            }
            for (position, image) in delta.images.iter().enumerate() {
                let slot = self.image_slots.entry(image.index_or(position)).or_default();
                changed |= slot.apply(image.url());
            }
            for tc in &delta.tool_calls {
                self.tool_calls.entry(tc.index).or_default().absorb(tc);
            }
        }

        if let Some(usage) = &payload.usage {
            self.iteration_usage = Some(Usage::from(usage));
            changed = true;
        }

        changed
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// Close the current response: merge its usage into the turn total,
    /// keep its images, and hand back its finalized tool calls in index order.
    pub fn finish_iteration(&mut self) -> Vec<ToolCallBlock> {
        if let Some(usage) = self.iteration_usage.take() {
            self.usage.merge(&usage);
        }
        let slots = std::mem::take(&mut self.image_slots);
        self.images.extend(slots.values().map(ImageSlot::to_image_ref));
        std::mem::take(&mut self.tool_calls)
            .into_values()
            .map(ToolCallFragment::finalize)
            .collect()
    }

    /// Text emitted since the last part boundary.
    pub fn text_since_iteration_start(&self) -> &str {
        self.content.get(self.iteration_content_start..).unwrap_or("")
    }

    /// Record finalized tool calls as pending parts, preceded by any text the
    /// model wrote before calling them.
    pub fn record_tool_calls(&mut self, calls: &[ToolCallBlock]) {
        self.push_pending_text();
        self.parts.extend(
            calls
                .iter()
                .map(|c| Part::ToolInvocation(ToolInvocationPart::pending(c))),
        );
        self.iteration_content_start = self.content.len();
    }

    /// Capture trailing text as a part. A turn that never called a tool stays
    /// flat text with no parts at all.
    pub fn close_text_segment(&mut self) {
        if self.parts.is_empty() {
            return;
        }
        self.push_pending_text();
        self.iteration_content_start = self.content.len();
    }

    fn push_pending_text(&mut self) {
        let text = self.text_since_iteration_start().to_string();
        if !text.is_empty() {
            self.parts.push(Part::Text { content: text });
        }
    }

    /// Move the matching tool part to its terminal state.
    pub fn apply_tool_result(&mut self, result: &ToolExecution) -> bool {
        let Some(part) = self.parts.iter_mut().find_map(|p| match p {
            Part::ToolInvocation(t) if t.tool_call_id == result.tool_call_id => Some(t),
            _ => None,
        }) else {
            return false;
        };
        part.output = Some(result.output.clone());
        match &result.error_text {
            Some(text) => {
                part.state = ToolState::OutputError;
                part.error_text = Some(text.clone());
            }
            None => part.state = ToolState::OutputAvailable,
        }
        true
    }

    /// Append a visible note, separated from existing text by a blank line.
    pub fn append_note(&mut self, note: &str) {
        if !self.content.is_empty() {
            self.content.push_str("\n\n");
        }
        self.content.push_str(note);
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// Text as the renderer sees it, with any reasoning wrapped in front.
    pub fn visible_content(&self) -> String {
        render_with_reasoning(&self.reasoning, &self.content)
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    pub fn images(&self) -> Vec<ImageRef> {
        self.images
            .iter()
            .cloned()
            .chain(self.image_slots.values().map(ImageSlot::to_image_ref))
            .collect()
    }

    /// Turn usage including the in-flight response.
    pub fn usage(&self) -> Usage {
        match &self.iteration_usage {
            Some(current) => self.usage.merged(current),
            None => self.usage.clone(),
        }
    }

    /// The store write for the current state.
    pub fn snapshot(&self, streaming: bool) -> MessageUpdate {
        let images = self.images();
        let usage = self.usage();
        MessageUpdate {
            content: self.visible_content(),
            streaming,
            parts: (!self.parts.is_empty()).then(|| self.parts.clone()),
            images: (!images.is_empty()).then_some(images),
            usage: (!usage.is_empty()).then_some(usage),
        }
    }
}
