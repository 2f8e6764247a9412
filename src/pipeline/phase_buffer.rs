use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::debug;
use super::message::DisplayMessage;

#[derive(Debug)]
struct Buffered {
    message: DisplayMessage,
    buffered_at: Instant,
}

/// Holds messages of the phase in progress until that phase is released.
///
/// `current` is the highest released phase. Messages at or below it pass
/// straight through; messages of `current + 1` wait in the buffer; a message
/// from any later phase releases everything in between first.
///
/// Every phase up to `current` counts as completed and flushed, and only
/// phases above it ever hold a buffer, so no phase is flushed twice.
#[derive(Debug, Default)]
pub struct PhaseBuffer {
    current: u32,
    buffers: BTreeMap<u32, Vec<Buffered>>,
}

impl PhaseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_phase(&self) -> u32 {
        self.current
    }

    pub fn is_flushed(&self, phase: u32) -> bool {
        phase > 0 && phase <= self.current
    }

    pub fn is_completed(&self, phase: u32) -> bool {
        self.is_flushed(phase)
    }

    pub fn pending(&self, phase: u32) -> usize {
        self.buffers.get(&phase).map_or(0, Vec::len)
    }

    pub fn pending_total(&self) -> usize {
        self.buffers.values().map(Vec::len).sum()
    }

    /// Admit one message. Returns whatever becomes displayable, in order.
    ///
    /// `since` is when the message first entered the pipeline; staleness is
    /// measured from it even if another gate held the message first. A
    /// message with empty content is a bare completion marker: it can
    /// release a phase but is never displayed itself.
    pub fn admit(
        &mut self,
        message: DisplayMessage,
        is_phase_complete: bool,
        since: Instant,
    ) -> Vec<DisplayMessage> {
        let mut out = Vec::new();
        let displayable = !message.content.trim().is_empty();

        let phase = match message.phase_order {
            None | Some(0) => {
                if displayable {
                    out.push(message);
                }
                return out;
            }
            Some(p) => p,
        };

        if phase > self.current.saturating_add(1) {
            debug!(from = self.current, to = phase - 1, "Look-ahead phase advance");
            self.advance_to(phase - 1, &mut out);
        }

        if phase <= self.current {
            if displayable {
                out.push(message);
            }
            return out;
        }

        if displayable {
            self.buffers.entry(phase).or_default().push(Buffered {
                message,
                buffered_at: since,
            });
        }
        if is_phase_complete {
            debug!(phase, "Phase complete signal");
            self.advance_to(phase, &mut out);
        }
        out
    }

    /// Release every held phase in order.
    pub fn release_all(&mut self) -> Vec<DisplayMessage> {
        let mut out = Vec::new();
        if let Some(last) = self.buffers.keys().next_back().copied() {
            self.advance_to(last, &mut out);
        }
        out
    }

    /// Release up to the latest phase holding a message older than `threshold`.
    pub fn release_stale(&mut self, now: Instant, threshold: Duration) -> Vec<DisplayMessage> {
        let mut out = Vec::new();
        let stale = self
            .buffers
            .iter()
            .filter(|(_, held)| {
                held.iter()
                    .any(|b| now.saturating_duration_since(b.buffered_at) >= threshold)
            })
            .map(|(phase, _)| *phase)
            .next_back();
        if let Some(phase) = stale {
            debug!(phase, "Releasing stale phase buffer");
            self.advance_to(phase, &mut out);
        }
        out
    }

    fn advance_to(&mut self, target: u32, out: &mut Vec<DisplayMessage>) {
        if target <= self.current {
            return;
        }
        // empty phases in between need no work, however wide the jump
        while let Some(entry) = self.buffers.first_entry() {
            if *entry.key() > target {
                break;
            }
            let mut held = entry.remove();
            // stable: equal node orders keep arrival order
            held.sort_by_key(|b| b.message.node_order.unwrap_or(0));
            out.extend(held.into_iter().map(|b| b.message));
        }
        self.current = target;
    }
}
