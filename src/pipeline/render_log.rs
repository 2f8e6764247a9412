use std::collections::VecDeque;
use super::message::{DisplayMessage, MessageKind};

pub const DEFAULT_RENDER_WINDOW: usize = 100;

/// Append-only, bounded view of everything the pipeline emitted. The oldest
/// entries fall off once `capacity` is reached.
#[derive(Debug)]
pub struct RenderLog {
    capacity: usize,
    entries: VecDeque<DisplayMessage>,
    dropped: u64,
}

impl RenderLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
            dropped: 0,
        }
    }

    pub fn push(&mut self, message: DisplayMessage) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        self.entries.push_back(message);
    }

    pub fn iter(&self) -> impl Iterator<Item = &DisplayMessage> {
        self.entries.iter()
    }

    pub fn of_kind(&self, kind: MessageKind) -> impl Iterator<Item = &DisplayMessage> {
        self.entries.iter().filter(move |m| m.kind == kind)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.dropped = 0;
    }
}

impl Default for RenderLog {
    fn default() -> Self {
        Self::new(DEFAULT_RENDER_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_drops_oldest() {
        let mut log = RenderLog::new(3);
        for i in 0..5 {
            log.push(DisplayMessage::system(format!("m{}", i)));
        }
        let kept: Vec<_> = log.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(kept, vec!["m2", "m3", "m4"]);
        assert_eq!(log.dropped(), 2);
    }

    #[test]
    fn test_filter_by_kind_keeps_order() {
        let mut log = RenderLog::default();
        log.push(DisplayMessage::system("a"));
        log.push(DisplayMessage::error("b"));
        log.push(DisplayMessage::system("c"));
        let systems: Vec<_> = log.of_kind(MessageKind::System).map(|m| m.content.as_str()).collect();
        assert_eq!(systems, vec!["a", "c"]);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut log = RenderLog::new(0);
        log.push(DisplayMessage::system("only"));
        assert_eq!(log.len(), 1);
    }
}
