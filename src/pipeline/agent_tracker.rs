use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use crate::agents::registry::{execution_index, AgentRole, AGENT_EXECUTION_ORDER};
use crate::events::AgentStatus;
use super::message::DisplayMessage;

pub const DEFAULT_STARVATION_TICK: Duration = Duration::from_secs(10);
pub const DEFAULT_STARVATION_THRESHOLD: Duration = Duration::from_secs(30);

/// A message on its way to the phase gate, together with the phase
/// completion flag it carried on arrival and the instant it arrived.
#[derive(Debug, Clone)]
pub struct GatedMessage {
    pub message: DisplayMessage,
    pub is_phase_complete: bool,
    pub received_at: Instant,
}

/// Lets exactly one agent speak at a time and holds everyone else's
/// messages until their turn.
#[derive(Debug)]
pub struct AgentTracker {
    team: Vec<AgentRole>,
    active: Option<AgentRole>,
    processing_label: Option<&'static str>,
    // AgentRole's Ord follows execution order, so iteration is in turn order.
    buffers: BTreeMap<AgentRole, VecDeque<GatedMessage>>,
}

impl AgentTracker {
    pub fn new(team: Vec<AgentRole>) -> Self {
        Self {
            team,
            active: None,
            processing_label: None,
            buffers: BTreeMap::new(),
        }
    }

    pub fn active(&self) -> Option<AgentRole> {
        self.active
    }

    pub fn processing_label(&self) -> Option<&'static str> {
        self.processing_label
    }

    pub fn team(&self) -> &[AgentRole] {
        &self.team
    }

    pub fn buffered(&self, role: AgentRole) -> usize {
        self.buffers.get(&role).map_or(0, VecDeque::len)
    }

    pub fn buffered_total(&self) -> usize {
        self.buffers.values().map(VecDeque::len).sum()
    }

    /// Gate a message from `role`. `None` means the sender is not a known
    /// agent; such messages are never held back.
    pub fn on_message(&mut self, role: Option<AgentRole>, gated: GatedMessage) -> Option<GatedMessage> {
        let role = match role {
            Some(role) => role,
            None => return Some(gated),
        };
        if self.active == Some(role) {
            return Some(gated);
        }
        debug!(agent = %role, "Buffering message from inactive agent");
        self.buffers.entry(role).or_default().push_back(gated);
        None
    }

    pub fn on_status(&mut self, role: AgentRole, status: AgentStatus) -> Vec<GatedMessage> {
        let mut out = Vec::new();
        match status {
            AgentStatus::Idle => {}
            AgentStatus::Processing => {
                if self.active != Some(role) {
                    if let Some(previous) = self.active {
                        self.drain(previous, &mut out);
                    }
                    info!(agent = %role, "Agent active");
                    self.active = Some(role);
                }
                self.processing_label = Some(role.display_name());
                self.drain(role, &mut out);
            }
            AgentStatus::Completed => {
                self.drain(role, &mut out);
                self.processing_label = None;
                if self.active.is_some() && self.active != Some(role) {
                    // a late completion for someone else does not move the floor
                    return out;
                }
                match self.next_in_phase(role) {
                    Some(next) => {
                        debug!(from = %role, to = %next, "Handing floor to next agent");
                        self.active = Some(next);
                        self.drain(next, &mut out);
                    }
                    None => {
                        debug!(agent = %role, "Phase boundary reached");
                        self.active = None;
                        if let Some(next) = self.first_of_next_phase(role) {
                            if self.buffered(next) > 0 {
                                info!(agent = %next, "Early activation of next phase");
                                self.active = Some(next);
                                self.drain(next, &mut out);
                            }
                        }
                    }
                }
            }
        }
        out
    }

    /// Flush every buffer if any of them has held a message for at least
    /// `threshold`, counted from the message's arrival.
    pub fn flush_stale(&mut self, now: Instant, threshold: Duration) -> Vec<GatedMessage> {
        let starving = self.buffers.values().any(|q| {
            q.front()
                .map_or(false, |g| now.saturating_duration_since(g.received_at) >= threshold)
        });
        if !starving {
            return Vec::new();
        }
        info!(pending = self.buffered_total(), "Starvation guard flushing agent buffers");
        self.flush_all()
    }

    pub fn flush_all(&mut self) -> Vec<GatedMessage> {
        std::mem::take(&mut self.buffers)
            .into_values()
            .flatten()
            .collect()
    }

    fn drain(&mut self, role: AgentRole, out: &mut Vec<GatedMessage>) {
        if let Some(queue) = self.buffers.remove(&role) {
            out.extend(queue);
        }
    }

    fn after(&self, role: AgentRole) -> impl Iterator<Item = AgentRole> + '_ {
        AGENT_EXECUTION_ORDER
            .iter()
            .skip(execution_index(role) + 1)
            .copied()
            .filter(move |r| self.team.contains(r))
    }

    fn next_in_phase(&self, role: AgentRole) -> Option<AgentRole> {
        let phase = role.phase();
        self.after(role).find(|r| r.phase() == phase)
    }

    fn first_of_next_phase(&self, role: AgentRole) -> Option<AgentRole> {
        let phase = role.phase();
        self.after(role).find(|r| r.phase() > phase)
    }
}
