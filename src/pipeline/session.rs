use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use crate::agents::registry::{default_team, AgentRole};
use crate::events::{AgentStatus, InboundEvent, ThoughtEvent, ToolEvent};
use super::agent_tracker::{AgentTracker, GatedMessage, DEFAULT_STARVATION_THRESHOLD};
use super::dedup::{DedupCache, DEFAULT_DEDUP_WINDOW};
use super::message::{DisplayMessage, MessageKind};
use super::phase_buffer::PhaseBuffer;
use super::render_log::{RenderLog, DEFAULT_RENDER_WINDOW};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub dedup_window: Duration,
    pub starvation_threshold: Duration,
    pub render_window: usize,
    pub team: Vec<AgentRole>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            dedup_window: DEFAULT_DEDUP_WINDOW,
            starvation_threshold: DEFAULT_STARVATION_THRESHOLD,
            render_window: DEFAULT_RENDER_WINDOW,
            team: default_team(),
        }
    }
}

/// All ordering state for one analysis. Dropping the session is the reset;
/// nothing here outlives the analysis it was built for.
#[derive(Debug)]
pub struct Session {
    analysis_id: String,
    config: SessionConfig,
    dedup: DedupCache,
    phases: PhaseBuffer,
    agents: AgentTracker,
    // last accepted status per agent
    statuses: HashMap<AgentRole, AgentStatus>,
    log: RenderLog,
    finished: bool,
}

impl Session {
    pub fn new(analysis_id: impl Into<String>, config: SessionConfig) -> Self {
        Self {
            analysis_id: analysis_id.into(),
            dedup: DedupCache::new(config.dedup_window),
            phases: PhaseBuffer::new(),
            agents: AgentTracker::new(config.team.clone()),
            statuses: HashMap::new(),
            log: RenderLog::new(config.render_window),
            config,
            finished: false,
        }
    }

    pub fn analysis_id(&self) -> &str {
        &self.analysis_id
    }

    pub fn current_phase(&self) -> u32 {
        self.phases.current_phase()
    }

    pub fn phases(&self) -> &PhaseBuffer {
        &self.phases
    }

    pub fn agents(&self) -> &AgentTracker {
        &self.agents
    }

    pub fn log(&self) -> &RenderLog {
        &self.log
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Number of messages still held back by either gate.
    pub fn pending(&self) -> usize {
        self.phases.pending_total() + self.agents.buffered_total()
    }

    /// Single entry point for transport events. Returns the messages that
    /// became displayable, in display order.
    pub fn handle_event(&mut self, event: &InboundEvent, now: Instant) -> Vec<DisplayMessage> {
        if self.dedup.should_suppress(&event.fingerprint(), now) && !self.is_new_turn(event) {
            return Vec::new();
        }

        let mut out = Vec::new();
        match event {
            InboundEvent::Status(status) => match AgentRole::normalize(&status.agent) {
                Some(role) => {
                    self.statuses.insert(role, status.status);
                    let released = self.agents.on_status(role, status.status);
                    self.admit_all(released, &mut out);
                }
                None => debug!(agent = %status.agent, "Status for unknown agent ignored"),
            },
            InboundEvent::Thought(thought) => {
                let (role, gated) = classify_thought(thought, now);
                self.route(role, gated, &mut out);
            }
            InboundEvent::Tool(tool) => {
                let gated = tool_message(tool, now);
                self.route(None, gated, &mut out);
            }
            InboundEvent::Complete(complete) => {
                self.release_everything(&mut out);
                info!(analysis_id = %complete.analysis_id, "Analysis complete");
                out.push(DisplayMessage::system(format!(
                    "Analysis {} complete",
                    complete.analysis_id
                )));
                self.finished = true;
            }
            InboundEvent::Error(error) => {
                self.release_everything(&mut out);
                warn!(message = %error.message, "Backend reported error");
                out.push(DisplayMessage::error(error.message.clone()));
                self.finished = true;
            }
        }

        self.record(&out);
        out
    }

    /// Starvation guard: release anything held longer than the threshold.
    pub fn tick(&mut self, now: Instant) -> Vec<DisplayMessage> {
        let mut out = Vec::new();
        let threshold = self.config.starvation_threshold;
        let released = self.agents.flush_stale(now, threshold);
        self.admit_all(released, &mut out);
        out.extend(self.phases.release_stale(now, threshold));
        self.record(&out);
        out
    }

    /// End of input: show everything still held, in release order.
    pub fn drain(&mut self) -> Vec<DisplayMessage> {
        let mut out = Vec::new();
        self.release_everything(&mut out);
        self.record(&out);
        out
    }

    /// Drop all ordering state, as if the session had just been created.
    pub fn reset(&mut self) {
        self.dedup = DedupCache::new(self.config.dedup_window);
        self.phases = PhaseBuffer::new();
        self.agents = AgentTracker::new(self.config.team.clone());
        self.statuses.clear();
        self.log = RenderLog::new(self.config.render_window);
        self.finished = false;
    }

    /// A status that changes what the agent was last seen doing is a new
    /// turn, not a redelivery, even when its fingerprint is fresh in the
    /// cache. Debate rounds hand the floor back and forth this way.
    fn is_new_turn(&self, event: &InboundEvent) -> bool {
        let InboundEvent::Status(status) = event else {
            return false;
        };
        AgentRole::normalize(&status.agent)
            .map_or(false, |role| self.statuses.get(&role) != Some(&status.status))
    }

    fn route(&mut self, role: Option<AgentRole>, gated: GatedMessage, out: &mut Vec<DisplayMessage>) {
        // Only agent-authored lines wait for their speaker's turn. A bare
        // completion marker carries no words and often trails the handoff.
        let speaks = !gated.message.content.trim().is_empty();
        let passed = if gated.message.kind == MessageKind::Agent && speaks {
            self.agents.on_message(role, gated)
        } else {
            Some(gated)
        };
        if let Some(gated) = passed {
            self.admit(gated, out);
        }
    }

    fn admit(&mut self, gated: GatedMessage, out: &mut Vec<DisplayMessage>) {
        out.extend(
            self.phases
                .admit(gated.message, gated.is_phase_complete, gated.received_at),
        );
    }

    fn admit_all(&mut self, released: Vec<GatedMessage>, out: &mut Vec<DisplayMessage>) {
        for gated in released {
            self.admit(gated, out);
        }
    }

    fn release_everything(&mut self, out: &mut Vec<DisplayMessage>) {
        let released = self.agents.flush_all();
        self.admit_all(released, out);
        out.extend(self.phases.release_all());
    }

    fn record(&mut self, out: &[DisplayMessage]) {
        for message in out {
            self.log.push(message.clone());
        }
    }
}

const TOOL_PREFIXES: &[&str] = &["🔧", "[tool]", "tool:", "calling tool", "调用工具", "使用工具"];
const SYSTEM_SENDERS: &[&str] = &["system", "orchestrator", "系统"];

fn looks_like_tool(content: &str) -> bool {
    let lowered = content.trim_start().to_lowercase();
    TOOL_PREFIXES.iter().any(|p| lowered.starts_with(p))
}

fn looks_like_system(agent: &str, content: &str) -> bool {
    let agent = agent.trim().to_lowercase();
    SYSTEM_SENDERS.iter().any(|s| agent == *s)
        || content.trim_start().to_lowercase().starts_with("[system]")
}

fn agent_label(raw: Option<&str>, role: Option<AgentRole>) -> Option<String> {
    match role {
        Some(role) => Some(role.display_name().to_string()),
        None => raw.filter(|a| !a.trim().is_empty()).map(str::to_string),
    }
}

/// Decide whether a thought is an agent line, a tool call or a system note.
fn classify_thought(thought: &ThoughtEvent, now: Instant) -> (Option<AgentRole>, GatedMessage) {
    let raw_agent = thought.agent.as_deref().unwrap_or_default();
    let role = AgentRole::normalize(raw_agent);

    let kind = if thought.is_tool || looks_like_tool(&thought.thought) {
        MessageKind::Tool
    } else if raw_agent.trim().is_empty() || looks_like_system(raw_agent, &thought.thought) {
        MessageKind::System
    } else {
        MessageKind::Agent
    };

    let message = DisplayMessage::new(kind, thought.thought.clone())
        .with_agent(agent_label(thought.agent.as_deref(), role))
        .with_ordering(thought.phase_order, thought.node_order)
        .with_timestamp(thought.timestamp.as_deref());

    (
        role,
        GatedMessage {
            message,
            is_phase_complete: thought.is_phase_complete,
            received_at: now,
        },
    )
}

fn tool_message(tool: &ToolEvent, now: Instant) -> GatedMessage {
    let role = tool.agent.as_deref().and_then(AgentRole::normalize);
    let message = DisplayMessage::new(MessageKind::Tool, tool.describe())
        .with_agent(agent_label(tool.agent.as_deref(), role))
        .with_ordering(tool.phase_order, tool.node_order)
        .with_timestamp(tool.timestamp.as_deref());
    GatedMessage {
        message,
        is_phase_complete: false,
        received_at: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{decode_event, CompleteEvent, ErrorEvent, StatusEvent};

    fn thought(agent: &str, text: &str, phase: u32, node: u32) -> InboundEvent {
        InboundEvent::Thought(ThoughtEvent {
            agent: Some(agent.to_string()),
            thought: text.to_string(),
            phase: None,
            phase_order: Some(phase),
            node_order: Some(node),
            is_phase_complete: false,
            is_tool: false,
            timestamp: None,
        })
    }

    fn phase_complete(agent: &str, phase: u32, node: u32) -> InboundEvent {
        InboundEvent::Thought(ThoughtEvent {
            agent: Some(agent.to_string()),
            thought: String::new(),
            phase: None,
            phase_order: Some(phase),
            node_order: Some(node),
            is_phase_complete: true,
            is_tool: false,
            timestamp: None,
        })
    }

    fn status(agent: &str, status: AgentStatus) -> InboundEvent {
        InboundEvent::Status(StatusEvent {
            agent: agent.to_string(),
            status,
            phase: None,
            usage: None,
            timestamp: None,
        })
    }

    fn contents(out: &[DisplayMessage]) -> Vec<&str> {
        out.iter().map(|m| m.content.as_str()).collect()
    }

    fn session() -> Session {
        Session::new("a-1", SessionConfig::default())
    }

    #[test]
    fn test_phase_scenario_sorted_on_completion() {
        let mut s = session();
        let now = Instant::now();
        s.handle_event(&status("market_analyst", AgentStatus::Processing), now);
        assert!(s.handle_event(&thought("market_analyst", "x", 1, 2), now).is_empty());
        assert!(s.handle_event(&thought("market_analyst", "y", 1, 1), now).is_empty());
        let out = s.handle_event(&phase_complete("market_analyst", 1, 2), now);
        assert_eq!(contents(&out), vec!["y", "x"]);
        assert_eq!(s.current_phase(), 1);
    }

    #[test]
    fn test_marker_after_handoff_closes_phase() {
        let mut s = Session::new(
            "a-1",
            SessionConfig {
                team: vec![AgentRole::MarketAnalyst, AgentRole::Trader],
                ..Default::default()
            },
        );
        let now = Instant::now();
        s.handle_event(&status("market_analyst", AgentStatus::Processing), now);
        s.handle_event(&thought("market_analyst", "trend up", 1, 1), now);
        s.handle_event(&status("market_analyst", AgentStatus::Completed), now);
        let out = s.handle_event(&phase_complete("market_analyst", 1, 2), now);
        assert_eq!(contents(&out), vec!["trend up"]);
        assert_eq!(s.current_phase(), 1);
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_unphased_system_message_immediate() {
        let mut s = session();
        let event = decode_event(r#"{"type":"agent.thought","content":"ready"}"#).unwrap();
        let out = s.handle_event(&event, Instant::now());
        assert_eq!(contents(&out), vec!["ready"]);
        assert_eq!(out[0].kind, MessageKind::System);
        assert_eq!(s.current_phase(), 0);
    }

    #[test]
    fn test_duplicate_thought_suppressed() {
        let mut s = session();
        let t0 = Instant::now();
        s.handle_event(&status("market_analyst", AgentStatus::Processing), t0);
        s.handle_event(&thought("market_analyst", "hello", 1, 1), t0);
        s.handle_event(&thought("market_analyst", "hello", 1, 1), t0 + Duration::from_secs(5));
        let out = s.handle_event(&phase_complete("market_analyst", 1, 9), t0 + Duration::from_secs(6));
        assert_eq!(contents(&out), vec!["hello"]);
        assert_eq!(s.log().len(), 1);
    }

    #[test]
    fn test_redelivery_after_window_emits_again() {
        let mut s = session();
        let t0 = Instant::now();
        let event = decode_event(r#"{"type":"agent.thought","content":"tick"}"#).unwrap();
        assert_eq!(s.handle_event(&event, t0).len(), 1);
        assert_eq!(s.handle_event(&event, t0 + Duration::from_secs(5)).len(), 0);
        assert_eq!(s.handle_event(&event, t0 + Duration::from_secs(31)).len(), 1);
    }

    #[test]
    fn test_both_gates_required() {
        let mut s = session();
        let now = Instant::now();
        // phase 1 already released, but the news analyst is not on stage
        s.handle_event(&phase_complete("system", 1, 0), now);
        assert_eq!(s.current_phase(), 1);
        assert!(s.handle_event(&thought("news_analyst", "headline", 1, 4), now).is_empty());
        let out = s.handle_event(&status("news_analyst", AgentStatus::Processing), now);
        assert_eq!(contents(&out), vec!["headline"]);
    }

    #[test]
    fn test_active_agent_waits_for_phase() {
        let mut s = session();
        let now = Instant::now();
        s.handle_event(&status("bull_researcher", AgentStatus::Processing), now);
        assert!(s.handle_event(&thought("bull_researcher", "upside", 2, 1), now).is_empty());
        // phase 1 is released by look-ahead; the message waits for phase 2
        assert_eq!(s.current_phase(), 1);
        assert_eq!(s.phases().pending(2), 1);
    }

    #[test]
    fn test_unknown_agent_never_dropped() {
        let mut s = session();
        let out = s.handle_event(&thought("macro_oracle", "rates up", 0, 0), Instant::now());
        assert_eq!(contents(&out), vec!["rates up"]);
        assert_eq!(out[0].agent.as_deref(), Some("macro_oracle"));
    }

    #[test]
    fn test_tool_messages_skip_agent_gate() {
        let mut s = session();
        let event = decode_event(
            r#"{"type":"agent.tool","agent":"trader","tool":"get_quote","args":{"symbol":"TSLA"}}"#,
        ).unwrap();
        let out = s.handle_event(&event, Instant::now());
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, MessageKind::Tool);
        assert_eq!(out[0].agent.as_deref(), Some("Trader"));
    }

    #[test]
    fn test_tool_heuristic_on_thought() {
        let mut s = session();
        let out = s.handle_event(&thought("trader", "🔧 get_news(AAPL)", 0, 0), Instant::now());
        assert_eq!(out[0].kind, MessageKind::Tool);
    }

    #[test]
    fn test_tick_releases_starved_agent() {
        let mut s = session();
        let t0 = Instant::now();
        s.handle_event(&thought("trader", "buy 100", 0, 0), t0);
        assert_eq!(s.pending(), 1);
        assert!(s.tick(t0 + Duration::from_secs(10)).is_empty());
        let out = s.tick(t0 + Duration::from_secs(40));
        assert_eq!(contents(&out), vec!["buy 100"]);
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_starved_line_ahead_of_cursor_released_within_bound() {
        let mut s = session();
        let t0 = Instant::now();
        // nobody is on stage and phase 2 is two ahead of the cursor
        s.handle_event(&thought("trader", "sell half", 2, 1), t0);
        assert_eq!(s.pending(), 1);

        let mut released_at = None;
        for k in 1..=4u64 {
            let out = s.tick(t0 + Duration::from_secs(10 * k));
            if !out.is_empty() {
                assert_eq!(contents(&out), vec!["sell half"]);
                released_at = Some(10 * k);
                break;
            }
        }
        assert!(matches!(released_at, Some(secs) if secs <= 40), "released at {:?}", released_at);
        assert_eq!(s.pending(), 0);
        assert_eq!(s.current_phase(), 2);
    }

    #[test]
    fn test_debate_rounds_hand_floor_back() {
        let mut s = Session::new(
            "a-1",
            SessionConfig {
                team: vec![AgentRole::BullResearcher, AgentRole::BearResearcher],
                ..Default::default()
            },
        );
        let t0 = Instant::now();
        let at = |secs: u64| t0 + Duration::from_secs(secs);

        s.handle_event(&status("bull_researcher", AgentStatus::Processing), at(0));
        s.handle_event(&status("bull_researcher", AgentStatus::Completed), at(2));
        s.handle_event(&status("bear_researcher", AgentStatus::Processing), at(3));
        s.handle_event(&status("bear_researcher", AgentStatus::Completed), at(5));
        assert_eq!(s.agents().active(), None);

        // second round inside the dedup window
        s.handle_event(&status("bull_researcher", AgentStatus::Processing), at(6));
        assert_eq!(s.agents().active(), Some(AgentRole::BullResearcher));
        let out = s.handle_event(&thought("bull_researcher", "rebuttal", 0, 0), at(7));
        assert_eq!(contents(&out), vec!["rebuttal"]);
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_redelivered_status_still_suppressed() {
        let mut s = Session::new(
            "a-1",
            SessionConfig {
                team: vec![AgentRole::BullResearcher, AgentRole::BearResearcher],
                ..Default::default()
            },
        );
        let t0 = Instant::now();
        let at = |secs: u64| t0 + Duration::from_secs(secs);
        s.handle_event(&status("bull_researcher", AgentStatus::Processing), at(0));
        s.handle_event(&status("bull_researcher", AgentStatus::Completed), at(1));
        s.handle_event(&status("bear_researcher", AgentStatus::Completed), at(2));
        assert_eq!(s.agents().active(), None);
        // a late copy of Bull's completion would hand the floor to Bear again
        s.handle_event(&status("bull_researcher", AgentStatus::Completed), at(3));
        assert_eq!(s.agents().active(), None);
    }

    #[test]
    fn test_complete_releases_everything() {
        let mut s = session();
        let now = Instant::now();
        s.handle_event(&thought("risk_manager", "hold", 5, 1), now);
        let out = s.handle_event(
            &InboundEvent::Complete(CompleteEvent {
                analysis_id: "a-1".into(),
                result: None,
                usage: None,
            }),
            now,
        );
        assert_eq!(contents(&out), vec!["hold", "Analysis a-1 complete"]);
        assert!(s.is_finished());
        assert_eq!(s.pending(), 0);
    }

    #[test]
    fn test_error_event_surfaces() {
        let mut s = session();
        let out = s.handle_event(
            &InboundEvent::Error(ErrorEvent { message: "quota exceeded".into() }),
            Instant::now(),
        );
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, MessageKind::Error);
        assert!(s.is_finished());
    }

    #[test]
    fn test_reset_leaves_no_state_behind() {
        let mut s = session();
        let now = Instant::now();
        s.handle_event(&status("market_analyst", AgentStatus::Processing), now);
        s.handle_event(&thought("market_analyst", "held", 1, 1), now);
        s.handle_event(&thought("trader", "waiting", 3, 1), now);
        assert!(s.pending() > 0);
        s.reset();
        assert_eq!(s.pending(), 0);
        assert_eq!(s.current_phase(), 0);
        assert_eq!(s.agents().active(), None);
        assert!(s.log().is_empty());
        // the dedup cache was cleared too, so the repeated status is accepted
        s.handle_event(&status("market_analyst", AgentStatus::Processing), now);
        let out = s.handle_event(&thought("market_analyst", "held", 0, 0), now);
        assert_eq!(contents(&out), vec!["held"]);
    }
}
