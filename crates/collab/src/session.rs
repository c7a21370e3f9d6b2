//! Agent session registry
//!
//! Tracks connected agents, enforces the connection cap and per-peer
//! session-creation rate limit, stores per-agent vector clocks and cursors
//! for the collaboration layer, and reaps idle sessions.

use crate::clock::VectorClock;
use crate::position::Position;
use agrama_core::{AgramaError, AgramaResult, EngineEvent, Timestamp};
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::collections::VecDeque;

/// Registry configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum concurrent sessions (default: 100)
    pub max_sessions: usize,
    /// New sessions allowed per second per peer identity (default: 10)
    pub rate_limit_per_sec: usize,
    /// Idle window after which a session is reaped, in seconds (default: 300)
    pub idle_timeout_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_sessions: 100,
            rate_limit_per_sec: 10,
            idle_timeout_secs: 300,
        }
    }
}

/// Per-agent session state
#[derive(Debug, Clone)]
pub struct AgentSession {
    /// Agent identifier
    pub agent_id: String,
    /// Opaque session identifier, fresh per registration
    pub session_id: String,
    /// Human-readable name supplied at registration
    pub display_name: String,
    /// When the session was created
    pub connected_at: Timestamp,
    /// Last request timestamp
    pub last_activity: Timestamp,
    /// Requests served in this session
    pub request_count: u64,
    /// Capability strings advertised at registration
    pub capabilities: Vec<String>,
    /// The agent's vector clock
    pub clock: VectorClock,
    /// Per-document cursor positions
    pub cursors: BTreeMap<String, Position>,
}

/// The session registry
pub struct SessionRegistry {
    config: SessionConfig,
    sessions: DashMap<String, AgentSession>,
    /// Per-peer window of recent session creations
    rate_windows: Mutex<FxHashMap<String, VecDeque<Timestamp>>>,
}

impl SessionRegistry {
    /// Create a registry
    pub fn new(config: SessionConfig) -> Self {
        SessionRegistry {
            config,
            sessions: DashMap::new(),
            rate_windows: Mutex::new(FxHashMap::default()),
        }
    }

    /// Create (or refresh) a session. `peer` is an opaque transport
    /// identity used only for rate limiting.
    ///
    /// Returns the join event for the broadcast feed; re-registering an
    /// existing agent returns None.
    pub fn register(
        &self,
        agent_id: &str,
        display_name: &str,
        capabilities: Vec<String>,
        peer: &str,
        now: Timestamp,
    ) -> AgramaResult<Option<EngineEvent>> {
        if let Some(mut session) = self.sessions.get_mut(agent_id) {
            session.last_activity = now;
            return Ok(None);
        }

        self.check_rate(peer, now)?;

        if self.sessions.len() >= self.config.max_sessions {
            return Err(AgramaError::capacity_exceeded(
                "agent sessions",
                self.config.max_sessions,
                self.sessions.len() + 1,
            ));
        }

        self.sessions.insert(
            agent_id.to_string(),
            AgentSession {
                agent_id: agent_id.to_string(),
                session_id: uuid::Uuid::new_v4().to_string(),
                display_name: display_name.to_string(),
                connected_at: now,
                last_activity: now,
                request_count: 0,
                capabilities,
                clock: VectorClock::new(),
                cursors: BTreeMap::new(),
            },
        );

        Ok(Some(EngineEvent::AgentJoined {
            agent_id: agent_id.to_string(),
            display_name: display_name.to_string(),
            timestamp: now,
        }))
    }

    fn check_rate(&self, peer: &str, now: Timestamp) -> AgramaResult<()> {
        let mut windows = self.rate_windows.lock();
        let window = windows.entry(peer.to_string()).or_default();
        let cutoff = now.as_micros().saturating_sub(1_000_000);
        while window.front().is_some_and(|t| t.as_micros() < cutoff) {
            window.pop_front();
        }
        if window.len() >= self.config.rate_limit_per_sec {
            return Err(AgramaError::RateLimited {
                peer: peer.to_string(),
            });
        }
        window.push_back(now);
        Ok(())
    }

    /// Record a request for an agent, creating activity bookkeeping
    pub fn touch(&self, agent_id: &str, now: Timestamp) -> AgramaResult<()> {
        let mut session = self
            .sessions
            .get_mut(agent_id)
            .ok_or_else(|| AgramaError::unknown_agent(agent_id))?;
        session.last_activity = now;
        session.request_count += 1;
        Ok(())
    }

    /// Snapshot a session
    pub fn get(&self, agent_id: &str) -> Option<AgentSession> {
        self.sessions.get(agent_id).map(|s| s.value().clone())
    }

    /// Whether an agent has a session
    pub fn contains(&self, agent_id: &str) -> bool {
        self.sessions.contains_key(agent_id)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Mutate a session's vector clock
    pub fn with_clock<R>(
        &self,
        agent_id: &str,
        f: impl FnOnce(&mut VectorClock) -> R,
    ) -> AgramaResult<R> {
        let mut session = self
            .sessions
            .get_mut(agent_id)
            .ok_or_else(|| AgramaError::unknown_agent(agent_id))?;
        Ok(f(&mut session.clock))
    }

    /// Update an agent's cursor for a document
    pub fn cursor_update(
        &self,
        agent_id: &str,
        document: &str,
        position: Position,
    ) -> AgramaResult<()> {
        let mut session = self
            .sessions
            .get_mut(agent_id)
            .ok_or_else(|| AgramaError::unknown_agent(agent_id))?;
        session.cursors.insert(document.to_string(), position);
        Ok(())
    }

    /// Remove a session, returning the leave event if it existed
    pub fn close(&self, agent_id: &str, reason: &str, now: Timestamp) -> Option<EngineEvent> {
        self.sessions.remove(agent_id).map(|_| EngineEvent::AgentLeft {
            agent_id: agent_id.to_string(),
            reason: reason.to_string(),
            timestamp: now,
        })
    }

    /// Reap sessions idle past the configured window
    pub fn reap_idle(&self, now: Timestamp) -> Vec<EngineEvent> {
        let cutoff = now
            .as_micros()
            .saturating_sub(self.config.idle_timeout_secs.saturating_mul(1_000_000));
        let stale: Vec<String> = self
            .sessions
            .iter()
            .filter(|s| s.last_activity.as_micros() < cutoff)
            .map(|s| s.agent_id.clone())
            .collect();
        stale
            .iter()
            .filter_map(|agent| self.close(agent, "idle timeout", now))
            .collect()
    }

    /// Close every session (operational response)
    pub fn emergency_close_all(&self, now: Timestamp) -> Vec<EngineEvent> {
        let agents: Vec<String> = self.sessions.iter().map(|s| s.agent_id.clone()).collect();
        agents
            .iter()
            .filter_map(|agent| self.close(agent, "emergency close", now))
            .collect()
    }

    /// All live sessions, sorted by agent id
    pub fn list(&self) -> Vec<AgentSession> {
        let mut sessions: Vec<AgentSession> =
            self.sessions.iter().map(|s| s.value().clone()).collect();
        sessions.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(secs: u64) -> Timestamp {
        Timestamp::from_secs(secs)
    }

    fn registry() -> SessionRegistry {
        SessionRegistry::new(SessionConfig::default())
    }

    #[test]
    fn test_register_and_touch() {
        let r = registry();
        let event = r
            .register("a1", "Refactorer", vec!["search".into()], "peer-1", ts(1))
            .unwrap();
        assert!(matches!(event, Some(EngineEvent::AgentJoined { .. })));
        assert_eq!(r.len(), 1);

        r.touch("a1", ts(2)).unwrap();
        let s = r.get("a1").unwrap();
        assert_eq!(s.request_count, 1);
        assert_eq!(s.last_activity, ts(2));
        assert_eq!(s.connected_at, ts(1));
    }

    #[test]
    fn test_reregister_is_idempotent() {
        let r = registry();
        r.register("a1", "A", vec![], "p", ts(1)).unwrap();
        let event = r.register("a1", "A", vec![], "p", ts(2)).unwrap();
        assert!(event.is_none());
        assert_eq!(r.len(), 1);
    }

    #[test]
    fn test_touch_unknown_agent() {
        let r = registry();
        assert!(matches!(
            r.touch("ghost", ts(1)),
            Err(AgramaError::UnknownAgent { .. })
        ));
    }

    #[test]
    fn test_connection_cap() {
        let r = SessionRegistry::new(SessionConfig {
            max_sessions: 2,
            rate_limit_per_sec: 100,
            ..SessionConfig::default()
        });
        r.register("a1", "A", vec![], "p1", ts(1)).unwrap();
        r.register("a2", "B", vec![], "p2", ts(1)).unwrap();
        let err = r.register("a3", "C", vec![], "p3", ts(1)).unwrap_err();
        assert!(matches!(err, AgramaError::CapacityExceeded { .. }));
    }

    #[test]
    fn test_rate_limit_per_peer() {
        let r = registry();
        for i in 0..10 {
            r.register(&format!("a{}", i), "A", vec![], "same-peer", ts(1))
                .unwrap();
        }
        let err = r
            .register("a10", "A", vec![], "same-peer", ts(1))
            .unwrap_err();
        assert!(matches!(err, AgramaError::RateLimited { .. }));

        // A different peer is unaffected
        r.register("b0", "B", vec![], "other-peer", ts(1)).unwrap();

        // The window slides: one second later the peer may register again
        r.register("a10", "A", vec![], "same-peer", ts(3)).unwrap();
    }

    #[test]
    fn test_idle_reaping() {
        let r = SessionRegistry::new(SessionConfig {
            idle_timeout_secs: 10,
            ..SessionConfig::default()
        });
        r.register("old", "O", vec![], "p", ts(1)).unwrap();
        r.register("fresh", "F", vec![], "p", ts(1)).unwrap();
        r.touch("fresh", ts(95)).unwrap();

        let events = r.reap_idle(ts(100));
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            EngineEvent::AgentLeft { agent_id, .. } if agent_id == "old"
        ));
        assert!(r.contains("fresh"));
        assert!(!r.contains("old"));
    }

    #[test]
    fn test_emergency_close_all() {
        let r = registry();
        r.register("a1", "A", vec![], "p1", ts(1)).unwrap();
        r.register("a2", "B", vec![], "p2", ts(1)).unwrap();
        let events = r.emergency_close_all(ts(2));
        assert_eq!(events.len(), 2);
        assert!(r.is_empty());
    }

    #[test]
    fn test_clock_and_cursor_storage() {
        let r = registry();
        r.register("a1", "A", vec![], "p", ts(1)).unwrap();

        let value = r.with_clock("a1", |c| c.increment("a1")).unwrap();
        assert_eq!(value, 1);

        let pos = Position::root("a1");
        r.cursor_update("a1", "doc-1", pos.clone()).unwrap();
        let s = r.get("a1").unwrap();
        assert_eq!(s.cursors.get("doc-1"), Some(&pos));
        assert_eq!(s.clock.get("a1"), 1);
    }

    #[test]
    fn test_close_returns_leave_event() {
        let r = registry();
        r.register("a1", "A", vec![], "p", ts(1)).unwrap();
        let event = r.close("a1", "disconnect", ts(2));
        assert!(matches!(event, Some(EngineEvent::AgentLeft { .. })));
        assert!(r.close("a1", "disconnect", ts(3)).is_none());
    }
}
