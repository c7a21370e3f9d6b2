//! Collaborative documents
//!
//! A document is an ordered sequence of elements addressed by causally
//! stable positions, an operation log, a merged vector clock, per-agent
//! cursors, and a conflict log. Operations pass through the pipeline:
//!
//! `pending -> buffered?{missing deps} -> applied -> {conflict?} -> resolved`
//!
//! Structural application is rank-ordered: deletes and replaces take effect
//! only when their writer rank exceeds the element's last writer, which
//! makes application order-independent. Two replicas that apply permutations
//! of the same causally ordered log converge to byte-identical text and
//! equal conflict logs.

use crate::clock::VectorClock;
use crate::operation::{ConflictEvent, CrdtOperation, OpKind, OpState, OperationId};
use crate::position::Position;
use agrama_core::{AgramaError, AgramaResult};
use rustc_hash::{FxHashMap, FxHashSet};
use similar::{ChangeTag, TextDiff};
use std::collections::BTreeMap;
use std::collections::BTreeSet;

/// Pluggable conflict resolution strategy
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ConflictStrategy {
    /// Winner by `(clock sum, agent id)`; never rejects
    #[default]
    LastWriterWins,
    /// Line-level union merge of conflicting replacements; falls back to
    /// last-writer-wins for non-text payloads
    SemanticMerge,
    /// Semantic merge, discarded when it breaks bracket balance
    SyntaxPreserving,
    /// Winner by configured agent priority, then last-writer-wins
    AgentPriority(BTreeMap<String, u64>),
    /// Record for human review; applies last-writer-wins provisionally
    HumanIntervention,
}

impl ConflictStrategy {
    /// Wire name used in conflict events
    pub fn name(&self) -> &'static str {
        match self {
            ConflictStrategy::LastWriterWins => "last_writer_wins",
            ConflictStrategy::SemanticMerge => "semantic_merge",
            ConflictStrategy::SyntaxPreserving => "syntax_preserving",
            ConflictStrategy::AgentPriority(_) => "agent_priority",
            ConflictStrategy::HumanIntervention => "human_intervention",
        }
    }
}

/// Writer rank: (strategy priority, clock sum, agent id).
/// Total order; identical on every replica.
type WriterRank = (u64, u64, String);

/// One element of the sequence
#[derive(Debug, Clone)]
struct Element {
    position: Position,
    op_id: OperationId,
    payload: Vec<u8>,
    deleted: bool,
    last_writer: WriterRank,
}

/// A collaborative document
#[derive(Debug)]
pub struct CrdtDocument {
    key: String,
    agents: BTreeSet<String>,
    clock: VectorClock,
    log: Vec<CrdtOperation>,
    applied: FxHashSet<OperationId>,
    /// digits -> indices into `log`, for overlap detection
    position_index: FxHashMap<Vec<u8>, Vec<usize>>,
    buffer: Vec<CrdtOperation>,
    buffer_cap: usize,
    elements: Vec<Element>,
    cursors: BTreeMap<String, Position>,
    conflicts: Vec<ConflictEvent>,
    strategy: ConflictStrategy,
    last_op: Option<OperationId>,
}

impl CrdtDocument {
    /// Create an empty document
    pub fn new(key: &str, strategy: ConflictStrategy, buffer_cap: usize) -> Self {
        CrdtDocument {
            key: key.to_string(),
            agents: BTreeSet::new(),
            clock: VectorClock::new(),
            log: Vec::new(),
            applied: FxHashSet::default(),
            position_index: FxHashMap::default(),
            buffer: Vec::new(),
            buffer_cap,
            elements: Vec::new(),
            cursors: BTreeMap::new(),
            conflicts: Vec::new(),
            strategy,
            last_op: None,
        }
    }

    /// Create a document seeded with initial text issued by `agent`
    pub fn with_text(key: &str, agent: &str, text: &str, strategy: ConflictStrategy) -> Self {
        let mut doc = Self::new(key, strategy, 1024);
        for (i, ch) in text.chars().enumerate() {
            doc.local_insert(agent, i, ch.to_string().into_bytes())
                .expect("seeding an empty document cannot fail");
        }
        doc
    }

    /// The document key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Agents that have touched the document
    pub fn agents(&self) -> impl Iterator<Item = &str> {
        self.agents.iter().map(String::as_str)
    }

    /// The merged vector clock
    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    /// Applied operations in application order
    pub fn log(&self) -> &[CrdtOperation] {
        &self.log
    }

    /// Conflicts observed so far
    pub fn conflicts(&self) -> &[ConflictEvent] {
        &self.conflicts
    }

    /// Operations stuck waiting for dependencies
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Materialized text (lossy for non-UTF-8 payloads)
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes()).into_owned()
    }

    /// Materialized bytes
    pub fn bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        for e in self.elements.iter().filter(|e| !e.deleted) {
            out.extend_from_slice(&e.payload);
        }
        out
    }

    /// Number of visible elements
    pub fn visible_len(&self) -> usize {
        self.elements.iter().filter(|e| !e.deleted).count()
    }

    // ========================================================================
    // Local edits
    // ========================================================================

    /// Insert `payload` at visible element index `index`, returning the
    /// operation to broadcast
    pub fn local_insert(
        &mut self,
        agent: &str,
        index: usize,
        payload: Vec<u8>,
    ) -> AgramaResult<CrdtOperation> {
        let position = self.position_for_index(agent, index);
        let op = self.make_op(agent, OpKind::Insert, position, payload);
        self.apply(op.clone())?;
        Ok(op)
    }

    /// Tombstone the visible element at `index`
    pub fn local_delete(&mut self, agent: &str, index: usize) -> AgramaResult<CrdtOperation> {
        let position = self
            .visible_position(index)
            .ok_or_else(|| AgramaError::validation("position", "index past end of document"))?;
        let op = self.make_op(agent, OpKind::Delete, position, Vec::new());
        self.apply(op.clone())?;
        Ok(op)
    }

    /// Replace the payload of the visible element at `index`
    pub fn local_replace(
        &mut self,
        agent: &str,
        index: usize,
        payload: Vec<u8>,
    ) -> AgramaResult<CrdtOperation> {
        let position = self
            .visible_position(index)
            .ok_or_else(|| AgramaError::validation("position", "index past end of document"))?;
        let op = self.make_op(agent, OpKind::Replace, position, payload);
        self.apply(op.clone())?;
        Ok(op)
    }

    /// A fresh position between the visible neighbors of `index`
    pub fn position_for_index(&self, agent: &str, index: usize) -> Position {
        let visible: Vec<&Element> = self.elements.iter().filter(|e| !e.deleted).collect();
        let left = index
            .checked_sub(1)
            .and_then(|i| visible.get(i))
            .map(|e| &e.position);
        let right = visible.get(index).map(|e| &e.position);
        Position::between(left, right, agent)
    }

    fn visible_position(&self, index: usize) -> Option<Position> {
        self.elements
            .iter()
            .filter(|e| !e.deleted)
            .nth(index)
            .map(|e| e.position.clone())
    }

    fn make_op(
        &mut self,
        agent: &str,
        kind: OpKind,
        position: Position,
        payload: Vec<u8>,
    ) -> CrdtOperation {
        let mut clock = self.clock.clone();
        clock.increment(agent);
        CrdtOperation {
            id: OperationId::new(),
            agent_id: agent.to_string(),
            kind,
            position,
            payload,
            clock,
            deps: self.last_op.into_iter().collect(),
        }
    }

    // ========================================================================
    // Operation pipeline
    // ========================================================================

    /// Apply a local or remote operation. Idempotent on operation id.
    pub fn apply(&mut self, op: CrdtOperation) -> AgramaResult<OpState> {
        if self.applied.contains(&op.id) {
            return Ok(OpState::Applied);
        }

        if !self.deps_ready(&op) {
            if self.buffer.len() >= self.buffer_cap {
                return Err(AgramaError::CausalityViolation {
                    document: self.key.clone(),
                    buffered: self.buffer.len(),
                });
            }
            if !self.buffer.iter().any(|b| b.id == op.id) {
                self.buffer.push(op);
            }
            return Ok(OpState::Buffered);
        }

        let state = self.integrate(op);
        self.drain_buffer();
        Ok(state)
    }

    fn deps_ready(&self, op: &CrdtOperation) -> bool {
        op.deps.iter().all(|d| self.applied.contains(d))
    }

    /// Apply newly ready buffered operations until a fixpoint
    fn drain_buffer(&mut self) {
        loop {
            let Some(idx) = self.buffer.iter().position(|op| self.deps_ready(op)) else {
                return;
            };
            let op = self.buffer.remove(idx);
            self.integrate(op);
        }
    }

    fn integrate(&mut self, op: CrdtOperation) -> OpState {
        // Concurrent overlap detection against the applied log
        let conflicting: Vec<usize> = self
            .position_index
            .get(&op.position.digits)
            .map(|indices| {
                indices
                    .iter()
                    .copied()
                    .filter(|&i| self.log[i].clock.concurrent_with(&op.clock))
                    .collect()
            })
            .unwrap_or_default();

        let rank = self.rank_of(&op);
        match op.kind {
            OpKind::Insert => self.apply_insert(&op, rank),
            OpKind::Delete => self.apply_overwrite(&op, rank, true),
            OpKind::Replace => {
                // A losing concurrent replacement still contributes to the
                // merge under the merging strategies
                self.apply_overwrite(&op, rank, false);
                if matches!(
                    self.strategy,
                    ConflictStrategy::SemanticMerge | ConflictStrategy::SyntaxPreserving
                ) {
                    for &i in &conflicting {
                        if self.log[i].kind == OpKind::Replace {
                            let loser_payload = if self.rank_of(&op) > self.rank_of(&self.log[i]) {
                                self.log[i].payload.clone()
                            } else {
                                op.payload.clone()
                            };
                            self.merge_into_element(&op.position, &loser_payload);
                        }
                    }
                }
            }
        }

        let had_conflict = !conflicting.is_empty();
        for &i in &conflicting {
            let other = &self.log[i];
            let winner = match op.kind {
                // Concurrent inserts both stand; order decides, nobody wins
                OpKind::Insert if other.kind == OpKind::Insert => None,
                _ => {
                    let winner_rank = self.rank_of(&op).max(self.rank_of(other));
                    Some(winner_rank.2)
                }
            };
            let event = ConflictEvent::new(
                &self.key,
                (op.id, op.agent_id.as_str()),
                (other.id, other.agent_id.as_str()),
                self.strategy.name(),
                winner,
            );
            if !self.conflicts.contains(&event) {
                self.conflicts.push(event);
            }
        }

        // Bookkeeping
        self.agents.insert(op.agent_id.clone());
        self.clock.merge(&op.clock);
        self.applied.insert(op.id);
        self.last_op = Some(op.id);
        self.position_index
            .entry(op.position.digits.clone())
            .or_default()
            .push(self.log.len());
        self.log.push(op);

        if had_conflict {
            OpState::Resolved
        } else {
            OpState::Applied
        }
    }

    fn rank_of(&self, op: &CrdtOperation) -> WriterRank {
        let priority = match &self.strategy {
            ConflictStrategy::AgentPriority(map) => map.get(&op.agent_id).copied().unwrap_or(0),
            _ => 0,
        };
        (priority, op.clock.sum(), op.agent_id.clone())
    }

    fn apply_insert(&mut self, op: &CrdtOperation, rank: WriterRank) {
        if self.elements.iter().any(|e| e.op_id == op.id) {
            return;
        }
        let element = Element {
            position: op.position.clone(),
            op_id: op.id,
            payload: op.payload.clone(),
            deleted: false,
            last_writer: rank,
        };
        let idx = self
            .elements
            .partition_point(|e| e.position < element.position);
        self.elements.insert(idx, element);
    }

    /// Rank-ordered delete/replace: the higher writer rank determines the
    /// element's final state regardless of arrival order
    fn apply_overwrite(&mut self, op: &CrdtOperation, rank: WriterRank, delete: bool) {
        let Some(element) = self
            .elements
            .iter_mut()
            .find(|e| e.position == op.position)
        else {
            return;
        };
        if rank > element.last_writer {
            element.deleted = delete;
            if !delete {
                element.payload = op.payload.clone();
            }
            element.last_writer = rank;
        }
    }

    /// Union-merge a losing replacement into the element's payload
    fn merge_into_element(&mut self, position: &Position, loser_payload: &[u8]) {
        let balanced_before;
        let merged = {
            let Some(element) = self.elements.iter().find(|e| &e.position == position) else {
                return;
            };
            balanced_before = bracket_balance(&element.payload);
            merge_payloads(&element.payload, loser_payload)
        };
        let Some(merged) = merged else {
            return;
        };
        if self.strategy == ConflictStrategy::SyntaxPreserving
            && bracket_balance(&merged) != balanced_before
        {
            return;
        }
        if let Some(element) = self.elements.iter_mut().find(|e| &e.position == position) {
            element.payload = merged;
        }
    }

    // ========================================================================
    // Cursors and synchronization
    // ========================================================================

    /// Record an agent's cursor
    pub fn cursor_update(&mut self, agent: &str, position: Position) {
        self.agents.insert(agent.to_string());
        self.cursors.insert(agent.to_string(), position);
    }

    /// Current cursor positions
    pub fn cursors(&self) -> &BTreeMap<String, Position> {
        &self.cursors
    }

    /// Merge every operation from `other` into this document, respecting
    /// causal order via the buffer
    pub fn merge_from(&mut self, other: &CrdtDocument) -> AgramaResult<()> {
        for op in &other.log {
            self.apply(op.clone())?;
        }
        Ok(())
    }
}

/// Merge two text payloads: winner text plus the loser's unique lines.
/// Returns None for non-text payloads.
fn merge_payloads(winner: &[u8], loser: &[u8]) -> Option<Vec<u8>> {
    let winner_text = std::str::from_utf8(winner).ok()?;
    let loser_text = std::str::from_utf8(loser).ok()?;

    let diff = TextDiff::from_lines(winner_text, loser_text);
    let mut merged = winner_text.to_string();
    for change in diff.iter_all_changes() {
        if change.tag() == ChangeTag::Insert {
            // A line present only in the loser survives the merge
            if !merged.ends_with('\n') && !merged.is_empty() {
                merged.push('\n');
            }
            merged.push_str(change.value());
        }
    }
    Some(merged.into_bytes())
}

/// Net bracket balance per kind, the syntax-preserving sanity check
fn bracket_balance(payload: &[u8]) -> (i64, i64, i64) {
    let mut braces = 0i64;
    let mut parens = 0i64;
    let mut brackets = 0i64;
    for &b in payload {
        match b {
            b'{' => braces += 1,
            b'}' => braces -= 1,
            b'(' => parens += 1,
            b')' => parens -= 1,
            b'[' => brackets += 1,
            b']' => brackets -= 1,
            _ => {}
        }
    }
    (braces, parens, brackets)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(key: &str) -> CrdtDocument {
        CrdtDocument::new(key, ConflictStrategy::LastWriterWins, 1024)
    }

    #[test]
    fn test_local_inserts_materialize() {
        let mut d = doc("d");
        d.local_insert("a", 0, b"h".to_vec()).unwrap();
        d.local_insert("a", 1, b"i".to_vec()).unwrap();
        assert_eq!(d.text(), "hi");
        assert_eq!(d.visible_len(), 2);
    }

    #[test]
    fn test_insert_in_middle() {
        let mut d = CrdtDocument::with_text("d", "a", "ac", ConflictStrategy::default());
        d.local_insert("a", 1, b"b".to_vec()).unwrap();
        assert_eq!(d.text(), "abc");
    }

    #[test]
    fn test_delete() {
        let mut d = CrdtDocument::with_text("d", "a", "abc", ConflictStrategy::default());
        d.local_delete("a", 1).unwrap();
        assert_eq!(d.text(), "ac");
        // Element is tombstoned, not gone
        assert_eq!(d.elements.len(), 3);
    }

    #[test]
    fn test_replace() {
        let mut d = CrdtDocument::with_text("d", "a", "abc", ConflictStrategy::default());
        d.local_replace("a", 1, b"X".to_vec()).unwrap();
        assert_eq!(d.text(), "aXc");
    }

    #[test]
    fn test_delete_past_end_rejected() {
        let mut d = CrdtDocument::with_text("d", "a", "ab", ConflictStrategy::default());
        assert!(d.local_delete("a", 5).unwrap_err().is_validation());
    }

    #[test]
    fn test_apply_idempotent() {
        let mut d = doc("d");
        let op = d.local_insert("a", 0, b"x".to_vec()).unwrap();
        let state = d.apply(op).unwrap();
        assert_eq!(state, OpState::Applied);
        assert_eq!(d.text(), "x");
        assert_eq!(d.log().len(), 1);
    }

    #[test]
    fn test_missing_deps_buffer_then_drain() {
        let mut source = doc("d");
        let op1 = source.local_insert("a", 0, b"x".to_vec()).unwrap();
        let op2 = source.local_insert("a", 1, b"y".to_vec()).unwrap();

        let mut replica = doc("d");
        // op2 depends on op1; applying it first parks it in the buffer
        assert_eq!(replica.apply(op2).unwrap(), OpState::Buffered);
        assert_eq!(replica.buffered_len(), 1);
        assert_eq!(replica.text(), "");

        replica.apply(op1).unwrap();
        assert_eq!(replica.buffered_len(), 0);
        assert_eq!(replica.text(), "xy");
    }

    #[test]
    fn test_buffer_overflow_is_causality_violation() {
        let mut source = doc("d");
        source.local_insert("a", 0, b"x".to_vec()).unwrap();
        let mut ops = Vec::new();
        for i in 0..5 {
            ops.push(source.local_insert("a", i + 1, b"y".to_vec()).unwrap());
        }

        let mut replica = CrdtDocument::new("d", ConflictStrategy::default(), 3);
        let mut last_err = None;
        for op in ops {
            match replica.apply(op) {
                Ok(OpState::Buffered) => {}
                Err(e) => last_err = Some(e),
                other => panic!("unexpected state {:?}", other),
            }
        }
        assert!(matches!(
            last_err,
            Some(AgramaError::CausalityViolation { .. })
        ));
    }

    #[test]
    fn test_concurrent_inserts_converge_with_one_conflict() {
        // Both agents start from the same seeded document
        let base = CrdtDocument::with_text("d", "seed", "abc", ConflictStrategy::default());

        let mut doc_a = CrdtDocument::new("d", ConflictStrategy::default(), 1024);
        doc_a.merge_from(&base).unwrap();
        let mut doc_b = CrdtDocument::new("d", ConflictStrategy::default(), 1024);
        doc_b.merge_from(&base).unwrap();

        // Concurrent inserts after "a" (visible index 1)
        let op_a = doc_a.local_insert("agent-a", 1, b"X".to_vec()).unwrap();
        let op_b = doc_b.local_insert("agent-b", 1, b"Y".to_vec()).unwrap();

        doc_a.apply(op_b).unwrap();
        doc_b.apply(op_a).unwrap();

        assert_eq!(doc_a.text(), doc_b.text());
        assert_eq!(doc_a.text(), "aXYbc");
        assert_eq!(doc_a.conflicts().len(), 1);
        assert_eq!(doc_b.conflicts().len(), 1);
        assert_eq!(doc_a.conflicts()[0], doc_b.conflicts()[0]);
    }

    #[test]
    fn test_concurrent_replace_lww_converges() {
        let base = CrdtDocument::with_text("d", "seed", "abc", ConflictStrategy::default());
        let mut doc_a = doc("d");
        doc_a.merge_from(&base).unwrap();
        let mut doc_b = doc("d");
        doc_b.merge_from(&base).unwrap();

        let op_a = doc_a.local_replace("agent-a", 1, b"P".to_vec()).unwrap();
        let op_b = doc_b.local_replace("agent-b", 1, b"Q".to_vec()).unwrap();

        doc_a.apply(op_b.clone()).unwrap();
        doc_b.apply(op_a.clone()).unwrap();

        assert_eq!(doc_a.text(), doc_b.text());
        // Equal clock sums: the larger agent id wins
        assert_eq!(doc_a.text(), "aQc");
        assert_eq!(doc_a.conflicts().len(), 1);
        assert_eq!(doc_a.conflicts()[0].winner, Some("agent-b".to_string()));
    }

    #[test]
    fn test_concurrent_delete_vs_replace_converges() {
        let base = CrdtDocument::with_text("d", "seed", "abc", ConflictStrategy::default());
        let mut doc_a = doc("d");
        doc_a.merge_from(&base).unwrap();
        let mut doc_b = doc("d");
        doc_b.merge_from(&base).unwrap();

        let op_a = doc_a.local_delete("agent-a", 1).unwrap();
        let op_b = doc_b.local_replace("agent-b", 1, b"Z".to_vec()).unwrap();

        doc_a.apply(op_b).unwrap();
        doc_b.apply(op_a).unwrap();

        assert_eq!(doc_a.text(), doc_b.text());
        // agent-b outranks agent-a at equal sums: the replace survives
        assert_eq!(doc_a.text(), "aZc");
    }

    #[test]
    fn test_permuted_delivery_converges() {
        let base = CrdtDocument::with_text("d", "seed", "hello", ConflictStrategy::default());
        let mut doc_a = doc("d");
        doc_a.merge_from(&base).unwrap();
        let mut doc_b = doc("d");
        doc_b.merge_from(&base).unwrap();

        let a1 = doc_a.local_insert("agent-a", 5, b"!".to_vec()).unwrap();
        let a2 = doc_a.local_replace("agent-a", 0, b"H".to_vec()).unwrap();
        let b1 = doc_b.local_delete("agent-b", 1).unwrap();
        let b2 = doc_b.local_insert("agent-b", 1, b"3".to_vec()).unwrap();

        // Deliver in different interleavings
        for op in [b1.clone(), b2.clone()] {
            doc_a.apply(op).unwrap();
        }
        for op in [a2.clone(), a1.clone()] {
            doc_b.apply(op).unwrap();
        }

        assert_eq!(doc_a.text(), doc_b.text());
        let conflicts_a: std::collections::HashSet<_> =
            doc_a.conflicts().iter().cloned().collect();
        let conflicts_b: std::collections::HashSet<_> =
            doc_b.conflicts().iter().cloned().collect();
        assert_eq!(conflicts_a, conflicts_b);
    }

    #[test]
    fn test_semantic_merge_unions_lines() {
        let base = CrdtDocument::with_text(
            "d",
            "seed",
            "s",
            ConflictStrategy::SemanticMerge,
        );
        let mut doc_a = CrdtDocument::new("d", ConflictStrategy::SemanticMerge, 1024);
        doc_a.merge_from(&base).unwrap();
        let mut doc_b = CrdtDocument::new("d", ConflictStrategy::SemanticMerge, 1024);
        doc_b.merge_from(&base).unwrap();

        let op_a = doc_a
            .local_replace("agent-a", 0, b"alpha\n".to_vec())
            .unwrap();
        let op_b = doc_b
            .local_replace("agent-b", 0, b"beta\n".to_vec())
            .unwrap();

        doc_a.apply(op_b).unwrap();
        doc_b.apply(op_a).unwrap();

        assert_eq!(doc_a.text(), doc_b.text());
        // Winner text retained, loser's unique line appended
        assert!(doc_a.text().contains("beta"));
        assert!(doc_a.text().contains("alpha"));
    }

    #[test]
    fn test_agent_priority_overrides_lww() {
        let mut priorities = BTreeMap::new();
        priorities.insert("low".to_string(), 1);
        priorities.insert("high".to_string(), 10);
        let strategy = ConflictStrategy::AgentPriority(priorities);

        let base = CrdtDocument::with_text("d", "seed", "x", strategy.clone());
        let mut doc_a = CrdtDocument::new("d", strategy.clone(), 1024);
        doc_a.merge_from(&base).unwrap();
        let mut doc_b = CrdtDocument::new("d", strategy, 1024);
        doc_b.merge_from(&base).unwrap();

        // "low" sorts after "high" lexically, so plain LWW would pick it
        let op_low = doc_a.local_replace("low", 0, b"L".to_vec()).unwrap();
        let op_high = doc_b.local_replace("high", 0, b"H".to_vec()).unwrap();

        doc_a.apply(op_high).unwrap();
        doc_b.apply(op_low).unwrap();

        assert_eq!(doc_a.text(), doc_b.text());
        assert_eq!(doc_a.text(), "H");
    }

    #[test]
    fn test_cursor_tracking() {
        let mut d = CrdtDocument::with_text("d", "a", "abc", ConflictStrategy::default());
        let p = d.position_for_index("b", 2);
        d.cursor_update("b", p.clone());
        assert_eq!(d.cursors().get("b"), Some(&p));
    }

    #[test]
    fn test_clock_merges_across_agents() {
        let mut d = doc("d");
        d.local_insert("a", 0, b"x".to_vec()).unwrap();
        let base_clock = d.clock().clone();

        let mut replica = doc("d");
        replica.merge_from(&d).unwrap();
        replica.local_insert("b", 1, b"y".to_vec()).unwrap();

        assert!(replica.clock().get("a") >= base_clock.get("a"));
        assert_eq!(replica.clock().get("b"), 1);
        let agents: Vec<&str> = replica.agents().collect();
        assert_eq!(agents, vec!["a", "b"]);
    }
}
