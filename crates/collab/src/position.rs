//! Causally stable position identifiers
//!
//! Positions are lexicographic fractional indices: a sequence of digits in
//! (0, 255) plus the issuing agent id. `between` always finds a fresh digit
//! sequence strictly between its bounds, and two agents generating a
//! position between the same bounds produce identical digits, leaving the
//! agent id as the deterministic tie-break. The total order is
//! `(digits, agent)`.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Exclusive digit bounds
const MIN_DIGIT: u8 = 0;
const MAX_DIGIT: u8 = 255;

/// A causally stable position in a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Fractional digit path
    pub digits: Vec<u8>,
    /// Issuing agent, the tie-break for identical digit paths
    pub agent: String,
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.digits
            .cmp(&other.digits)
            .then_with(|| self.agent.cmp(&other.agent))
    }
}

impl Position {
    /// A position strictly between `left` and `right` (either may be
    /// absent, meaning the document edge)
    pub fn between(left: Option<&Position>, right: Option<&Position>, agent: &str) -> Position {
        let lo: &[u8] = left.map(|p| p.digits.as_slice()).unwrap_or(&[]);
        let hi: &[u8] = right.map(|p| p.digits.as_slice()).unwrap_or(&[]);
        Position {
            digits: digits_between(lo, hi),
            agent: agent.to_string(),
        }
    }

    /// The midpoint position of an empty document
    pub fn root(agent: &str) -> Position {
        Position {
            digits: vec![128],
            agent: agent.to_string(),
        }
    }
}

/// Digits strictly between `lo` and `hi` in lexicographic order.
///
/// `hi` empty means unbounded above. Once the path diverges below `hi` the
/// upper bound stops constraining deeper digits.
fn digits_between(lo: &[u8], hi: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(lo.len() + 1);
    let mut bounded = !hi.is_empty();
    let mut i = 0;
    loop {
        let l = lo.get(i).copied().unwrap_or(MIN_DIGIT) as u16;
        let h = if bounded {
            match hi.get(i) {
                Some(&d) => d as u16,
                // hi exhausted: bounds were inverted, extend lo instead
                None => {
                    out.extend_from_slice(&lo[i.min(lo.len())..]);
                    out.push(128);
                    return out;
                }
            }
        } else {
            MAX_DIGIT as u16
        };

        if h > l + 1 {
            out.push((l + (h - l) / 2) as u8);
            return out;
        }
        if h == l + 1 {
            // Adopt the low digit; deeper digits are only bounded below
            out.push(l as u8);
            bounded = false;
            i += 1;
            continue;
        }
        if h == l {
            out.push(l as u8);
            i += 1;
            continue;
        }
        // h < l: inverted bounds, fall back to extending lo
        out.extend_from_slice(&lo[i..]);
        out.push(128);
        return out;
    }
}
