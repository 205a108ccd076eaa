//! Signature cipher programs and their execution
//!
//! A [`CipherProgram`] is the ordered list of primitive operations recovered
//! from one revision of the player script. Applying it is pure and
//! deterministic; extraction lives in [`crate::platform::extractor`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Primitive operation performed by a cipher helper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CipherOperation {
    /// Reverse the whole sequence
    Reverse,
    /// Remove the first `n` elements
    SpliceFromIndex(usize),
    /// Swap element 0 with element `k % len`
    SwapAt(usize),
}

impl CipherOperation {
    /// Apply the operation in place
    pub fn apply(&self, chars: &mut Vec<char>) {
        match *self {
            CipherOperation::Reverse => chars.reverse(),
            CipherOperation::SpliceFromIndex(n) => {
                let n = n.min(chars.len());
                chars.drain(..n);
            }
            CipherOperation::SwapAt(k) => {
                if !chars.is_empty() {
                    let index = k % chars.len();
                    chars.swap(0, index);
                }
            }
        }
    }
}

impl fmt::Display for CipherOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CipherOperation::Reverse => write!(f, "rev"),
            CipherOperation::SpliceFromIndex(n) => write!(f, "spl({})", n),
            CipherOperation::SwapAt(k) => write!(f, "swp({})", k),
        }
    }
}

/// Ordered sequence of cipher operations for one player revision
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherProgram {
    operations: Vec<CipherOperation>,
}

impl CipherProgram {
    /// Create a program from its operations
    pub fn new(operations: Vec<CipherOperation>) -> Self {
        Self { operations }
    }

    /// Operations in execution order
    pub fn operations(&self) -> &[CipherOperation] {
        &self.operations
    }

    /// Number of operations
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Check if the program does nothing
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Decipher a scrambled signature
    pub fn apply(&self, token: &str) -> String {
        let mut chars: Vec<char> = token.chars().collect();
        for operation in &self.operations {
            operation.apply(&mut chars);
        }
        chars.into_iter().collect()
    }
}

impl fmt::Display for CipherProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.operations.iter().map(|op| op.to_string()).collect();
        write!(f, "{}", parts.join(" "))
    }
}

/// Identifier of one player script revision
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerVersionKey(String);

impl PlayerVersionKey {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    /// Derive the key from a player script URL or path.
    ///
    /// Recognizes `player-<ver>/`, `player_ias-<ver>/` and `/s/player/<ver>/`
    /// layouts; anything else is keyed by its full path.
    pub fn from_player_url(player_url: &str) -> Self {
        let path = player_url
            .split(['?', '#'])
            .next()
            .unwrap_or(player_url);

        for marker in ["player_ias-", "player-"] {
            if let Some(start) = path.find(marker) {
                let rest = &path[start + marker.len()..];
                let version = rest.split('/').next().unwrap_or_default();
                if !version.is_empty() {
                    return Self::new(version);
                }
            }
        }

        if let Some(start) = path.find("/s/player/") {
            let rest = &path[start + "/s/player/".len()..];
            if let Some(version) = rest.split('/').next().filter(|v| !v.is_empty()) {
                return Self::new(version);
            }
        }

        Self::new(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PlayerVersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
