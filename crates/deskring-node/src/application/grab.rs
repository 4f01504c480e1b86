//! Grab arbiter: single-owner token for "who has the input focus".
//!
//! Exactly one node at a time owns the grab — the exclusive right to receive
//! keyboard and mouse input. Ownership moves optimistically: a node claims
//! the token, bumps the generation, and broadcasts; nobody waits for an
//! acknowledgment. Two simultaneous claims carry the same generation, and
//! the lexicographic order of node ids is the tie-break that makes every
//! node settle on the same winner regardless of arrival order.

use tracing::debug;

/// Who currently holds the grab, from this node's point of view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabOwner {
    /// Input stays on this node.
    SelfNode,
    /// Input is redirected to the named peer.
    Peer(String),
}

/// Outcome of a remote `UpdateGrab` claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrabClaim {
    /// The claim was accepted; re-broadcast it to everyone except the sender
    /// and start/stop local capture accordingly.
    Accepted { previous: GrabOwner },
    /// The claim names the owner we already track. Nothing to do.
    AlreadyOwner,
    /// Stale generation or lost the equal-generation tie-break. Dropped.
    Stale,
    /// The claim names a node we do not know — a protocol violation; the
    /// sender's connection must be dropped.
    UnknownOwner,
}

/// The grab token state machine.
///
/// Initial state: the local node owns its own input.
#[derive(Debug, Clone)]
pub struct GrabArbiter {
    self_id: String,
    owner: GrabOwner,
    generation: u64,
}

impl GrabArbiter {
    pub fn new(self_id: impl Into<String>) -> Self {
        Self {
            self_id: self_id.into(),
            owner: GrabOwner::SelfNode,
            generation: 0,
        }
    }

    pub fn owner(&self) -> &GrabOwner {
        &self.owner
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_self_active(&self) -> bool {
        self.owner == GrabOwner::SelfNode
    }

    /// Id of the current owner as it appears on the wire.
    pub fn owner_id(&self) -> &str {
        match &self.owner {
            GrabOwner::SelfNode => &self.self_id,
            GrabOwner::Peer(id) => id,
        }
    }

    /// The peer holding the grab, if it is not us.
    pub fn active_peer(&self) -> Option<&str> {
        match &self.owner {
            GrabOwner::SelfNode => None,
            GrabOwner::Peer(id) => Some(id),
        }
    }

    /// Renames the local node. Valid only before any remote exchange.
    pub fn set_self_id(&mut self, new_id: impl Into<String>) {
        self.self_id = new_id.into();
    }

    /// Max-merges a remote generation counter into ours (handshake).
    pub fn merge_generation(&mut self, remote: u64) {
        self.generation = self.generation.max(remote);
    }

    /// Hands the grab to a neighbor after a local edge-cross.
    ///
    /// Returns the new generation to broadcast.
    pub fn grant_to(&mut self, peer_id: impl Into<String>) -> u64 {
        self.owner = GrabOwner::Peer(peer_id.into());
        self.generation += 1;
        self.generation
    }

    /// Takes the grab back after the local release gesture.
    ///
    /// Returns the new generation to broadcast.
    pub fn claim_local(&mut self) -> u64 {
        self.owner = GrabOwner::SelfNode;
        self.generation += 1;
        self.generation
    }

    /// Re-announces the current owner with a fresh generation.
    ///
    /// Used after a handshake so the newcomer learns who holds the grab.
    /// Returns the new generation to broadcast.
    pub fn advertise(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Applies a remote `UpdateGrab{generation, owner_id}` claim.
    ///
    /// `is_known` answers whether an id is a registered peer. Acceptance:
    /// `generation` strictly above ours, or equal with `owner_id`
    /// lexicographically above the current owner's id. The accepted
    /// generation is adopted, never incremented — incrementing here would
    /// make every node outbid every other forever.
    pub fn handle_remote(
        &mut self,
        generation: u64,
        owner_id: &str,
        is_known: impl Fn(&str) -> bool,
    ) -> GrabClaim {
        let claimed = if owner_id == self.self_id {
            GrabOwner::SelfNode
        } else if is_known(owner_id) {
            GrabOwner::Peer(owner_id.to_string())
        } else {
            debug!(owner_id, "grab claim for unknown node");
            return GrabClaim::UnknownOwner;
        };

        if claimed == self.owner {
            return GrabClaim::AlreadyOwner;
        }

        let current_id = self.owner_id();
        if self.generation > generation
            || (self.generation == generation && current_id > owner_id)
        {
            debug!(
                generation,
                local = self.generation,
                "ignoring grab claim that lost arbitration"
            );
            return GrabClaim::Stale;
        }

        let previous = std::mem::replace(&mut self.owner, claimed);
        self.generation = generation;
        GrabClaim::Accepted { previous }
    }

    /// Reacts to the loss of a peer.
    ///
    /// If that peer held the grab, the token fails over to this node with a
    /// fresh generation — it must never point at a node that is no longer a
    /// member. Returns the generation to broadcast, or `None` when the lost
    /// peer did not hold the grab.
    pub fn peer_lost(&mut self, peer_id: &str) -> Option<u64> {
        if self.owner == GrabOwner::Peer(peer_id.to_string()) {
            self.owner = GrabOwner::SelfNode;
            self.generation += 1;
            Some(self.generation)
        } else {
            None
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
