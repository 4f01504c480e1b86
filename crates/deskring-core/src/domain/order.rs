//! Replicated node-order domain entity.
//!
//! Every node keeps the same left-to-right ordering of all known node ids —
//! the "ring" that decides which desktop sits to the left or right of which.
//! The ordering is replicated without a coordinator: each node broadcasts
//! generation-stamped [`UpdateOrder`](crate::protocol::messages::UpdateOrderMessage)
//! proposals and concurrent edits are reconciled with a deterministic,
//! duplicate-free two-list merge.
//!
//! The [`OrderReplica`] also derives the two *partitions*: the connected
//! peers positioned before self (left) and after self (right), each stored
//! nearest-to-self first, which is what the input-capture collaborator needs
//! to know which screen edge leads where.

use std::cmp::Ordering;

use tracing::debug;

/// Merges two duplicate-free id lists into one deterministic ordering.
///
/// The backbone is `a`: ids keep their `a` positions. Walking `b`, every run
/// of `b`-only ids found between two common ids is spliced into `a`
/// immediately before that common id (skipping any id already present in `a`
/// anywhere); `b` ids after the last common id are appended at the end.
///
/// The result contains every id of `a ∪ b`, contains no duplicates, and
/// `merge(l, l) == l` for any duplicate-free `l`.
pub fn merge(a: &[String], b: &[String]) -> Vec<String> {
    debug_assert!(!has_duplicates(a));
    debug_assert!(!has_duplicates(b));

    let mut out: Vec<String> = a.to_vec();
    let mut consumed = 0; // prefix of `b` already anchored into `out`
    let mut i = 0;
    while i < out.len() {
        if let Some(rel) = b[consumed..].iter().position(|id| *id == out[i]) {
            let common = consumed + rel;
            for id in &b[consumed..common] {
                if !out.contains(id) {
                    out.insert(i, id.clone());
                    i += 1;
                }
            }
            consumed = common + 1;
        }
        i += 1;
    }
    for id in &b[consumed..] {
        if !out.contains(id) {
            out.push(id.clone());
        }
    }

    debug_assert!(!has_duplicates(&out));
    out
}

/// Total lexicographic order over id lists: element-wise string comparison,
/// with the longer list greater when one is a prefix of the other.
pub fn compare(a: &[String], b: &[String]) -> Ordering {
    for (x, y) in a.iter().zip(b.iter()) {
        match x.cmp(y) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    a.len().cmp(&b.len())
}

/// Returns `true` if any id appears more than once.
///
/// Lists are bounded by the peer cap, so the quadratic scan is fine.
pub fn has_duplicates(list: &[String]) -> bool {
    for (i, id) in list.iter().enumerate() {
        if list[i + 1..].contains(id) {
            return true;
        }
    }
    false
}

/// Outcome of applying a remote `UpdateOrder` to the replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderUpdate {
    /// The proposed list contains duplicates — a protocol violation; the
    /// sender's connection must be dropped.
    Rejected,
    /// Stale generation, or lost the equal-generation tie-break. Dropped.
    Stale,
    /// The proposal equals the local order. The generation is adopted and
    /// nothing is rebroadcast — this is what terminates gossip loops.
    Unchanged,
    /// The proposal was merged in.
    Applied {
        /// The local order actually changed (partitions were recomputed and
        /// the layout collaborator must be notified).
        changed: bool,
        /// The final local order still differs from the proposal, so the
        /// rebroadcast must also go back to the sender.
        echo_sender: bool,
    },
}

/// The replicated node ordering plus its derived neighbor partitions.
///
/// The order always contains the local node id exactly once. Partitions only
/// ever name *connected* peers: a known-but-disconnected id keeps its order
/// slot but appears in neither partition.
#[derive(Debug, Clone)]
pub struct OrderReplica {
    self_id: String,
    generation: u64,
    order: Vec<String>,
    /// Connected peers before self, nearest-to-self first.
    left: Vec<String>,
    /// Connected peers after self, nearest-to-self first.
    right: Vec<String>,
}

impl OrderReplica {
    /// Creates a replica containing only the local node.
    pub fn new(self_id: impl Into<String>) -> Self {
        let self_id = self_id.into();
        Self {
            order: vec![self_id.clone()],
            self_id,
            generation: 0,
            left: Vec::new(),
            right: Vec::new(),
        }
    }

    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Connected peers to the left of self, nearest first.
    pub fn left(&self) -> &[String] {
        &self.left
    }

    /// Connected peers to the right of self, nearest first.
    pub fn right(&self) -> &[String] {
        &self.right
    }

    /// Nearest connected neighbor on the given side, if any.
    pub fn neighbor(&self, to_left: bool) -> Option<&str> {
        let side = if to_left { &self.left } else { &self.right };
        side.first().map(String::as_str)
    }

    /// Whether an id is in the replicated order (connected or not).
    pub fn is_known(&self, id: &str) -> bool {
        self.order.iter().any(|o| o == id)
    }

    /// Renames the local node, keeping its order slot.
    ///
    /// Only meaningful before any remote state exchange; the server layer
    /// enforces that no peer is registered yet.
    pub fn set_self_id(&mut self, new_id: impl Into<String>) {
        let new_id = new_id.into();
        if let Some(slot) = self.order.iter_mut().find(|o| **o == self.self_id) {
            *slot = new_id.clone();
        }
        self.self_id = new_id;
    }

    /// Max-merges a remote generation counter into ours (handshake).
    pub fn merge_generation(&mut self, remote: u64) {
        self.generation = self.generation.max(remote);
    }

    /// Pre-increments and returns the generation for an outbound update.
    pub fn next_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    /// Replaces the order wholesale and recomputes both partitions.
    ///
    /// `connected` is the current set of handshaken peer ids. Scanning the
    /// new order, every connected peer before self goes left and every one
    /// after self goes right, nearest-to-self first. Membership information
    /// always wins over a stale layout: the self id is re-appended if the
    /// proposal lost it, and any connected peer absent from the order is
    /// appended to both the order and the right partition.
    pub fn set_order(&mut self, new_order: Vec<String>, connected: &[String]) {
        self.order = new_order;
        if !self.order.contains(&self.self_id) {
            self.order.push(self.self_id.clone());
        }

        self.left.clear();
        self.right.clear();
        let mut on_left = true;
        for id in &self.order {
            if *id == self.self_id {
                on_left = false;
                continue;
            }
            if !connected.iter().any(|c| c == id) {
                continue;
            }
            if on_left {
                self.left.insert(0, id.clone());
            } else {
                self.right.push(id.clone());
            }
        }

        for id in connected {
            if *id == self.self_id {
                continue;
            }
            if self.left.contains(id) || self.right.contains(id) {
                continue;
            }
            self.order.push(id.clone());
            self.right.push(id.clone());
        }
    }

    /// Re-runs partition classification over the current order.
    ///
    /// This is the placement routine for a newly handshaken peer: an id
    /// already in the order slides into its slot, an unknown id is appended
    /// to the right end of the order.
    pub fn refresh(&mut self, connected: &[String]) {
        let order = std::mem::take(&mut self.order);
        self.set_order(order, connected);
    }

    /// Removes an id from the order and partitions. Returns whether it was
    /// present. The local node id cannot be removed.
    pub fn remove(&mut self, id: &str, connected: &[String]) -> bool {
        if id == self.self_id {
            return false;
        }
        let Some(pos) = self.order.iter().position(|o| o == id) else {
            return false;
        };
        self.order.remove(pos);
        self.refresh(connected);
        true
    }

    /// Applies a remote `UpdateOrder` proposal.
    ///
    /// Acceptance rules:
    /// - duplicate ids → [`OrderUpdate::Rejected`] (protocol violation);
    /// - `generation` below ours → [`OrderUpdate::Stale`];
    /// - proposal equal to our order → adopt the generation,
    ///   [`OrderUpdate::Unchanged`];
    /// - equal generation and our order compares lexicographically above the
    ///   proposal → [`OrderUpdate::Stale`] (the deterministic tie-break that
    ///   stops two diverging equal-generation proposals from merging back
    ///   and forth forever);
    /// - otherwise merge the proposal with our order (never a blind
    ///   overwrite), refresh partitions, adopt the generation.
    pub fn apply_update(
        &mut self,
        generation: u64,
        proposed: Vec<String>,
        connected: &[String],
    ) -> OrderUpdate {
        if has_duplicates(&proposed) {
            debug!("order proposal contains duplicate ids");
            return OrderUpdate::Rejected;
        }
        if generation < self.generation {
            debug!(
                generation,
                local = self.generation,
                "ignoring stale order proposal"
            );
            return OrderUpdate::Stale;
        }
        if proposed == self.order {
            self.generation = self.generation.max(generation);
            return OrderUpdate::Unchanged;
        }
        if generation == self.generation && compare(&self.order, &proposed) == Ordering::Greater {
            debug!(generation, "ignoring equal-generation order proposal that lost the tie-break");
            return OrderUpdate::Stale;
        }

        let merged = merge(&proposed, &self.order);
        let changed = merged != self.order;
        if changed {
            self.set_order(merged, connected);
        }
        self.generation = self.generation.max(generation);
        let echo_sender = self.order != proposed;
        OrderUpdate::Applied {
            changed,
            echo_sender,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    // ── merge ─────────────────────────────────────────────────────────────────

    #[test]
    fn test_merge_is_idempotent() {
        let l = ids(&["a", "b", "c"]);
        assert_eq!(merge(&l, &l), l);
    }

    #[test]
    fn test_merge_of_empty_lists() {
        assert_eq!(merge(&[], &[]), Vec::<String>::new());
        let l = ids(&["a", "b"]);
        assert_eq!(merge(&l, &[]), l);
        assert_eq!(merge(&[], &l), l);
    }

    #[test]
    fn test_merge_splices_before_common_anchor() {
        // The worked example: merge([A,C,D], [A,B,C]) == [A,B,C,D]
        let result = merge(&ids(&["a", "c", "d"]), &ids(&["a", "b", "c"]));
        assert_eq!(result, ids(&["a", "b", "c", "d"]));
    }

    #[test]
    fn test_merge_appends_tail_after_last_common_id() {
        let result = merge(&ids(&["a", "b"]), &ids(&["a", "x", "y"]));
        assert_eq!(result, ids(&["a", "x", "y", "b"]));
    }

    #[test]
    fn test_merge_with_disjoint_lists_appends() {
        let result = merge(&ids(&["a", "b"]), &ids(&["x", "y"]));
        assert_eq!(result, ids(&["a", "b", "x", "y"]));
    }

    #[test]
    fn test_merge_skips_ids_already_present_anywhere() {
        // "b" sits after the anchor "c" in the left list; splicing the run
        // [b] before "c" must not duplicate it.
        let result = merge(&ids(&["a", "c", "b"]), &ids(&["a", "b", "c"]));
        assert_eq!(result, ids(&["a", "c", "b"]));
    }

    #[test]
    fn test_merge_result_is_superset_without_duplicates() {
        let a = ids(&["one", "two", "four", "five", "six", "eight"]);
        let b = ids(&["one", "two", "three", "four", "six", "eight"]);
        let merged = merge(&a, &b);
        assert!(!has_duplicates(&merged));
        for id in a.iter().chain(b.iter()) {
            assert!(merged.contains(id), "missing {id}");
        }
    }

    #[test]
    fn test_merge_chain_stays_duplicate_free() {
        let mut acc = ids(&["one", "two", "four", "five", "six", "eight"]);
        for other in [
            ids(&["one", "two", "three", "four", "six", "eight"]),
            ids(&["one", "seven", "eight"]),
            ids(&["three", "nine", "two"]),
        ] {
            acc = merge(&acc, &other);
            assert!(!has_duplicates(&acc));
            for id in &other {
                assert!(acc.contains(id));
            }
        }
    }

    // ── compare / has_duplicates ──────────────────────────────────────────────

    #[test]
    fn test_compare_orders_element_wise() {
        assert_eq!(compare(&ids(&["a", "b"]), &ids(&["a", "b"])), Ordering::Equal);
        assert_eq!(compare(&ids(&["a", "b"]), &ids(&["a", "c"])), Ordering::Less);
        assert_eq!(compare(&ids(&["b"]), &ids(&["a", "z"])), Ordering::Greater);
    }

    #[test]
    fn test_compare_prefix_is_less() {
        assert_eq!(compare(&ids(&["a"]), &ids(&["a", "b"])), Ordering::Less);
        assert_eq!(compare(&ids(&["a", "b"]), &ids(&["a"])), Ordering::Greater);
    }

    #[test]
    fn test_has_duplicates() {
        assert!(!has_duplicates(&ids(&["a", "b", "c"])));
        assert!(has_duplicates(&ids(&["a", "b", "a"])));
        assert!(!has_duplicates(&[]));
    }

    // ── partitions ────────────────────────────────────────────────────────────

    #[test]
    fn test_partitions_split_around_self() {
        let mut replica = OrderReplica::new("b");
        replica.set_order(ids(&["a", "b", "c"]), &ids(&["a", "c"]));
        assert_eq!(replica.left(), ids(&["a"]));
        assert_eq!(replica.right(), ids(&["c"]));
    }

    #[test]
    fn test_partitions_are_nearest_to_self_first() {
        let mut replica = OrderReplica::new("c");
        replica.set_order(
            ids(&["a", "b", "c", "d", "e"]),
            &ids(&["a", "b", "d", "e"]),
        );
        assert_eq!(replica.left(), ids(&["b", "a"]));
        assert_eq!(replica.right(), ids(&["d", "e"]));
    }

    #[test]
    fn test_disconnected_ids_keep_order_slot_but_leave_partitions() {
        let mut replica = OrderReplica::new("b");
        replica.set_order(ids(&["a", "b", "c"]), &ids(&["c"]));
        assert_eq!(replica.order(), ids(&["a", "b", "c"]));
        assert!(replica.left().is_empty());
        assert_eq!(replica.right(), ids(&["c"]));
    }

    #[test]
    fn test_connected_peer_missing_from_order_is_appended_right() {
        // Connecting unknown peer D to order [A,B,C] (self B) yields
        // order [A,B,C,D] and right partition [C,D].
        let mut replica = OrderReplica::new("b");
        replica.set_order(ids(&["a", "b", "c"]), &ids(&["a", "c", "d"]));
        assert_eq!(replica.order(), ids(&["a", "b", "c", "d"]));
        assert_eq!(replica.left(), ids(&["a"]));
        assert_eq!(replica.right(), ids(&["c", "d"]));
    }

    #[test]
    fn test_set_order_restores_missing_self_id() {
        let mut replica = OrderReplica::new("me");
        replica.set_order(ids(&["a", "b"]), &ids(&["a", "b"]));
        assert!(replica.order().contains(&"me".to_string()));
        // Everything sits before self, so both peers are on the left.
        assert_eq!(replica.left(), ids(&["b", "a"]));
        assert!(replica.right().is_empty());
    }

    #[test]
    fn test_refresh_slots_newly_connected_known_peer() {
        let mut replica = OrderReplica::new("b");
        replica.set_order(ids(&["a", "b", "c"]), &[]);
        assert!(replica.left().is_empty());

        replica.refresh(&ids(&["a"]));
        assert_eq!(replica.left(), ids(&["a"]));
        assert_eq!(replica.order(), ids(&["a", "b", "c"]));
    }

    #[test]
    fn test_neighbor_returns_nearest_on_each_side() {
        let mut replica = OrderReplica::new("c");
        replica.set_order(
            ids(&["a", "b", "c", "d"]),
            &ids(&["a", "b", "d"]),
        );
        assert_eq!(replica.neighbor(true), Some("b"));
        assert_eq!(replica.neighbor(false), Some("d"));
    }

    #[test]
    fn test_neighbor_is_none_when_side_is_empty() {
        let replica = OrderReplica::new("solo");
        assert_eq!(replica.neighbor(true), None);
        assert_eq!(replica.neighbor(false), None);
    }

    #[test]
    fn test_remove_drops_id_and_refreshes_partitions() {
        let mut replica = OrderReplica::new("b");
        replica.set_order(ids(&["a", "b", "c"]), &ids(&["a", "c"]));
        assert!(replica.remove("c", &ids(&["a"])));
        assert_eq!(replica.order(), ids(&["a", "b"]));
        assert!(replica.right().is_empty());
        assert!(!replica.remove("c", &ids(&["a"])));
    }

    #[test]
    fn test_remove_refuses_self() {
        let mut replica = OrderReplica::new("me");
        assert!(!replica.remove("me", &[]));
        assert_eq!(replica.order(), ids(&["me"]));
    }

    #[test]
    fn test_rename_keeps_order_slot() {
        let mut replica = OrderReplica::new("draft-name");
        replica.set_self_id("final-name");
        assert_eq!(replica.self_id(), "final-name");
        assert_eq!(replica.order(), ids(&["final-name"]));
    }

    // ── apply_update ──────────────────────────────────────────────────────────

    #[test]
    fn test_apply_update_rejects_duplicates() {
        let mut replica = OrderReplica::new("me");
        let out = replica.apply_update(1, ids(&["a", "a"]), &[]);
        assert_eq!(out, OrderUpdate::Rejected);
        assert_eq!(replica.order(), ids(&["me"]));
    }

    #[test]
    fn test_apply_update_ignores_stale_generation() {
        let mut replica = OrderReplica::new("me");
        replica.merge_generation(5);
        let out = replica.apply_update(4, ids(&["a", "me"]), &[]);
        assert_eq!(out, OrderUpdate::Stale);
        assert_eq!(replica.order(), ids(&["me"]));
    }

    #[test]
    fn test_apply_update_identical_order_adopts_generation() {
        let mut replica = OrderReplica::new("me");
        let out = replica.apply_update(7, ids(&["me"]), &[]);
        assert_eq!(out, OrderUpdate::Unchanged);
        assert_eq!(replica.generation(), 7);
    }

    #[test]
    fn test_apply_update_merges_and_reports_change() {
        let mut replica = OrderReplica::new("b");
        replica.set_order(ids(&["a", "b"]), &ids(&["a"]));
        let out = replica.apply_update(1, ids(&["a", "b", "c"]), &ids(&["a"]));
        assert_eq!(
            out,
            OrderUpdate::Applied {
                changed: true,
                echo_sender: false,
            }
        );
        assert_eq!(replica.order(), ids(&["a", "b", "c"]));
        assert_eq!(replica.generation(), 1);
    }

    #[test]
    fn test_apply_update_echoes_sender_when_merge_diverges() {
        let mut replica = OrderReplica::new("b");
        replica.set_order(ids(&["a", "b", "d"]), &ids(&["a"]));
        // Proposal misses "d"; the merge keeps it, so the sender must hear
        // the merged result back.
        let out = replica.apply_update(1, ids(&["a", "b", "c"]), &ids(&["a"]));
        match out {
            OrderUpdate::Applied { echo_sender, .. } => assert!(echo_sender),
            other => panic!("expected Applied, got {other:?}"),
        }
        assert!(replica.is_known("c"));
        assert!(replica.is_known("d"));
    }

    #[test]
    fn test_apply_update_equal_generation_tie_break_is_deterministic() {
        // Two replicas at the same generation with diverged orders must
        // settle on the same list no matter the exchange direction.
        let connected: Vec<String> = vec![];
        let mut first = OrderReplica::new("n1");
        first.set_order(ids(&["n1", "x", "y"]), &connected);
        first.merge_generation(3);
        let mut second = OrderReplica::new("n2");
        second.set_order(ids(&["n1", "y", "x"]), &connected);
        second.merge_generation(3);

        let from_second = second.order().to_vec();
        let from_first = first.order().to_vec();
        let out_first = first.apply_update(3, from_second, &connected);
        let out_second = second.apply_update(3, from_first, &connected);

        // Exactly one side yields; the other ignores.
        let first_applied = matches!(out_first, OrderUpdate::Applied { .. });
        let second_applied = matches!(out_second, OrderUpdate::Applied { .. });
        assert_ne!(first_applied, second_applied);
        assert_eq!(first.order(), second.order());
    }

    #[test]
    fn test_apply_update_refreshes_partitions_for_connected_peers() {
        let mut replica = OrderReplica::new("b");
        let connected = ids(&["a", "c"]);
        replica.refresh(&connected);
        let out = replica.apply_update(1, ids(&["a", "b", "c"]), &connected);
        assert!(matches!(out, OrderUpdate::Applied { changed: true, .. }));
        assert_eq!(replica.left(), ids(&["a"]));
        assert_eq!(replica.right(), ids(&["c"]));
    }
}
