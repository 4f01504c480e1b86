//! Integration tests for the order replica: multi-node convergence
//! scenarios driven purely through the public domain API.

use deskring_core::domain::order::{OrderReplica, OrderUpdate};

fn ids(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Delivers one replica's order to another with a fresh generation, the way
/// the server loop broadcasts after a local change.
fn gossip(from: &mut OrderReplica, to: &mut OrderReplica, connected: &[String]) -> OrderUpdate {
    let generation = from.next_generation();
    to.apply_update(generation, from.order().to_vec(), connected)
}

#[test]
fn test_two_nodes_converge_from_symmetric_join() {
    // Each side appended the other to its own right, so the initial views
    // disagree: [a, b] versus [b, a]. One gossip round settles it.
    let mut a = OrderReplica::new("a");
    let mut b = OrderReplica::new("b");
    a.refresh(&ids(&["b"]));
    b.refresh(&ids(&["a"]));
    assert_ne!(a.order(), b.order());

    let outcome = gossip(&mut a, &mut b, &ids(&["a"]));
    assert!(matches!(outcome, OrderUpdate::Applied { .. }));
    assert_eq!(a.order(), b.order());
}

#[test]
fn test_gossip_of_identical_order_terminates() {
    let mut a = OrderReplica::new("a");
    let mut b = OrderReplica::new("b");
    a.set_order(ids(&["a", "b"]), &ids(&["b"]));
    b.set_order(ids(&["a", "b"]), &ids(&["a"]));

    let first = gossip(&mut a, &mut b, &ids(&["a"]));
    assert!(matches!(first, OrderUpdate::Applied { .. } | OrderUpdate::Unchanged));

    // Echo back: nothing further to apply, nothing further to send.
    let second = gossip(&mut b, &mut a, &ids(&["b"]));
    assert_eq!(second, OrderUpdate::Unchanged);
    assert_eq!(a.order(), b.order());
}

#[test]
fn test_concurrent_divergent_edits_converge_to_one_order() {
    // Three nodes, fully meshed, all starting from [a, b, c].
    let base = ids(&["a", "b", "c"]);
    let mut a = OrderReplica::new("a");
    let mut b = OrderReplica::new("b");
    let mut c = OrderReplica::new("c");
    a.set_order(base.clone(), &ids(&["b", "c"]));
    b.set_order(base.clone(), &ids(&["a", "c"]));
    c.set_order(base, &ids(&["a", "b"]));

    // a and b edit concurrently and both broadcast at the same generation.
    a.set_order(ids(&["b", "a", "c"]), &ids(&["b", "c"]));
    b.set_order(ids(&["a", "c", "b"]), &ids(&["a", "c"]));
    let gen_a = a.next_generation();
    let gen_b = b.next_generation();
    assert_eq!(gen_a, gen_b);

    let proposal_a = a.order().to_vec();
    let proposal_b = b.order().to_vec();

    // Everyone receives both proposals, in different orders.
    b.apply_update(gen_a, proposal_a.clone(), &ids(&["a", "c"]));
    a.apply_update(gen_b, proposal_b.clone(), &ids(&["b", "c"]));
    c.apply_update(gen_a, proposal_a, &ids(&["a", "b"]));
    c.apply_update(gen_b, proposal_b, &ids(&["a", "b"]));

    // Survivors of the tie-break re-broadcast until nothing changes.
    for _ in 0..3 {
        let from_a = a.order().to_vec();
        let gen = a.next_generation();
        b.apply_update(gen, from_a.clone(), &ids(&["a", "c"]));
        c.apply_update(gen, from_a, &ids(&["a", "b"]));

        let from_b = b.order().to_vec();
        let gen = b.next_generation();
        a.apply_update(gen, from_b.clone(), &ids(&["b", "c"]));
        c.apply_update(gen, from_b, &ids(&["a", "b"]));
    }

    assert_eq!(a.order(), b.order());
    assert_eq!(b.order(), c.order());
}

#[test]
fn test_late_joiner_adopts_existing_order_and_appends_itself() {
    let mut veteran = OrderReplica::new("a");
    veteran.set_order(ids(&["a", "b"]), &ids(&["b"]));
    veteran.merge_generation(9);

    let mut joiner = OrderReplica::new("d");
    joiner.merge_generation(9); // max-merged at handshake

    let generation = veteran.next_generation();
    let outcome = joiner.apply_update(generation, veteran.order().to_vec(), &ids(&["a", "b"]));
    assert!(matches!(outcome, OrderUpdate::Applied { .. }));

    // The joiner keeps itself in the order and lands on the right end.
    assert_eq!(joiner.order(), ids(&["a", "b", "d"]));
    assert_eq!(joiner.left(), ids(&["b", "a"]));
}

#[test]
fn test_membership_survives_a_stale_layout_proposal() {
    // A proposal that predates peer "c" must not evict it.
    let connected = ids(&["b", "c"]);
    let mut replica = OrderReplica::new("a");
    replica.refresh(&connected);
    assert!(replica.is_known("c"));

    let outcome = replica.apply_update(1, ids(&["b", "a"]), &connected);
    assert!(matches!(outcome, OrderUpdate::Applied { .. }));
    assert!(replica.is_known("c"), "connected peer must stay in the order");
    assert!(replica.right().contains(&"c".to_string()));
}
