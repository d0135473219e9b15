use crate::helpers::Network;
use tree_fugue_core::{MessageMeta, TextError, TreeFugueText};

#[test]
fn test_concurrent_inserts_at_start_converge() {
    let mut net = Network::new(2);
    net.insert(0, 0, "AAA");
    net.insert(1, 0, "BBB");
    net.sync_all();

    net.assert_converged();
    assert_eq!(net.text(0), "AAABBB");
    net.assert_mirrors();
}

#[test]
fn test_three_replicas_mixed_edits() {
    let mut net = Network::new(3);
    net.insert(0, 0, "The quick fox");
    net.sync_all();

    net.insert(1, 4, "very ");
    net.insert(2, 13, " jumps");
    net.delete(0, 0, 4);
    net.sync_all();

    net.assert_converged();
    assert_eq!(net.text(0), "very quick fox jumps");
    net.assert_mirrors();
}

#[test]
fn test_delete_of_concurrently_extended_text() {
    let mut net = Network::new(2);
    net.insert(0, 0, "abc");
    net.sync_all();

    // replica0 keeps typing while replica1 deletes the tail it knows
    net.insert(0, 3, "def");
    net.delete(1, 1, 2);
    net.sync_all();

    net.assert_converged();
    assert_eq!(net.text(1), "adef");
    net.assert_mirrors();
}

#[test]
fn test_same_index_different_order_of_delivery() {
    let mut net = Network::new(3);
    net.insert(0, 0, "x");
    net.insert(1, 0, "y");
    net.insert(2, 0, "z");

    // Deliver in different orders: replica2 first, then replica0
    net.sync(2);
    net.sync(0);
    net.sync(1);

    net.assert_converged();
    assert_eq!(net.text(0), "xyz");
}

#[test]
fn test_out_of_causal_order_insert_fails() {
    let mut a = TreeFugueText::new("a".to_string());
    let mut b = TreeFugueText::new("b".to_string());
    let mut c = TreeFugueText::new("c".to_string());

    a.insert(0, "hello").unwrap();
    let first = a.take_outbox();
    for m in &first {
        b.receive(m, MessageMeta::remote("a".to_string())).unwrap();
    }

    // b inserts in the middle of a's text, so its waypoint hangs off a's
    b.insert(2, "XX").unwrap();
    let second = b.take_outbox();

    // c has not seen a's insert yet
    let result = c.receive(&second[0], MessageMeta::remote("b".to_string()));
    assert!(matches!(result, Err(TextError::MissingParent { .. })));
    assert!(c.is_empty());

    // In causal order it applies fine
    for m in &first {
        c.receive(m, MessageMeta::remote("a".to_string())).unwrap();
    }
    c.receive(&second[0], MessageMeta::remote("b".to_string()))
        .unwrap();
    assert_eq!(c.to_string(), "heXXllo");
}

#[test]
fn test_echo_matches_remote_application() {
    let mut a = TreeFugueText::new("a".to_string());
    let mut b = TreeFugueText::new("b".to_string());

    a.insert(0, "one three").unwrap();
    a.insert(3, " two").unwrap();
    a.delete(0, 4).unwrap();

    for m in a.take_outbox() {
        b.receive(&m, MessageMeta::remote("a".to_string())).unwrap();
    }
    assert_eq!(a.to_string(), "two three");
    assert_eq!(b.to_string(), a.to_string());
}
