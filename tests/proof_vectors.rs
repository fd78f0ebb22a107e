//! Known-answer tests for proofs over a fixed ten-key tree
//!
//! The tree holds `key i -> value i` for i in 0..10, committed at version 0.
//! Its shape is fixed by the keys alone, so root hashes and proof bytes are
//! stable across implementations.
//!
//! Run with:
//! ```bash
//! cargo test --test proof_vectors
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use mkvs::{
    verify_proof, Context, Error, Hash, MemoryStore, Namespace, Node, NodePointer, Proof,
    ProofBuilder, Tree, VerifiedTree,
};

const ROOT: &str = "f1aa15ca452b360648a17256fef40970a992bd972d062cb93bb40c7cb043f4c9";

/// Root and its left child disclosed, everything else collapsed
const ROOT_AND_LEFT: &str = "omdlbnRyaWVzhVIBAQAAAAAAAAAAJABrZXkgMAJOAQEAAAAAAAAAAAEAAAJYIQIQb3/oa32LwFDPgWs981ShL0gbPqt1ukBp6HbjH/Wz81ghAqDH7XAay7FXPD3A1Jjerq2VJ3+qXKpDmsn2GZaRC/MyWCEC/pte6Ci+YRcj5qqf30hjTTdsnnSLQYRJJuDntH47+SdudW50cnVzdGVkX3Jvb3RYIPGqFcpFKzYGSKFyVv70CXCpkr2XLQYsuTu0DHywQ/TJ";

fn ten_key_tree(store: &MemoryStore) -> (Tree<'_>, Hash) {
    let ctx = Context::background();
    let mut tree = Tree::new(store);
    for i in 0..10 {
        tree.insert(
            &ctx,
            format!("key {}", i).as_bytes(),
            format!("value {}", i).as_bytes(),
        )
        .unwrap();
    }
    let root = tree.commit(&ctx, Namespace::default(), 0).unwrap();
    (tree, root)
}

fn left(node: &Node) -> &Node {
    match node {
        Node::Internal(n) => n.left().and_then(NodePointer::node).unwrap(),
        Node::Leaf(_) => panic!("leaf has no children"),
    }
}

fn right(node: &Node) -> &Node {
    match node {
        Node::Internal(n) => n.right().and_then(NodePointer::node).unwrap(),
        Node::Leaf(_) => panic!("leaf has no children"),
    }
}

fn root_and_left_proof() -> (Proof, Hash) {
    let store = MemoryStore::new();
    let (tree, root) = ten_key_tree(&store);
    let top = tree.root_node().unwrap();

    let mut builder = ProofBuilder::new(root);
    builder.include(Some(top));
    builder.include(Some(left(top)));
    let proof = builder.build(&Context::background()).unwrap();
    (proof, root)
}

fn entry_hex(proof: &Proof, index: usize) -> String {
    hex::encode(&**proof.entries[index].as_ref().unwrap())
}

#[test]
fn test_root_hash() {
    let store = MemoryStore::new();
    let (_, root) = ten_key_tree(&store);
    assert_eq!(root.to_hex(), ROOT);
    assert_eq!(store.len(), 19);
}

#[test]
fn test_root_and_left_proof_bytes() {
    let (proof, root) = root_and_left_proof();

    let tags: Vec<u8> = proof.entries.iter().map(|e| e.as_ref().unwrap()[0]).collect();
    assert_eq!(tags, vec![0x01, 0x01, 0x02, 0x02, 0x02]);
    assert_eq!(entry_hex(&proof, 0), "0101000000000000000024006b6579203002");
    assert_eq!(entry_hex(&proof, 1), "0101000000000000000001000002");
    assert_eq!(
        entry_hex(&proof, 4),
        "02fe9b5ee828be611723e6aa9fdf48634d376c9e748b41844926e0e7b47e3bf927"
    );

    let encoded = proof.to_cbor().unwrap();
    assert_eq!(STANDARD.encode(&encoded), ROOT_AND_LEFT);

    let decoded = Proof::from_cbor(&STANDARD.decode(ROOT_AND_LEFT).unwrap()).unwrap();
    assert_eq!(decoded, proof);
    verify_proof(&root, &decoded).unwrap();
}

#[test]
fn test_right_spine_proof() {
    let store = MemoryStore::new();
    let (tree, root) = ten_key_tree(&store);
    let top = tree.root_node().unwrap();

    let mut builder = ProofBuilder::new(root);
    builder.include(Some(top));
    builder.include(Some(right(top)));
    builder.include(Some(left(right(top))));
    let proof = builder.build(&Context::background()).unwrap();

    let entries: Vec<String> = (0..proof.entries.len())
        .map(|i| entry_hex(&proof, i))
        .collect();
    assert_eq!(
        entries,
        vec![
            "0101000000000000000024006b6579203002".to_string(),
            "02a65e6de4300db42fcfe5228cd232849f291456fc7681dbe40b8a446b9549865d".to_string(),
            "0101000000000000000003008002".to_string(),
            "0100000000000000000028006b657920380700000076616c75652038".to_string(),
            "0226641fa3d2eb79c5b0f3128173e8fd2f0f8198b358f36276dfb76e9eb4407d3d".to_string(),
        ]
    );

    let verified = VerifiedTree::new(&root, &proof).unwrap();
    assert_eq!(verified.get(b"key 8").unwrap(), Some(&b"value 8"[..]));
    assert!(matches!(
        verified.get(b"key 9"),
        Err(Error::UnresolvedSubtree(_))
    ));
}

#[test]
fn test_tampered_hash_entry() {
    let (mut proof, root) = root_and_left_proof();
    proof.entries[4].as_mut().unwrap().0[10] = 0;
    assert!(matches!(
        verify_proof(&root, &proof),
        Err(Error::ProofInvalid { .. })
    ));
}

#[test]
fn test_truncated_full_entry() {
    let (mut proof, root) = root_and_left_proof();
    proof.entries[0].as_mut().unwrap().0.truncate(3);
    assert!(matches!(verify_proof(&root, &proof), Err(Error::Format(_))));
}

#[test]
fn test_truncated_hash_entry() {
    let (mut proof, root) = root_and_left_proof();
    proof.entries[2].as_mut().unwrap().0.truncate(3);
    assert!(matches!(verify_proof(&root, &proof), Err(Error::Format(_))));
}

#[test]
fn test_unknown_discriminant() {
    let (mut proof, root) = root_and_left_proof();
    proof.entries[3].as_mut().unwrap().0[0] = 0xaa;
    assert!(matches!(verify_proof(&root, &proof), Err(Error::Format(_))));
}

#[test]
fn test_wrong_trusted_root() {
    let (proof, _) = root_and_left_proof();
    let bogus = Hash::digest(b"bogus");
    assert!(matches!(
        verify_proof(&bogus, &proof),
        Err(Error::RootMismatch { .. })
    ));
}

#[test]
fn test_builder_without_root() {
    let builder = ProofBuilder::new(Hash::from_hex(ROOT).unwrap());
    assert!(matches!(
        builder.build(&Context::background()),
        Err(Error::IncompleteProof)
    ));
}

#[test]
fn test_key_proof_from_reopened_tree() {
    let store = MemoryStore::new();
    let (_, root) = ten_key_tree(&store);
    let ctx = Context::background();

    let mut tree = Tree::from_root(&store, root);
    let proof = tree.get_proof(&ctx, b"key 3").unwrap();
    let bytes = proof.to_cbor().unwrap();

    let verified = VerifiedTree::new(&root, &Proof::from_cbor(&bytes).unwrap()).unwrap();
    assert_eq!(verified.get(b"key 3").unwrap(), Some(&b"value 3"[..]));
}
