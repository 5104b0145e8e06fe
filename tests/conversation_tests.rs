//! Integration tests for conversation reconstruction over indexed files.

use std::path::Path;

use emlshelf::config::IndexingConfig;
use emlshelf::error::ShelfError;
use emlshelf::index::Indexer;
use emlshelf::model::email::{NewEmail, ParsedUnit};
use emlshelf::store::Database;
use emlshelf::thread::{Conversations, ThreadLimits};

fn email(id: &str, parent: Option<&str>, subject: &str, date: &str) -> String {
    let mut raw = format!("Message-ID: <{id}>\r\nFrom: someone@example.com\r\n");
    if let Some(parent) = parent {
        raw.push_str(&format!("In-Reply-To: <{parent}>\r\nReferences: <{parent}>\r\n"));
    }
    raw.push_str(&format!("Subject: {subject}\r\nDate: {date}\r\n\r\nText of {subject}\r\n"));
    raw
}

fn index(root: &Path, db: &Database) {
    let result = Indexer::new(db.clone(), root, IndexingConfig::default())
        .index_all()
        .unwrap();
    assert_eq!(result.failed, 0, "failed: {:?}", result.failed_files);
}

fn id_of(db: &Database, path: &str) -> i64 {
    db.find_by_path(path).unwrap().unwrap().id
}

fn chain(db: &Database, len: usize) -> Vec<i64> {
    let units: Vec<ParsedUnit> = (1..=len)
        .map(|i| ParsedUnit {
            email: NewEmail {
                file_path: format!("chain/{i:04}.eml"),
                message_id: format!("m{i}"),
                in_reply_to: if i == 1 { String::new() } else { format!("m{}", i - 1) },
                ..NewEmail::default()
            },
            attachments: Vec::new(),
        })
        .collect();
    db.insert_batch(&units).unwrap()
}

#[test]
fn test_three_message_thread() {
    let root = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    std::fs::write(
        root.path().join("email1.eml"),
        email("e1@x", None, "Plan", "Mon, 1 Jan 2024 09:00:00 +0000"),
    )
    .unwrap();
    std::fs::write(
        root.path().join("email2.eml"),
        email("e2@x", Some("e1@x"), "Re: Plan", "Mon, 1 Jan 2024 10:00:00 +0000"),
    )
    .unwrap();
    std::fs::write(
        root.path().join("email3.eml"),
        email("e3@x", Some("e2@x"), "Re: Re: Plan", "Mon, 1 Jan 2024 11:00:00 +0000"),
    )
    .unwrap();

    let db = Database::open(data.path().join("catalog.db")).unwrap();
    index(root.path(), &db);
    let conversations = Conversations::new(db.clone());

    assert_eq!(db.count_replies("e1@x").unwrap(), 2);

    let leaf = db.find_by_path("email3.eml").unwrap().unwrap();
    let found = conversations.find_root(&leaf).unwrap();
    assert_eq!(found.file_path, "email1.eml");

    let tree = conversations
        .conversation_tree(id_of(&db, "email2.eml"))
        .unwrap();
    assert!(tree.is_root);
    assert_eq!(tree.record.message_id, "e1@x");
    assert_eq!(tree.reply_count, 2);
    assert_eq!(tree.children.len(), 1);
    assert_eq!(tree.children[0].children[0].record.message_id, "e3@x");
    assert_eq!(tree.children[0].children[0].depth, 2);

    let flat: Vec<String> = conversations
        .conversation_emails(id_of(&db, "email3.eml"))
        .unwrap()
        .into_iter()
        .map(|r| r.file_path)
        .collect();
    assert_eq!(flat, vec!["email1.eml", "email2.eml", "email3.eml"]);

    let roots = conversations.roots_with_reply_counts(10, 0).unwrap();
    assert_eq!(roots.len(), 1);
    assert_eq!(roots[0].reply_count, 2);
    assert_eq!(db.count_roots().unwrap(), 1);
}

#[test]
fn test_reply_cycle_is_detected() {
    let root = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    std::fs::write(
        root.path().join("a.eml"),
        email("a@x", Some("b@x"), "A", "Tue, 2 Jan 2024 09:00:00 +0000"),
    )
    .unwrap();
    std::fs::write(
        root.path().join("b.eml"),
        email("b@x", Some("a@x"), "B", "Tue, 2 Jan 2024 10:00:00 +0000"),
    )
    .unwrap();

    let db = Database::open(data.path().join("catalog.db")).unwrap();
    index(root.path(), &db);
    let conversations = Conversations::new(db.clone());

    let a = db.find_by_path("a.eml").unwrap().unwrap();
    assert!(matches!(
        conversations.find_root(&a),
        Err(ShelfError::CircularReference { .. })
    ));

    // Still browsable: the requested record becomes the root and each
    // record appears once.
    let tree = conversations.conversation_tree(a.id).unwrap();
    assert_eq!(tree.record.id, a.id);
    assert_eq!(tree.flatten().len(), 2);
}

#[test]
fn test_long_chain_stops_at_hop_bound() {
    let data = tempfile::tempdir().unwrap();
    let db = Database::open(data.path().join("catalog.db")).unwrap();
    let ids = chain(&db, 150);
    let conversations = Conversations::new(db.clone());
    assert_eq!(conversations.limits().max_root_hops, 100);

    let last = db.get_email(ids[149]).unwrap().unwrap();
    let reached = conversations.find_root(&last).unwrap();
    assert_eq!(reached.message_id, "m50");

    let unbounded = Conversations::with_limits(
        db,
        ThreadLimits {
            max_root_hops: 1000,
            ..ThreadLimits::default()
        },
    );
    assert_eq!(unbounded.find_root(&last).unwrap().message_id, "m1");
}

#[test]
fn test_tree_depth_is_bounded() {
    let data = tempfile::tempdir().unwrap();
    let db = Database::open(data.path().join("catalog.db")).unwrap();
    let ids = chain(&db, 80);

    let tree = Conversations::new(db).conversation_tree(ids[0]).unwrap();
    let nodes = tree.flatten();
    // Depths 0 through 50 are placed.
    assert_eq!(nodes.len(), 51);
    assert_eq!(tree.reply_count, 50);
}

#[test]
fn test_duplicate_message_ids_are_placed_once() {
    let root = tempfile::tempdir().unwrap();
    let data = tempfile::tempdir().unwrap();
    std::fs::write(
        root.path().join("root.eml"),
        email("r@x", None, "Root", "Wed, 3 Jan 2024 09:00:00 +0000"),
    )
    .unwrap();
    // Two files carrying the same Message-ID, both replying to the root.
    std::fs::write(
        root.path().join("dup1.eml"),
        email("d@x", Some("r@x"), "Dup", "Wed, 3 Jan 2024 10:00:00 +0000"),
    )
    .unwrap();
    std::fs::write(
        root.path().join("dup2.eml"),
        email("d@x", Some("r@x"), "Dup", "Wed, 3 Jan 2024 10:00:00 +0000"),
    )
    .unwrap();
    std::fs::write(
        root.path().join("child.eml"),
        email("c@x", Some("d@x"), "Child", "Wed, 3 Jan 2024 11:00:00 +0000"),
    )
    .unwrap();

    let db = Database::open(data.path().join("catalog.db")).unwrap();
    index(root.path(), &db);

    let tree = Conversations::new(db.clone())
        .conversation_tree(id_of(&db, "root.eml"))
        .unwrap();
    let mut ids: Vec<i64> = tree.flatten().iter().map(|r| r.id).collect();
    let placed = ids.len();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), placed);
    assert_eq!(placed, 4);
    assert_eq!(tree.reply_count, 3);
}
