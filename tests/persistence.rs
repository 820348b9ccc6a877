//! # Persistence Tests
//!
//! Durability is defined as "changes survive iff close completed": these
//! tests close and reopen the same file and require identical query
//! results, a well-formed file length, and a freelist that survives the
//! round trip.

use rowandb::{Database, Row};
use tempfile::tempdir;

fn row(id: u32) -> Row {
    Row::new(id, format!("user{}", id), format!("user{}@example.com", id)).unwrap()
}

fn ids(rows: &[Row]) -> Vec<u32> {
    rows.iter().map(|r| r.id).collect()
}

#[test]
fn reopen_reproduces_identical_query_results() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("mirror.rdb");

    let before = {
        let mut db = Database::open(&path).unwrap();
        for id in (1..=200).rev() {
            db.insert(&row(id)).unwrap();
        }
        for id in (1..=200).filter(|id| id % 3 == 0) {
            db.delete(id).unwrap();
        }
        let before = db.select().unwrap();
        db.close().unwrap();
        before
    };

    let mut db = Database::open(&path).unwrap();
    let after = db.select().unwrap();

    assert_eq!(before, after);
    assert_eq!(
        ids(&db.range(50, 100).unwrap()),
        (50..=100).filter(|id| id % 3 != 0).collect::<Vec<_>>()
    );
    db.validate().unwrap();
}

#[test]
fn freelist_survives_reopen_and_is_still_reusable() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("freelist.rdb");

    let pages_before = {
        let mut db = Database::open(&path).unwrap();
        for id in 1..=40 {
            db.insert(&row(id)).unwrap();
        }
        for id in 10..=40 {
            db.delete(id).unwrap();
        }
        assert!(db.stats().free_head != 0);
        let pages = db.num_pages();
        db.close().unwrap();
        pages
    };

    let mut db = Database::open(&path).unwrap();
    assert!(db.stats().free_head != 0, "free chain head must persist");
    db.validate().unwrap();

    for id in 10..=40 {
        db.insert(&row(id)).unwrap();
    }
    assert!(db.num_pages() <= pages_before);
    assert_eq!(ids(&db.select().unwrap()), (1..=40).collect::<Vec<_>>());
}

#[test]
fn multiple_reopen_cycles_accumulate_rows() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("cycles.rdb");

    for batch in 0..5u32 {
        let mut db = Database::open(&path).unwrap();
        for offset in 1..=20 {
            db.insert(&row(batch * 20 + offset)).unwrap();
        }
        db.validate().unwrap();
        db.close().unwrap();
    }

    let mut db = Database::open(&path).unwrap();
    assert_eq!(ids(&db.select().unwrap()), (1..=100).collect::<Vec<_>>());
}

#[test]
fn file_length_is_always_header_plus_whole_pages() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("length.rdb");

    for round in 1..=3u64 {
        let mut db = Database::open(&path).unwrap();
        for id in 1..=(round * 30) as u32 {
            let _ = db.insert(&row(id));
        }
        let num_pages = db.num_pages() as u64;
        db.close().unwrap();

        let len = std::fs::metadata(&path).unwrap().len();
        assert_eq!(len, 8 + 4096 * num_pages, "round {}", round);
    }
}

#[test]
fn updates_are_durable_after_close() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("updates.rdb");

    {
        let mut db = Database::open(&path).unwrap();
        for id in 1..=30 {
            db.insert(&row(id)).unwrap();
        }
        assert!(db
            .update(&Row::new(17, "renamed", "renamed@example.com").unwrap())
            .unwrap());
        db.close().unwrap();
    }

    let mut db = Database::open(&path).unwrap();
    let found = db.find(17).unwrap().unwrap();
    assert_eq!(found.username, "renamed");
    assert_eq!(found.email, "renamed@example.com");
}

#[test]
fn truncated_file_is_rejected_at_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("torn.rdb");

    {
        let mut db = Database::open(&path).unwrap();
        for id in 1..=20 {
            db.insert(&row(id)).unwrap();
        }
        db.close().unwrap();
    }

    // Tear the file mid-page.
    let len = std::fs::metadata(&path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 1000).unwrap();

    let result = Database::open(&path);
    assert!(result.is_err());
}
