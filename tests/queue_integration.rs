use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};
use wallpaper_cycle::error::Error;
use wallpaper_cycle::queue::QueueStore;

fn library(names: &[&str]) -> (TempDir, PathBuf) {
    let tmp = tempdir().unwrap();
    let walls = tmp.path().join("walls");
    fs::create_dir_all(&walls).unwrap();
    for name in names {
        let path = walls.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"x").unwrap();
    }
    (tmp, walls)
}

fn names(paths: &[PathBuf], root: &Path) -> HashSet<String> {
    paths
        .iter()
        .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().to_string())
        .collect()
}

#[test]
fn full_cycle_returns_every_image_once() {
    let files = ["a.jpg", "b.jpeg", "c.png", "d.webp", "nested/e.JPG", "nested/f.txt"];
    let (tmp, walls) = library(&files);
    let mut store = QueueStore::with_seed(tmp.path().join("queue"), 11);

    let picked: Vec<PathBuf> = (0..5).map(|_| store.next_image(&walls).unwrap()).collect();

    assert_eq!(picked.len(), 5);
    let distinct = names(&picked, &walls);
    assert_eq!(distinct.len(), 5, "a path repeated within one cycle: {picked:?}");
    let expected: HashSet<String> = ["a.jpg", "b.jpeg", "c.png", "d.webp", "nested/e.JPG"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(distinct, expected);
    assert!(store.remaining().unwrap().is_empty());
}

#[test]
fn next_call_after_exhaustion_starts_a_new_cycle() {
    let (tmp, walls) = library(&["a.jpg", "b.png", "c.webp"]);
    let mut store = QueueStore::with_seed(tmp.path().join("queue"), 3);

    let first: Vec<PathBuf> = (0..3).map(|_| store.next_image(&walls).unwrap()).collect();
    let second: Vec<PathBuf> = (0..3).map(|_| store.next_image(&walls).unwrap()).collect();

    assert_eq!(names(&first, &walls), names(&second, &walls));
    assert_eq!(names(&second, &walls).len(), 3);
}

#[test]
fn three_image_scenario() {
    let (tmp, walls) = library(&["a.jpg", "b.png", "c.webp"]);
    let mut store = QueueStore::new(tmp.path().join("queue"));

    let picked: Vec<PathBuf> = (0..3).map(|_| store.next_image(&walls).unwrap()).collect();
    let expected: HashSet<String> = ["a.jpg", "b.png", "c.webp"]
        .into_iter()
        .map(String::from)
        .collect();
    assert_eq!(names(&picked, &walls), expected);

    let fourth = store.next_image(&walls).unwrap();
    assert!(picked.contains(&fourth));
}

#[test]
fn restart_resumes_the_persisted_remainder() {
    let (tmp, walls) = library(&["a.jpg", "b.png", "c.webp", "d.jpeg"]);
    let queue = tmp.path().join("queue");

    let mut before = QueueStore::with_seed(&queue, 5);
    let shown = before.next_image(&walls).unwrap();
    let pending = before.remaining().unwrap();
    assert_eq!(pending.len(), 3);
    assert!(!pending.contains(&shown));
    drop(before);

    // A fresh store with a different seed must not reshuffle.
    let mut after = QueueStore::with_seed(&queue, 999);
    let resumed: Vec<PathBuf> = (0..3).map(|_| after.next_image(&walls).unwrap()).collect();
    assert_eq!(resumed, pending);
}

#[test]
fn restart_with_another_directory_ignores_the_old_remainder() {
    let (tmp, old_walls) = library(&["a.jpg", "b.png", "c.webp"]);
    let new_walls = tmp.path().join("new");
    fs::create_dir_all(&new_walls).unwrap();
    fs::write(new_walls.join("x.jpg"), b"x").unwrap();
    fs::write(new_walls.join("y.png"), b"x").unwrap();
    let queue = tmp.path().join("queue");

    let mut before = QueueStore::with_seed(&queue, 4);
    before.next_image(&old_walls).unwrap();
    assert_eq!(before.remaining().unwrap().len(), 2);
    drop(before);

    let mut after = QueueStore::with_seed(&queue, 4);
    let picked: Vec<PathBuf> = (0..2).map(|_| after.next_image(&new_walls).unwrap()).collect();
    for path in &picked {
        assert!(path.starts_with(&new_walls), "{} leaked from the old directory", path.display());
    }
    assert_eq!(names(&picked, &new_walls).len(), 2);
    assert!(
        after
            .remaining()
            .unwrap()
            .iter()
            .all(|p| p.starts_with(&new_walls))
    );
}

#[test]
fn invalidate_switches_to_the_new_directory() {
    let (tmp, old_walls) = library(&["old1.jpg", "old2.jpg", "old3.jpg"]);
    let new_walls = tmp.path().join("new");
    fs::create_dir_all(&new_walls).unwrap();
    fs::write(new_walls.join("fresh.png"), b"x").unwrap();

    let mut store = QueueStore::with_seed(tmp.path().join("queue"), 1);
    store.next_image(&old_walls).unwrap();
    assert_eq!(store.remaining().unwrap().len(), 2);

    store.invalidate().unwrap();
    assert!(!store.path().exists());

    let next = store.next_image(&new_walls).unwrap();
    assert_eq!(next.file_name().unwrap(), "fresh.png");
    assert!(store.remaining().unwrap().is_empty());
}

#[test]
fn empty_directory_errors_and_writes_nothing() {
    let (tmp, walls) = library(&["notes.txt", "clip.gif"]);
    let queue = tmp.path().join("queue");
    let mut store = QueueStore::with_seed(&queue, 1);

    let err = store.next_image(&walls).unwrap_err();
    assert!(matches!(err, Error::EmptyDirectory(ref dir) if dir == &walls));
    assert!(!queue.exists(), "no queue file should be created");

    // An existing (exhausted) queue file is left byte-for-byte alone.
    fs::write(&queue, "\n").unwrap();
    assert!(store.next_image(&walls).is_err());
    assert_eq!(fs::read_to_string(&queue).unwrap(), "\n");
}

#[test]
fn vanished_directory_behaves_like_empty() {
    let (tmp, walls) = library(&["a.jpg"]);
    let mut store = QueueStore::with_seed(tmp.path().join("queue"), 1);
    fs::remove_dir_all(&walls).unwrap();
    assert!(matches!(
        store.next_image(&walls),
        Err(Error::EmptyDirectory(_))
    ));
}

#[test]
fn single_image_repeats_every_cycle() {
    let (tmp, walls) = library(&["only.webp"]);
    let mut store = QueueStore::with_seed(tmp.path().join("queue"), 1);
    for _ in 0..3 {
        let next = store.next_image(&walls).unwrap();
        assert_eq!(next.file_name().unwrap(), "only.webp");
        assert!(store.remaining().unwrap().is_empty());
    }
}

#[test]
fn unreadable_queue_falls_back_to_enumeration() {
    let (tmp, walls) = library(&["a.jpg", "b.png"]);
    // A directory where the queue file should be: reads and writes both fail.
    let queue = tmp.path().join("queue");
    fs::create_dir_all(&queue).unwrap();

    let mut store = QueueStore::with_seed(&queue, 1);
    let next = store.next_image(&walls).unwrap();
    assert!(next.starts_with(&walls));
}

#[test]
fn stores_sharing_a_file_never_duplicate_within_a_cycle() {
    let (tmp, walls) = library(&["a.jpg", "b.png", "c.webp", "d.jpeg", "e.jpg", "f.png"]);
    let queue = tmp.path().join("queue");
    let mut left = QueueStore::with_seed(&queue, 1);
    let mut right = QueueStore::with_seed(&queue, 2);

    let mut picked = Vec::new();
    for i in 0..6 {
        let store = if i % 2 == 0 { &mut left } else { &mut right };
        picked.push(store.next_image(&walls).unwrap());
    }
    assert_eq!(names(&picked, &walls).len(), 6);
}
