//! Integration tests for the filesystem view of a store.

use valuefs::error::FsError;
use valuefs::fs::{ValueFile, ValueFs};
use valuefs::{ManualClock, Store, StoreConfig};

const SECOND: u64 = 1_000_000_000;
const BASE: u64 = 1_700_000_000 * SECOND;

fn mount(memory_values: usize) -> (ValueFs, ManualClock) {
    let clock = ManualClock::new(BASE);
    let store = Store::builder(StoreConfig {
        memory_values,
        ..Default::default()
    })
    .clock(clock.clone())
    .spawn()
    .unwrap();
    (ValueFs::new(store), clock)
}

async fn cat(fs: &ValueFs, name: &str) -> String {
    let mut file = fs.lookup(name).await.unwrap();
    fs.attr(&mut file).await.unwrap();
    String::from_utf8(fs.read(&file).to_vec()).unwrap()
}

async fn echo(fs: &ValueFs, name: &str, value: &str, clock: &ManualClock) {
    clock.advance(SECOND);
    let mut file = match fs.lookup(name).await {
        Ok(file) => file,
        Err(FsError::NotFound { .. }) => fs.create(name).await.unwrap(),
        Err(e) => panic!("lookup {name}: {e}"),
    };
    fs.write(&mut file, 0, value.as_bytes()).await.unwrap();
}

#[tokio::test]
async fn test_views_over_one_series() {
    let (fs, clock) = mount(100);
    for value in ["10", "20", "30", "40"] {
        echo(&fs, "power", value, &clock).await;
    }
    // Writes landed at BASE+1s..BASE+4s; reads happen at BASE+5s.
    clock.set(BASE + 5 * SECOND);

    assert_eq!(cat(&fs, "power").await, "40\n");
    assert_eq!(cat(&fs, "power%1h").await, "100\n");
    assert_eq!(cat(&fs, "power#2500ms").await, "35\n");
    assert_eq!(cat(&fs, "power@2s").await, "30\n");
    assert_eq!(cat(&fs, "power^10s").await, "40\n");
    assert_eq!(cat(&fs, "power^500ms").await, "");
    assert_eq!(cat(&fs, "power@1h").await, "");
}

#[tokio::test]
async fn test_listing_follows_create_and_remove() {
    let (fs, clock) = mount(100);
    echo(&fs, "b", "1", &clock).await;
    echo(&fs, "a", "2", &clock).await;

    let names: Vec<_> = fs.read_dir().await.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);

    fs.remove("a").await.unwrap();
    let names: Vec<_> = fs.read_dir().await.unwrap().into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["b".to_string()]);

    // A re-created file starts empty.
    let mut file = fs.create("a").await.unwrap();
    fs.attr(&mut file).await.unwrap();
    assert!(fs.read(&file).is_empty());
}

#[tokio::test]
async fn test_inode_tracks_latest_sample() {
    let (fs, clock) = mount(100);
    let mut file = fs.create("cpu").await.unwrap();
    let created = fs.attr(&mut file).await.unwrap();
    assert_eq!(created.inode, file.record().inode());

    clock.set(BASE + 7 * SECOND);
    fs.write(&mut file, 0, b"1").await.unwrap();
    let written = fs.attr(&mut file).await.unwrap();
    assert_eq!(written.inode, BASE + 7 * SECOND);
    assert!(matches!(file, ValueFile::Latest { .. }));
}

#[tokio::test]
async fn test_pruned_series_keeps_value() {
    let (fs, clock) = mount(1);
    for value in ["1", "2", "3"] {
        echo(&fs, "only", value, &clock).await;
    }
    let report = fs.store().prune().await.unwrap();
    assert_eq!(report.remaining, 1);

    assert_eq!(cat(&fs, "only").await, "3\n");
}

#[tokio::test]
async fn test_file_opened_before_recreate_is_stale() {
    let (fs, clock) = mount(100);
    echo(&fs, "cpu", "1", &clock).await;
    let mut stale = fs.lookup("cpu").await.unwrap();

    fs.remove("cpu").await.unwrap();
    echo(&fs, "cpu", "2", &clock).await;

    assert!(matches!(
        fs.write(&mut stale, 0, b"3").await,
        Err(FsError::NotFound { .. })
    ));
    fs.attr(&mut stale).await.unwrap();
    assert!(fs.read(&stale).is_empty());

    assert_eq!(cat(&fs, "cpu").await, "2\n");
}
