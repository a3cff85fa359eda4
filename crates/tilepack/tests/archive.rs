use std::path::PathBuf;

use assert_matches::assert_matches;
use rstest::rstest;

use tilepack::index::key_digest;
use tilepack::{open_package, ArchiveSource, PackageType, TilesetError, TilesetSource};
use tools::TzBuilder;

fn fixture_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
    dir.path().join(name)
}

fn collect_keys(source: &mut dyn TilesetSource) -> Vec<String> {
    source
        .keys()
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

#[test]
fn round_trip_three_entries() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");

    let a_json = b"{\"asset\":1}\n";
    assert_eq!(a_json.len(), 12);
    let c_bin = vec![0xABu8; 4096];

    TzBuilder::new()
        .entry("a.json", a_json)
        .entry("b/c.bin", &c_bin)
        .entry("b/d.bin", b"")
        .write(&path)
        .unwrap();

    let mut source = ArchiveSource::new();
    source.open(&path).unwrap();

    // Enumeration yields all three names, in hash order.
    let mut expected = vec!["a.json", "b/c.bin", "b/d.bin"];
    expected.sort_by_key(|key| key_digest(key));
    assert_eq!(collect_keys(&mut source), expected);

    assert_eq!(source.value("a.json").unwrap().as_deref(), Some(&a_json[..]));
    assert_eq!(source.value("b/c.bin").unwrap().as_deref(), Some(&c_bin[..]));
    assert_eq!(source.value("b/d.bin").unwrap().as_deref(), Some(&b""[..]));
    assert_eq!(source.value("missing.txt").unwrap(), None);

    source.close().unwrap();
    assert_matches!(source.value("a.json"), Err(TilesetError::NotOpen));
}

#[rstest]
#[case::stored(false)]
#[case::deflated(true)]
fn payloads_survive_both_compression_methods(#[case] deflated: bool) {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");
    let content = b"a highly repetitive tile payload ".repeat(64);

    let builder = TzBuilder::new().entry("tileset.json", b"{}");
    let builder = if deflated {
        builder.deflated_entry("tiles/0.glb", &content)
    } else {
        builder.entry("tiles/0.glb", &content)
    };
    builder.write(&path).unwrap();

    let mut source = ArchiveSource::new();
    source.open(&path).unwrap();
    assert_eq!(source.value("tiles/0.glb").unwrap().unwrap(), content);
    source.close().unwrap();
}

#[test]
fn keys_and_values_agree() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");

    TzBuilder::new()
        .entry("tileset.json", b"{}")
        .entry("tiles/0/0/0.b3dm", b"b3dm-000")
        .entry("tiles/1/0/0.b3dm", b"b3dm-100")
        .entry("tiles/1/1/0.b3dm", b"b3dm-110")
        .write(&path)
        .unwrap();

    let mut source = ArchiveSource::new();
    source.open(&path).unwrap();

    let keys = collect_keys(&mut source);
    assert_eq!(keys.len(), 4);
    let mut unique = keys.clone();
    unique.sort();
    unique.dedup();
    assert_eq!(unique.len(), keys.len());

    for key in &keys {
        assert!(source.value(key).unwrap().is_some(), "{key} has no value");
    }
    source.close().unwrap();
}

#[test]
fn loaded_index_is_sorted_and_search_matches_linear_scan() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");

    let keys = ["tileset.json", "a.glb", "b.glb", "c/d.glb", "c/e.glb"];
    let mut builder = TzBuilder::new();
    for key in keys {
        builder = builder.entry(key, key.as_bytes());
    }
    builder.write(&path).unwrap();

    let mut source = ArchiveSource::new();
    source.open(&path).unwrap();
    let index = source.index().unwrap();

    assert!(index
        .entries()
        .windows(2)
        .all(|pair| pair[0].hash <= pair[1].hash));

    for key in keys {
        let digest = key_digest(key);
        let linear = index
            .entries()
            .iter()
            .find(|entry| entry.hash == digest)
            .map(|entry| entry.offset);
        assert_eq!(index.offset_for(key), linear);
        assert!(linear.is_some());
    }
    assert_eq!(index.offset_for("not-there.glb"), None);
}

#[test]
fn lifecycle_misuse_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");
    TzBuilder::new().entry("a.json", b"{}").write(&path).unwrap();

    let mut source = ArchiveSource::new();
    assert_matches!(source.value("a.json"), Err(TilesetError::NotOpen));
    assert!(matches!(source.keys().err(), Some(TilesetError::NotOpen)));
    assert_matches!(source.close(), Err(TilesetError::NotOpen));

    source.open(&path).unwrap();
    assert_matches!(source.open(&path), Err(TilesetError::AlreadyOpen));

    source.close().unwrap();
    assert_matches!(source.close(), Err(TilesetError::NotOpen));
}

#[test]
fn corrupt_index_length_leaves_source_closed() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");
    TzBuilder::new()
        .entry("a.json", b"{}")
        .raw_index(vec![0u8; 25])
        .write(&path)
        .unwrap();

    let mut source = ArchiveSource::new();
    assert_matches!(
        source.open(&path),
        Err(TilesetError::TruncatedIndex { length: 25 })
    );

    // No partial handle: the source is still closed and can be reused.
    assert_matches!(source.value("a.json"), Err(TilesetError::NotOpen));

    let good = fixture_path(&dir, "good.3tz");
    TzBuilder::new().entry("a.json", b"{}").write(&good).unwrap();
    source.open(&good).unwrap();
    assert_eq!(source.value("a.json").unwrap().as_deref(), Some(&b"{}"[..]));
    source.close().unwrap();
}

#[test]
fn unsorted_index_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");

    // Two records in descending hash order.
    let mut digests = [key_digest("a.json"), key_digest("b.json")];
    digests.sort();
    digests.reverse();
    let mut payload = Vec::new();
    for digest in digests {
        payload.extend_from_slice(&digest);
        payload.extend_from_slice(&0u64.to_le_bytes());
    }

    TzBuilder::new()
        .entry("a.json", b"{}")
        .entry("b.json", b"{}")
        .raw_index(payload)
        .write(&path)
        .unwrap();

    let mut source = ArchiveSource::new();
    assert_matches!(source.open(&path), Err(TilesetError::UnsortedIndex));
}

#[test]
fn archive_without_index_entry_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");
    TzBuilder::new()
        .entry("a.json", b"{}")
        .without_index()
        .write(&path)
        .unwrap();

    let mut source = ArchiveSource::new();
    assert_matches!(source.open(&path), Err(TilesetError::MissingIndexEntry));
}

#[test]
fn non_zip_file_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");
    std::fs::write(&path, vec![0x51u8; 1024]).unwrap();

    let mut source = ArchiveSource::new();
    assert_matches!(
        source.open(&path),
        Err(TilesetError::MissingEndOfCentralDirectory)
    );
}

#[test]
fn empty_archive_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");
    TzBuilder::new().write(&path).unwrap();

    let mut source = ArchiveSource::new();
    source.open(&path).unwrap();
    assert!(collect_keys(&mut source).is_empty());
    assert_eq!(source.value("anything").unwrap(), None);
    source.close().unwrap();
}

#[test]
fn factory_dispatches_on_extension() {
    let dir = tempfile::tempdir().unwrap();
    let path = fixture_path(&dir, "tiles.3tz");
    TzBuilder::new().entry("a.json", b"{}").write(&path).unwrap();

    assert_eq!(PackageType::try_from(&path), Some(PackageType::Archive));

    let mut source = open_package(&path).unwrap();
    assert_eq!(source.value("a.json").unwrap().as_deref(), Some(&b"{}"[..]));
    source.close().unwrap();

    let unknown = fixture_path(&dir, "tiles.zip");
    assert!(matches!(
        open_package(&unknown).err(),
        Some(TilesetError::UnsupportedFormat)
    ));

    let missing = fixture_path(&dir, "missing.3tz");
    assert!(matches!(
        open_package(&missing).err(),
        Some(TilesetError::Io(_))
    ));
}
