use leasehold_license::{ContentSource, FileSource, StringSource};
use tempfile::TempDir;

#[test]
fn string_source_roundtrip() {
    let source = StringSource::new("<license/>");
    assert!(source.exists());
    assert_eq!(source.read().unwrap(), "<license/>");

    source.write("<license id=\"2\"/>").unwrap();
    assert_eq!(source.read().unwrap(), "<license id=\"2\"/>");

    source.remove().unwrap();
    assert_eq!(source.read().unwrap(), "");
}

#[test]
fn file_source_reads_and_writes() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("license.xml");
    std::fs::write(&path, "old").unwrap();

    let source = FileSource::new(&path);
    assert!(source.exists());
    assert_eq!(source.read().unwrap(), "old");

    source.write("new").unwrap();
    assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    assert_eq!(source.read().unwrap(), "new");
}

#[test]
fn file_source_missing() {
    let dir = TempDir::new().unwrap();
    let source = FileSource::new(dir.path().join("absent.xml"));
    assert!(!source.exists());
    assert!(source.read().is_err());
    assert!(source.describe().ends_with("absent.xml"));
}

#[test]
fn unwritable_file_falls_back_to_memory() {
    let dir = TempDir::new().unwrap();
    // Parent directory does not exist, so the write fails.
    let source = FileSource::new(dir.path().join("missing-dir").join("license.xml"));

    source.write("renewed").unwrap();

    assert_eq!(source.read().unwrap(), "renewed");
    assert!(!source.exists());
}

#[test]
fn remove_deletes_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("license.xml");
    std::fs::write(&path, "content").unwrap();
    let source = FileSource::new(&path);

    source.remove().unwrap();

    assert!(!path.exists());
    assert!(!source.exists());
}

#[test]
fn config_dir_location() {
    if let Some(source) = FileSource::in_config_dir("leasehold", "license.xml") {
        assert!(source.path().ends_with("leasehold/license.xml"));
    }
}
