use dal_archive::{ArchiveError, BackupJob, RestoreJob};
use dal_archive::{Manifest, MANIFEST_FILE};
use dal_persistence::{wrap_document, DocumentRef, Persistence, RelationSource, UNVERSIONED};
use dal_schema::Schema;
use dal_scope::{DalConfig, Workspaces};
use dal_test_utils::{fixtures, stores};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;

const FLOW: &str = "global/Flow/f1/__UNVERSIONED__";
const NODE: &str = "global/Node/n1/__UNVERSIONED__";
const CALLBACK: &str = "global/Callback/c1/__UNVERSIONED__";

fn workspaces(data_dir: &Path) -> Workspaces {
    let config = DalConfig::new().with_data_dir(data_dir);
    Workspaces::new(config, fixtures::registry(), stores::memory_store())
}

async fn seed(workspaces: &Workspaces, scope: &str, reference: &str, schema: &Schema, body: Value) {
    let doc = DocumentRef::global(scope, reference);
    workspaces
        .adapter("global")
        .unwrap()
        .write(&doc, schema, &body)
        .await
        .unwrap();
}

/// f1 relates to n1 and c1; n1 points at a template that was never stored
async fn seeded(data_dir: &Path) -> Workspaces {
    let source = workspaces(data_dir);
    seed(&source, "Flow", "f1", &fixtures::flow_schema(), fixtures::sample_flow()).await;
    seed(&source, "Node", "n1", &fixtures::node_schema(), fixtures::sample_node("n9")).await;
    seed(&source, "Callback", "c1", &fixtures::callback_schema(), fixtures::sample_callback()).await;
    source
}

async fn read(workspaces: &Workspaces, path: &str) -> Option<Value> {
    let doc = DocumentRef::parse(path).unwrap();
    workspaces.adapter(&doc.workspace).unwrap().read(&doc).await.unwrap()
}

#[tokio::test]
async fn test_backup_includes_relations() {
    let dir = tempfile::tempdir().unwrap();
    let source = seeded(&dir.path().join("source")).await;
    let archive = dir.path().join("backup.zip");

    let report = BackupJob::new(["Flow:f1"])
        .with_metadata(json!({"reason": "nightly"}))
        .run(&source, &archive)
        .await
        .unwrap();

    assert_eq!(report.manifest.manifest, vec![FLOW, CALLBACK, NODE]);
    assert_eq!(report.skipped, vec!["global/Node/n9/__UNVERSIONED__"]);
    assert!(archive.exists());
}

#[tokio::test]
async fn test_shallow_backup_stops_at_direct_relations() {
    let dir = tempfile::tempdir().unwrap();
    let source = seeded(&dir.path().join("source")).await;

    let report = BackupJob::new(["Flow:f1"])
        .with_shallow(true)
        .run(&source, &dir.path().join("shallow.zip"))
        .await
        .unwrap();

    assert_eq!(report.manifest.manifest.len(), 3);
    assert!(report.skipped.is_empty());
}

#[tokio::test]
async fn test_restore_into_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let source = seeded(&dir.path().join("source")).await;
    let archive = dir.path().join("backup.zip");
    BackupJob::new(["Flow:f1"])
        .with_metadata(json!({"reason": "nightly"}))
        .run(&source, &archive)
        .await
        .unwrap();

    let target = workspaces(&dir.path().join("target"));
    assert!(read(&target, FLOW).await.is_none());

    let report = RestoreJob::new(&archive).run(&target).await.unwrap();
    assert_eq!(report.restored, vec![FLOW, CALLBACK, NODE]);
    assert!(report.skipped.is_empty());
    assert_eq!(report.manifest.metadata, json!({"reason": "nightly"}));

    for path in [FLOW, NODE, CALLBACK] {
        assert_eq!(read(&target, path).await, read(&source, path).await, "{path}");
    }

    // Relation caches are rebuilt by the restore writes
    let flow = DocumentRef::global("Flow", "f1");
    let restored = target.adapter("global").unwrap().direct_relations(&flow).await.unwrap();
    let before = source.adapter("global").unwrap().direct_relations(&flow).await.unwrap();
    assert_eq!(restored, before);
}

#[tokio::test]
async fn test_restored_documents_load_into_workspace() {
    let dir = tempfile::tempdir().unwrap();
    let source = seeded(&dir.path().join("source")).await;
    let archive = dir.path().join("backup.zip");
    BackupJob::new([FLOW]).run(&source, &archive).await.unwrap();

    let mut target = workspaces(&dir.path().join("target"));
    RestoreJob::new(&archive).run(&target).await.unwrap();

    let global = target.workspace("global").unwrap();
    let flow = global.scope("Flow").get("f1", UNVERSIONED).await.unwrap();
    assert_eq!(global.serialize(flow).unwrap(), fixtures::sample_flow());
}

#[tokio::test]
async fn test_file_workspace_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut source = workspaces(&dir.path().join("source"));
    let demo = source.workspace("demo").unwrap();
    let doc = demo
        .scope("Callback")
        .create_with_schema("c1", "v1", false, "2.0")
        .await
        .unwrap();
    demo.set_attr(doc, "Code", json!("notify()")).unwrap();
    demo.write(doc).await.unwrap();

    let archive = dir.path().join("demo.zip");
    let report = BackupJob::new(["demo/Callback/c1/v1"])
        .run(&source, &archive)
        .await
        .unwrap();
    assert_eq!(report.manifest.manifest, vec!["demo/Callback/c1/v1"]);

    let target = workspaces(&dir.path().join("target"));
    RestoreJob::new(&archive).run(&target).await.unwrap();
    let versions = target
        .adapter("demo")
        .unwrap()
        .list_versions("Callback", "c1")
        .await
        .unwrap();
    assert_eq!(versions.len(), 1);
    assert_eq!(versions[0].tag, "v1");

    // Stored tags are immutable, so a second restore skips the document
    let again = RestoreJob::new(&archive).run(&target).await.unwrap();
    assert!(again.restored.is_empty());
    assert_eq!(again.skipped, vec!["demo/Callback/c1/v1"]);
}

#[tokio::test]
async fn test_archive_without_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("empty.zip");
    let file = std::fs::File::create(&archive).unwrap();
    zip::ZipWriter::new(file).finish().unwrap();

    let target = workspaces(&dir.path().join("target"));
    let err = RestoreJob::new(&archive).run(&target).await.unwrap_err();
    assert!(matches!(err, ArchiveError::Manifest(_)));
}

/// Zip holding `entries` as `data.json` files plus a manifest listing them
fn handmade_archive(path: &Path, entries: &[(&str, Value)]) {
    let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
    let options = zip::write::FileOptions::default();
    for (entry, data) in entries {
        zip.start_file(format!("{entry}/data.json"), options).unwrap();
        zip.write_all(&serde_json::to_vec(data).unwrap()).unwrap();
    }
    let paths = entries.iter().map(|(entry, _)| (*entry).to_string()).collect();
    let manifest = Manifest::new(Value::Null, paths);
    zip.start_file(MANIFEST_FILE, options).unwrap();
    zip.write_all(&serde_json::to_vec(&manifest).unwrap()).unwrap();
    zip.finish().unwrap();
}

#[tokio::test]
async fn test_restore_skips_entries_leaving_the_data_dir() {
    let dir = tempfile::tempdir().unwrap();
    let archive = dir.path().join("hostile.zip");
    let escaping = "demo/Node/../../../escaped/v1";
    let plain = DocumentRef::new("demo", "Node", "n1", "v1");
    let body = fixtures::sample_node("n2");
    let escaped_doc = DocumentRef::new("demo", "Node", "../../../escaped", "v1");
    handmade_archive(
        &archive,
        &[
            (escaping, wrap_document(&escaped_doc, "1.0", body.clone())),
            ("demo/Node/n1/v1", wrap_document(&plain, "1.0", body)),
        ],
    );

    let target = workspaces(&dir.path().join("data"));
    let report = RestoreJob::new(&archive).run(&target).await.unwrap();
    assert_eq!(report.skipped, vec![escaping]);
    assert_eq!(report.restored, vec!["demo/Node/n1/v1"]);

    assert!(!dir.path().join("escaped").exists());
    assert!(read(&target, "demo/Node/n1/v1").await.is_some());
}
