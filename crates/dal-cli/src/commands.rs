//! Subcommand handlers
//!
//! Every handler returns the JSON printed on stdout.

use anyhow::{bail, Context, Result};
use clap::ArgMatches;
use dal_archive::{BackupJob, RestoreJob};
use dal_persistence::{DocumentRef, PathDefaults, RelationQuery};
use dal_scope::Workspaces;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

/// Dispatch the selected subcommand
pub(crate) async fn run(workspaces: &mut Workspaces, matches: &ArgMatches) -> Result<Value> {
    match matches.subcommand() {
        Some(("read", args)) => read(workspaces, string(args, "path")?).await,
        Some(("relations", args)) => relations(workspaces, args).await,
        Some(("rebuild-indexes", args)) => {
            let name = string(args, "workspace")?;
            let count = workspaces
                .workspace(name)?
                .rebuild_indexes()
                .await
                .with_context(|| format!("rebuilding indexes of {name}"))?;
            info!(workspace = name, documents = count, "rebuilt indexes");
            Ok(json!({ "workspace": name, "documents": count }))
        }
        Some(("list", args)) => {
            let workspace = workspaces.workspace(string(args, "workspace")?)?;
            let scope = args.get_one::<String>("scope").map(String::as_str);
            Ok(serde_json::to_value(workspace.list_scopes(scope).await?)?)
        }
        Some(("versions", args)) => {
            let workspace = workspaces.workspace(string(args, "workspace")?)?;
            let versions = workspace
                .list_versions(string(args, "scope")?, string(args, "ref")?)
                .await?;
            Ok(serde_json::to_value(versions)?)
        }
        Some(("backup", args)) => backup(workspaces, args).await,
        Some(("restore", args)) => {
            let archive = args
                .get_one::<PathBuf>("archive")
                .context("missing archive")?;
            let report = RestoreJob::new(archive)
                .run(workspaces)
                .await
                .with_context(|| format!("restoring {}", archive.display()))?;
            Ok(json!({ "restored": report.restored, "skipped": report.skipped }))
        }
        Some(("workspaces", _)) => Ok(serde_json::to_value(workspaces.list_workspaces().await?)?),
        Some((other, _)) => bail!("unknown command '{other}'"),
        None => bail!("no command given"),
    }
}

fn string<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a str> {
    args.get_one::<String>(name)
        .map(String::as_str)
        .with_context(|| format!("missing argument '{name}'"))
}

async fn read(workspaces: &mut Workspaces, path: &str) -> Result<Value> {
    let (workspace, version) = workspaces
        .from_path(path, &PathDefaults::new())
        .await
        .with_context(|| format!("reading {path}"))?;
    Ok(workspace.serialize(version)?)
}

async fn relations(workspaces: &Workspaces, args: &ArgMatches) -> Result<Value> {
    let path = string(args, "path")?;
    let doc = DocumentRef::parse(path).with_context(|| format!("resolving {path}"))?;
    let mut query = RelationQuery::new().with_depth(args.get_one::<u32>("depth").copied().unwrap_or(1));
    if let Some(scopes) = args.get_many::<String>("filter") {
        query = query.with_filter(scopes.cloned());
    }
    let found = workspaces.relations(&doc, &query).await?;
    Ok(serde_json::to_value(found)?)
}

async fn backup(workspaces: &Workspaces, args: &ArgMatches) -> Result<Value> {
    let out = args.get_one::<PathBuf>("out").context("missing output path")?;
    let paths: Vec<String> = args
        .get_many::<String>("paths")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    let report = BackupJob::new(paths)
        .with_shallow(args.get_flag("shallow"))
        .run(workspaces, out)
        .await
        .with_context(|| format!("writing {}", out.display()))?;
    Ok(json!({
        "archive": out.display().to_string(),
        "manifest": report.manifest.manifest,
        "skipped": report.skipped,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli;
    use dal_persistence::UNVERSIONED;
    use dal_scope::DalConfig;
    use dal_test_utils::{fixtures, stores};
    use pretty_assertions::assert_eq;

    async fn seeded(dir: &std::path::Path) -> Workspaces {
        let config = DalConfig::new().with_data_dir(dir.join("data"));
        let mut workspaces = Workspaces::new(config, fixtures::registry(), stores::memory_store());
        let global = workspaces.workspace("global").unwrap();
        let flow = global.scope("Flow").create("f1", UNVERSIONED, false).await.unwrap();
        global.set_attr(flow, "Label", json!("pick and place")).unwrap();
        global.set_attr(flow, "Nodes", json!({"a": {"Node": "n1"}})).unwrap();
        global.write(flow).await.unwrap();
        let node = global.scope("Node").create("n1", UNVERSIONED, false).await.unwrap();
        global.set_attr(node, "Label", json!("gripper")).unwrap();
        global.write(node).await.unwrap();
        workspaces
    }

    async fn dal(workspaces: &mut Workspaces, argv: &[&str]) -> Result<Value> {
        let matches = cli().try_get_matches_from(std::iter::once("dal").chain(argv.iter().copied()))?;
        run(workspaces, &matches).await
    }

    #[tokio::test]
    async fn read_and_relations() {
        let dir = tempfile::tempdir().unwrap();
        let mut workspaces = seeded(dir.path()).await;

        let doc = dal(&mut workspaces, &["read", "global/Flow/f1"]).await.unwrap();
        assert_eq!(doc["Label"], json!("pick and place"));

        let related = dal(&mut workspaces, &["relations", "Flow:f1"]).await.unwrap();
        assert_eq!(related, json!(["global/Node/n1/__UNVERSIONED__"]));

        let filtered = dal(&mut workspaces, &["relations", "Flow:f1", "--filter", "Callback"])
            .await
            .unwrap();
        assert_eq!(filtered, json!([]));
    }

    #[tokio::test]
    async fn listing_commands() {
        let dir = tempfile::tempdir().unwrap();
        let mut workspaces = seeded(dir.path()).await;

        let listed = dal(&mut workspaces, &["list", "--scope", "Node"]).await.unwrap();
        assert_eq!(listed[0]["url"], json!("global/Node/n1"));

        let versions = dal(&mut workspaces, &["versions", "Flow", "f1"]).await.unwrap();
        assert_eq!(versions[0]["tag"], json!(UNVERSIONED));

        let rebuilt = dal(&mut workspaces, &["rebuild-indexes"]).await.unwrap();
        assert_eq!(rebuilt["documents"], json!(2));

        let names = dal(&mut workspaces, &["workspaces"]).await.unwrap();
        assert_eq!(names, json!(["global"]));
    }

    #[tokio::test]
    async fn backup_then_restore() {
        let dir = tempfile::tempdir().unwrap();
        let mut workspaces = seeded(dir.path()).await;
        let archive = dir.path().join("out.zip");
        let archive_arg = archive.to_str().unwrap();

        let backup = dal(&mut workspaces, &["backup", archive_arg, "Flow:f1"]).await.unwrap();
        assert_eq!(
            backup["manifest"],
            json!(["global/Flow/f1/__UNVERSIONED__", "global/Node/n1/__UNVERSIONED__"])
        );

        let mut empty = Workspaces::new(
            DalConfig::new().with_data_dir(dir.path().join("restored")),
            fixtures::registry(),
            stores::memory_store(),
        );
        let restored = dal(&mut empty, &["restore", archive_arg]).await.unwrap();
        assert_eq!(restored["restored"].as_array().unwrap().len(), 2);
        let doc = dal(&mut empty, &["read", "global/Node/n1"]).await.unwrap();
        assert_eq!(doc, json!({"Label": "gripper"}));
    }

    #[tokio::test]
    async fn read_missing_document_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut workspaces = seeded(dir.path()).await;
        assert!(dal(&mut workspaces, &["read", "global/Flow/none"]).await.is_err());
    }
}
