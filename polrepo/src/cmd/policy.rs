use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use policy_tree::{PolicyLoader, PolicyNode, PolicyService, print_tree};
use tracing::{Level, info, instrument};

use super::{CmdContext, identity};
use crate::cli::PolicyCmd;

/// Path printed by `policy dump` when none is given.
pub const DEFAULT_DUMP_PATH: &str = "root";

/// Handle `polrepo policy` subcommands.
#[instrument(level = Level::TRACE, skip(ctx, out))]
pub fn run(cmd: PolicyCmd, ctx: &CmdContext, out: &mut dyn Write) -> Result<()> {
    match cmd {
        PolicyCmd::Validate { path, dump } => handle_validate(&ctx.loader()?, &path, dump, out),
        PolicyCmd::Import { path } => {
            ensure_path(&path)?;
            let loader = ctx.loader()?;
            handle_import(&loader, &mut ctx.open_repository()?, &path, out)
        }
        PolicyCmd::Dump { path } => {
            let path = path.as_deref().unwrap_or(DEFAULT_DUMP_PATH);
            ensure_node_path(path)?;
            handle_dump(&ctx.open_repository()?, path, out)
        }
        PolicyCmd::Delete { path } => {
            ensure_node_path(&path)?;
            handle_delete(&mut ctx.open_repository()?, &path, out)
        }
        PolicyCmd::GetId { label, list } => identity::handle_get_id(label.as_deref(), list, out),
        PolicyCmd::Allowed {
            source,
            destination,
        } => identity::handle_allowed(&source, &destination, || ctx.open_repository(), out),
    }
}

fn ensure_path(path: &Path) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("empty path");
    }
    Ok(())
}

fn ensure_node_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("empty policy path");
    }
    Ok(())
}

/// Pretty JSON for a subtree, or a placeholder when there is none.
pub fn render_policy(node: Option<&PolicyNode>) -> Result<String> {
    match node {
        Some(node) => serde_json::to_string_pretty(node).context("failed to serialize policy"),
        None => Ok("No policy loaded.".to_string()),
    }
}

fn load(loader: &PolicyLoader, path: &Path) -> Result<Option<PolicyNode>> {
    loader
        .load(path)
        .with_context(|| format!("unable to load policy from {}", path.display()))
}

pub fn handle_validate(
    loader: &PolicyLoader,
    path: &Path,
    dump: bool,
    out: &mut dyn Write,
) -> Result<()> {
    ensure_path(path)?;
    let node = load(loader, path)?;

    writeln!(out, "All policy elements are valid.")?;
    if dump {
        if let Some(node) = &node {
            write!(out, "{}", print_tree(node))?;
        }
        writeln!(out, "{}", render_policy(node.as_ref())?)?;
    }
    Ok(())
}

pub fn handle_import(
    loader: &PolicyLoader,
    repo: &mut dyn PolicyService,
    path: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    ensure_path(path)?;
    let Some(node) = load(loader, path)? else {
        writeln!(out, "No policy found in {}; nothing imported.", path.display())?;
        return Ok(());
    };

    let name = node.name().to_string();
    if name.is_empty() {
        bail!(
            "policy loaded from {} has no root name; add a \"name\" to a top-level fragment",
            path.display()
        );
    }

    repo.policy_add(&name, node)
        .with_context(|| format!("unable to import policy '{name}'"))?;
    info!(name, path = %path.display(), "policy imported");
    writeln!(out, "Imported policy '{name}'.")?;
    Ok(())
}

pub fn handle_dump(repo: &dyn PolicyService, path: &str, out: &mut dyn Write) -> Result<()> {
    let node = repo
        .policy_get(path)
        .with_context(|| format!("unable to retrieve policy '{path}'"))?;
    writeln!(out, "{}", render_policy(node.as_ref())?)?;
    Ok(())
}

pub fn handle_delete(repo: &mut dyn PolicyService, path: &str, out: &mut dyn Write) -> Result<()> {
    repo.policy_delete(path)
        .with_context(|| format!("unable to delete policy '{path}'"))?;
    info!(path, "policy deleted");
    writeln!(out, "Deleted policy '{path}'.")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use policy_tree::{LoaderConfig, LocalRepository, ServiceError};
    use tempfile::TempDir;

    use super::*;

    fn policy_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("base.json"),
            r#"{"name": "root", "rules": {"allow-dns": {"port": 53}}}"#,
        )
        .unwrap();
        fs::create_dir(dir.path().join("web")).unwrap();
        fs::write(
            dir.path().join("web/http.json"),
            r#"{"name": "web", "rules": {"allow-http": {"port": 80}}}"#,
        )
        .unwrap();
        dir
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn validate_reports_success() {
        let dir = policy_dir();
        let mut buf = Vec::new();
        handle_validate(&PolicyLoader::default(), dir.path(), false, &mut buf).unwrap();
        assert_eq!(output(buf), "All policy elements are valid.\n");
    }

    #[test]
    fn validate_dump_prints_tree_and_json() {
        let dir = policy_dir();
        let mut buf = Vec::new();
        handle_validate(&PolicyLoader::default(), dir.path(), true, &mut buf).unwrap();
        let text = output(buf);
        assert!(text.contains("root (1 rules, 1 children)"));
        assert!(text.contains("  web (1 rules, 0 children)"));
        assert!(text.contains("\"allow-http\""));
    }

    #[test]
    fn validate_empty_directory_dumps_placeholder() {
        let dir = TempDir::new().unwrap();
        let mut buf = Vec::new();
        handle_validate(&PolicyLoader::default(), dir.path(), true, &mut buf).unwrap();
        assert_eq!(
            output(buf),
            "All policy elements are valid.\nNo policy loaded.\n"
        );
    }

    #[test]
    fn validate_failure_carries_context() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("bad.json"), "{\n  \"rules\": x\n}").unwrap();
        let mut buf = Vec::new();
        let err = handle_validate(&PolicyLoader::default(), dir.path(), false, &mut buf)
            .unwrap_err();
        assert!(err.to_string().starts_with("unable to load policy from"));
        assert!(buf.is_empty());
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut buf = Vec::new();
        let err = handle_validate(&PolicyLoader::default(), Path::new(""), false, &mut buf)
            .unwrap_err();
        assert_eq!(err.to_string(), "empty path");
    }

    #[test]
    fn import_then_dump_and_delete() {
        let dir = policy_dir();
        let mut repo = LocalRepository::in_memory();
        let mut buf = Vec::new();
        handle_import(&PolicyLoader::default(), &mut repo, dir.path(), &mut buf).unwrap();
        assert_eq!(output(std::mem::take(&mut buf)), "Imported policy 'root'.\n");

        handle_dump(&repo, "root.web", &mut buf).unwrap();
        let dumped: PolicyNode = serde_json::from_slice(&buf).unwrap();
        assert_eq!(dumped.name(), "web");
        assert!(dumped.rule("allow-http").is_some());

        buf.clear();
        handle_delete(&mut repo, "root.web", &mut buf).unwrap();
        buf.clear();
        handle_dump(&repo, "root.web", &mut buf).unwrap();
        assert_eq!(output(buf), "No policy loaded.\n");
    }

    #[test]
    fn import_empty_directory_is_a_no_op() {
        let dir = TempDir::new().unwrap();
        let mut repo = LocalRepository::in_memory();
        let mut buf = Vec::new();
        handle_import(&PolicyLoader::default(), &mut repo, dir.path(), &mut buf).unwrap();
        assert!(output(buf).starts_with("No policy found"));
        assert!(repo.tree().is_none());
    }

    #[test]
    fn import_unnamed_root_fails() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"rules": {"r": 1}}"#).unwrap();
        let mut repo = LocalRepository::in_memory();
        let mut buf = Vec::new();
        assert!(handle_import(&PolicyLoader::default(), &mut repo, dir.path(), &mut buf).is_err());
    }

    #[test]
    fn import_honors_strict_merge() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.json"), r#"{"name": "root", "rules": {"r": 1}}"#).unwrap();
        fs::write(dir.path().join("b.json"), r#"{"rules": {"r": 1}}"#).unwrap();
        let strict = PolicyLoader::new(
            LoaderConfig::default().with_merge_strategy(policy_tree::MergeStrategy::Strict),
        );
        let mut repo = LocalRepository::in_memory();
        let mut buf = Vec::new();

        assert!(handle_import(&strict, &mut repo, dir.path(), &mut buf).is_err());
        handle_import(&PolicyLoader::default(), &mut repo, dir.path(), &mut buf).unwrap();
    }

    #[test]
    fn delete_missing_path_fails() {
        let mut repo = LocalRepository::in_memory();
        let mut buf = Vec::new();
        let err = handle_delete(&mut repo, "root.nope", &mut buf).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ServiceError>(),
            Some(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn render_policy_placeholder() {
        assert_eq!(render_policy(None).unwrap(), "No policy loaded.");
        assert_eq!(
            render_policy(Some(&PolicyNode::new("root"))).unwrap(),
            "{\n  \"name\": \"root\"\n}"
        );
    }
}
