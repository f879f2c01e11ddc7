// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use deploy_env::{
    patch::{target::BackupState, Outcome},
    DeployDefinition, Patcher, Policy, TargetFile, VariableMap,
};

use anyhow::Result;
use indoc::indoc;
use pretty_assertions::assert_eq;
use std::{fs, path::Path};
use tempfile::TempDir;

const TEMPLATE: &str = indoc! {r#"
    [database]
    url = "postgres://${DB_USER}@${DB_HOST}:${DB_PORT}/app"
    # literal: $${DB_HOST}
    timeout = 30
"#};

fn fixture(content: &str) -> Result<(TempDir, TargetFile)> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("app.toml");
    fs::write(&path, content)?;
    Ok((dir, TargetFile::new(path)))
}

fn variables(host: &str) -> VariableMap {
    [("DB_USER", "app"), ("DB_HOST", host), ("DB_PORT", "5432")]
        .into_iter()
        .collect()
}

fn patch(target: &TargetFile, variables: &VariableMap) -> Result<Outcome> {
    let summary = Patcher::new(variables, Policy::Lenient).patch_all(std::slice::from_ref(target))?;
    Ok(summary.files[0].outcome.clone())
}

fn leftovers(dir: &Path) -> Result<Vec<String>> {
    let mut names = fs::read_dir(dir)?
        .map(|entry| entry.map(|entry| entry.file_name().to_string_lossy().into_owned()))
        .collect::<Result<Vec<_>, _>>()?;
    names.sort();
    Ok(names)
}

#[test]
fn repatching_is_idempotent() -> Result<()> {
    let (_dir, target) = fixture(TEMPLATE)?;
    let variables = variables("db.local");

    patch(&target, &variables)?;
    let first = fs::read_to_string(target.path())?;
    patch(&target, &variables)?;
    let second = fs::read_to_string(target.path())?;

    assert_eq!(first, second);
    assert_eq!(
        first,
        indoc! {r#"
            [database]
            url = "postgres://app@db.local:5432/app"
            # literal: ${DB_HOST}
            timeout = 30
        "#}
    );

    Ok(())
}

#[test]
fn repatching_restarts_from_pristine_template() -> Result<()> {
    let (_dir, target) = fixture(TEMPLATE)?;

    patch(&target, &variables("db.local"))?;
    patch(&target, &variables("db.internal"))?;

    let result = fs::read_to_string(target.path())?;
    assert!(result.contains("app@db.internal:5432"));
    assert!(result.contains("# literal: ${DB_HOST}"));

    Ok(())
}

#[test]
fn backup_lifecycle() -> Result<()> {
    let (dir, target) = fixture(TEMPLATE)?;
    let variables = variables("db.local");

    let outcome = patch(&target, &variables)?;
    assert_eq!(
        outcome,
        Outcome::Committed {
            backup: target.failsafe_path(),
            state: BackupState::Pristine
        }
    );
    assert_eq!(fs::read_to_string(target.failsafe_path())?, TEMPLATE);
    let first = fs::read_to_string(target.path())?;

    let outcome = patch(&target, &variables)?;
    assert_eq!(
        outcome,
        Outcome::Committed {
            backup: target.save_path(0),
            state: BackupState::Failsafe
        }
    );
    assert_eq!(fs::read_to_string(target.save_path(0))?, first);
    assert_eq!(fs::read_to_string(target.failsafe_path())?, TEMPLATE);

    patch(&target, &variables)?;
    let outcome = patch(&target, &variables)?;
    assert_eq!(
        outcome,
        Outcome::Committed {
            backup: target.save_path(0),
            state: BackupState::Saved(vec![1, 0])
        }
    );
    assert_eq!(
        leftovers(dir.path())?,
        vec![
            "app.toml",
            "app.toml.debk",
            "app.toml.save.0",
            "app.toml.save.1",
            "app.toml.save.2",
        ]
    );
    assert_eq!(fs::read_to_string(target.failsafe_path())?, TEMPLATE);

    Ok(())
}

#[test]
fn unmodified_file_is_left_alone() -> Result<()> {
    let content = "plain = true\ncost = \"$5 {each}\"\n";
    let (dir, target) = fixture(content)?;
    let before = fs::metadata(target.path())?.modified()?;

    let outcome = patch(&target, &variables("db.local"))?;

    assert_eq!(outcome, Outcome::Unchanged);
    assert_eq!(fs::read_to_string(target.path())?, content);
    assert_eq!(fs::metadata(target.path())?.modified()?, before);
    assert_eq!(leftovers(dir.path())?, vec!["app.toml"]);

    Ok(())
}

#[test]
fn lenient_mode_keeps_undefined_placeholders() -> Result<()> {
    let (dir, target) = fixture("user=${DB_USER}\nkey=${UNDEF}\n")?;

    patch(&target, &variables("db.local"))?;

    assert_eq!(fs::read_to_string(target.path())?, "user=app\nkey=${UNDEF}\n");
    assert_eq!(leftovers(dir.path())?, vec!["app.toml", "app.toml.debk"]);

    Ok(())
}

#[test]
fn strict_mode_leaves_no_trace() -> Result<()> {
    let (dir, target) = fixture("user=${DB_USER}\nkey=${UNDEF}\n")?;
    let variables = variables("db.local");

    let result = Patcher::new(&variables, Policy::Strict).patch_all(std::slice::from_ref(&target));

    assert!(result.is_err());
    assert_eq!(fs::read_to_string(target.path())?, "user=${DB_USER}\nkey=${UNDEF}\n");
    assert_eq!(leftovers(dir.path())?, vec!["app.toml"]);

    Ok(())
}

#[test]
fn globbed_directory_never_patches_backups() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let template = "host=${HOST}\n";
    fs::write(dir.path().join("app.conf"), template)?;
    let definition = DeployDefinition {
        files: vec![format!("{}/*", dir.path().display())],
        ..DeployDefinition::default()
    };

    for host in ["one", "two", "three"] {
        let targets = definition.targets()?;
        assert_eq!(targets, vec![TargetFile::new(dir.path().join("app.conf"))]);

        let variables: VariableMap = [("HOST", host)].into_iter().collect();
        Patcher::new(&variables, Policy::Lenient).patch_all(&targets)?;

        assert_eq!(
            fs::read_to_string(dir.path().join("app.conf"))?,
            format!("host={host}\n")
        );
        assert_eq!(fs::read_to_string(dir.path().join("app.conf.debk"))?, template);
    }

    assert_eq!(
        leftovers(dir.path())?,
        vec!["app.conf", "app.conf.debk", "app.conf.save.0", "app.conf.save.1"]
    );

    Ok(())
}
