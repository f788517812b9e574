use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use rusqlite::Connection;
use tracing::info;

use crate::cli::PackageArgs;
use crate::commands::ingest::{count_rows, open_store};
use crate::model::PackageManifest;
use crate::util::{
    DEFAULT_DB_FILENAME, ensure_directory, now_utc_string, resolve_db_path, sha256_file,
    write_json_pretty,
};

const SETUP_SH: &str = "setup.sh";
const SETUP_BAT: &str = "setup.bat";
const PACKAGE_MANIFEST: &str = "package_manifest.json";

pub fn run(args: PackageArgs) -> Result<()> {
    let db_path = resolve_db_path(&args.cache_root, args.db_path.as_deref());
    let dist_dir = args
        .dist_dir
        .unwrap_or_else(|| args.cache_root.join("dist"));

    let manifest = package_store(&db_path, &dist_dir, &args.runtime_db_path)?;
    info!(
        path = %manifest.packaged_db_path,
        sha256 = %manifest.sha256,
        size_bytes = manifest.size_bytes,
        "package completed"
    );
    Ok(())
}

pub fn package_store(
    db_path: &Path,
    dist_dir: &Path,
    runtime_db_path: &str,
) -> Result<PackageManifest> {
    if !db_path.is_file() {
        bail!("store not found: {}", db_path.display());
    }
    ensure_directory(dist_dir)?;

    let connection = open_store(db_path)?;
    checkpoint(&connection)?;
    let ingredient_rows = count_rows(&connection, r#"SELECT COUNT(*) FROM "Ingredient""#)?;
    let exercise_rows = count_rows(&connection, r#"SELECT COUNT(*) FROM "Exercise""#)?;
    drop(connection);

    let packaged = dist_dir.join(DEFAULT_DB_FILENAME);
    if packaged == db_path {
        bail!(
            "dist directory {} holds the source store itself",
            dist_dir.display()
        );
    }
    fs::copy(db_path, &packaged).with_context(|| {
        format!(
            "failed to copy {} to {}",
            db_path.display(),
            packaged.display()
        )
    })?;
    let size_bytes = fs::metadata(&packaged)
        .with_context(|| format!("failed to stat {}", packaged.display()))?
        .len();
    let sha256 = sha256_file(&packaged)?;

    let scripts = write_setup_scripts(dist_dir, runtime_db_path)?;

    let manifest = PackageManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        source_db_path: db_path.display().to_string(),
        packaged_db_path: packaged.display().to_string(),
        runtime_db_path: runtime_db_path.to_string(),
        sha256,
        size_bytes,
        ingredient_rows,
        exercise_rows,
        scripts,
    };
    let manifest_path = dist_dir.join(PACKAGE_MANIFEST);
    write_json_pretty(&manifest_path, &manifest)?;
    info!(
        path = %manifest_path.display(),
        ingredients = ingredient_rows,
        exercises = exercise_rows,
        "wrote package manifest"
    );

    Ok(manifest)
}

fn checkpoint(connection: &Connection) -> Result<()> {
    connection
        .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))
        .context("failed to checkpoint WAL")
}

fn write_setup_scripts(dist_dir: &Path, runtime_db_path: &str) -> Result<Vec<String>> {
    let windows_target = runtime_db_path.replace('/', "\\");

    let sh = format!(
        r#"#!/bin/sh
set -e
HERE="$(cd "$(dirname "$0")" && pwd)"
TARGET="${{1:-{runtime_db_path}}}"
mkdir -p "$(dirname "$TARGET")"
cp "$HERE/{DEFAULT_DB_FILENAME}" "$TARGET"
echo "installed $TARGET"
"#
    );
    let bat = format!(
        "@echo off\r\n\
         setlocal\r\n\
         set \"TARGET=%~1\"\r\n\
         if \"%TARGET%\"==\"\" set \"TARGET={windows_target}\"\r\n\
         for %%F in (\"%TARGET%\") do if not exist \"%%~dpF\" mkdir \"%%~dpF\"\r\n\
         copy /Y \"%~dp0{DEFAULT_DB_FILENAME}\" \"%TARGET%\" >nul\r\n\
         echo installed %TARGET%\r\n"
    );

    let sh_path = dist_dir.join(SETUP_SH);
    fs::write(&sh_path, sh).with_context(|| format!("failed to write {}", sh_path.display()))?;
    make_executable(&sh_path)?;

    let bat_path = dist_dir.join(SETUP_BAT);
    fs::write(&bat_path, bat)
        .with_context(|| format!("failed to write {}", bat_path.display()))?;

    Ok(vec![SETUP_SH.to_string(), SETUP_BAT.to_string()])
}

#[cfg(unix)]
fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .with_context(|| format!("failed to mark {} executable", path.display()))
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn package_copies_store_and_writes_scripts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db_path = dir.path().join("work").join("nutrition.sqlite");
        let connection = open_store(&db_path).expect("open store");
        connection
            .execute(
                r#"INSERT INTO "Exercise"(activity, code, met, description, category, intensity, createdAt, updatedAt)
                   VALUES('running', 'RUN', 8.0, '', 'Running', 'VIGOROUS', 'now', 'now')"#,
                [],
            )
            .expect("seed exercise");
        drop(connection);

        let dist = dir.path().join("dist");
        let manifest = package_store(&db_path, &dist, "prisma/nutrition.db").expect("package");

        let packaged = dist.join(DEFAULT_DB_FILENAME);
        assert!(packaged.is_file());
        assert_eq!(manifest.exercise_rows, 1);
        assert_eq!(manifest.ingredient_rows, 0);
        assert_eq!(manifest.sha256, sha256_file(&packaged).expect("hash"));
        assert!(dist.join(PACKAGE_MANIFEST).is_file());

        let sh = fs::read_to_string(dist.join(SETUP_SH)).expect("setup.sh");
        assert!(sh.contains("${1:-prisma/nutrition.db}"));
        let bat = fs::read_to_string(dist.join(SETUP_BAT)).expect("setup.bat");
        assert!(bat.contains("prisma\\nutrition.db"));

        let copy = Connection::open(&packaged).expect("open packaged copy");
        let exercises = count_rows(&copy, r#"SELECT COUNT(*) FROM "Exercise""#).expect("count");
        assert_eq!(exercises, 1);
    }

    #[test]
    fn package_requires_an_existing_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = package_store(&dir.path().join("missing.sqlite"), dir.path(), "x.db");
        assert!(result.is_err());
        assert!(!dir.path().join(SETUP_SH).exists());
    }
}
