//! Load the desired migration set from a manifest and script files.
//!
//! The manifest is a JSON array of ids in apply order:
//!
//! ```json
//! ["0001_create_users", "0002_add_posts"]
//! ```
//!
//! Each id has a forward script `<id>.sql` and a revert script
//! `<id>.revert.sql` in the scripts directory.

use std::path::Path;

use tracing::debug;

use migrago_core::error::{MigrateError, Result};
use migrago_core::{DesiredSet, Migration};

/// Read the manifest and every script it names.
pub fn load_desired_migrations(manifest: &Path, scripts_dir: &Path) -> Result<DesiredSet> {
    let ids = read_manifest(manifest)?;

    let mut migrations = Vec::with_capacity(ids.len());
    for id in ids {
        migrations.push(load_migration(scripts_dir, &id)?);
    }

    debug!(
        "Loaded {} desired migrations from {}",
        migrations.len(),
        manifest.display()
    );
    DesiredSet::new(migrations)
}

/// Read the ordered list of migration ids.
pub fn read_manifest(manifest: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(manifest).map_err(|e| {
        MigrateError::Load(format!(
            "Failed to read manifest {}: {}",
            manifest.display(),
            e
        ))
    })?;

    serde_json::from_str(&content).map_err(|e| {
        MigrateError::Load(format!(
            "Failed to parse manifest {}: {}",
            manifest.display(),
            e
        ))
    })
}

/// Read `<id>.sql` and `<id>.revert.sql` for one migration.
pub fn load_migration(scripts_dir: &Path, id: &str) -> Result<Migration> {
    if id.contains('/') || id.contains('\\') || id.contains("..") {
        return Err(MigrateError::Load(format!(
            "Invalid migration id '{}': must not contain path separators",
            id
        )));
    }

    let script = read_script(&scripts_dir.join(format!("{}.sql", id)))?;
    let revert_script = read_script(&scripts_dir.join(format!("{}.revert.sql", id)))?;

    Ok(Migration::new(id, script, revert_script))
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| MigrateError::Load(format!("Failed to read {}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_pair(dir: &Path, id: &str, script: &str, revert: &str) {
        fs::write(dir.join(format!("{id}.sql")), script).unwrap();
        fs::write(dir.join(format!("{id}.revert.sql")), revert).unwrap();
    }

    #[test]
    fn test_loads_in_manifest_order() {
        let dir = TempDir::new().unwrap();
        write_pair(dir.path(), "0002_second", "SELECT 2;", "SELECT -2;");
        write_pair(dir.path(), "0001_first", "SELECT 1;", "SELECT -1;");
        let manifest = dir.path().join("migrations.json");
        fs::write(&manifest, r#"["0002_second", "0001_first"]"#).unwrap();

        let set = load_desired_migrations(&manifest, dir.path()).unwrap();

        let ids: Vec<_> = set.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["0002_second", "0001_first"]);
        let first = set.get("0001_first").unwrap();
        assert_eq!(first.script, "SELECT 1;");
        assert_eq!(first.revert_script, "SELECT -1;");
        assert_eq!(first.checksum, migrago_core::checksum("SELECT 1;"));
    }

    #[test]
    fn test_empty_manifest() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("migrations.json");
        fs::write(&manifest, "[]").unwrap();

        let set = load_desired_migrations(&manifest, dir.path()).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_missing_manifest_is_load_error() {
        let dir = TempDir::new().unwrap();
        let err = load_desired_migrations(&dir.path().join("nope.json"), dir.path()).unwrap_err();
        assert!(matches!(err, MigrateError::Load(msg) if msg.contains("nope.json")));
    }

    #[test]
    fn test_malformed_manifest_is_load_error() {
        let dir = TempDir::new().unwrap();
        let manifest = dir.path().join("migrations.json");
        fs::write(&manifest, r#"{"ids": ["a"]}"#).unwrap();

        assert!(matches!(
            load_desired_migrations(&manifest, dir.path()),
            Err(MigrateError::Load(_))
        ));
    }

    #[test]
    fn test_missing_revert_script_is_load_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("0001.sql"), "SELECT 1;").unwrap();
        let manifest = dir.path().join("migrations.json");
        fs::write(&manifest, r#"["0001"]"#).unwrap();

        let err = load_desired_migrations(&manifest, dir.path()).unwrap_err();
        assert!(matches!(err, MigrateError::Load(msg) if msg.contains("0001.revert.sql")));
    }

    #[test]
    fn test_duplicate_id_in_manifest_rejected() {
        let dir = TempDir::new().unwrap();
        write_pair(dir.path(), "a", "SELECT 1;", "");
        let manifest = dir.path().join("migrations.json");
        fs::write(&manifest, r#"["a", "a"]"#).unwrap();

        assert!(matches!(
            load_desired_migrations(&manifest, dir.path()),
            Err(MigrateError::Load(_))
        ));
    }

    #[test]
    fn test_path_traversal_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(load_migration(dir.path(), "../etc/passwd").is_err());
    }
}
