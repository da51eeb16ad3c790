//! Manifest reading
//!
//! Reads never fail: an absent, unreadable or malformed `package.json` is
//! reported as `None`, exactly like a missing file.

use std::fs;
use std::path::Path;

use crate::domain::Manifest;

/// Name of the manifest file in every project root
pub const MANIFEST_FILE: &str = "package.json";

/// Presence of this file in a project root opts the project into auto-typing
pub const TSCONFIG_FILE: &str = "tsconfig.json";

/// Reads and parses a manifest file
pub fn read_manifest(path: &Path) -> Option<Manifest> {
    let content = fs::read_to_string(path).ok()?;
    Manifest::parse(&content)
}

/// True if the installed package in `package_dir` ships its own types.
///
/// A package is typed when it has a `tsconfig.json`, declares `types` or
/// `typings`, or has a `.d.ts` file next to its `main` entry (default
/// `index.js`). A package that is not installed is untyped.
pub fn package_ships_types(package_dir: &Path) -> bool {
    if package_dir.join(TSCONFIG_FILE).is_file() {
        return true;
    }

    let Some(manifest) = read_manifest(&package_dir.join(MANIFEST_FILE)) else {
        return false;
    };

    if manifest.declares_types() {
        return true;
    }

    let main = manifest
        .main
        .as_deref()
        .filter(|main| !main.is_empty())
        .unwrap_or("index.js");

    package_dir
        .join(Path::new(main).with_extension("d.ts"))
        .is_file()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, file: &str, content: &str) {
        let path = dir.join(file);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn read_existing_manifest() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), MANIFEST_FILE, r#"{ "dependencies": { "a": "1" } }"#);

        let manifest = read_manifest(&dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(manifest.dependencies.unwrap().contains_key("a"));
    }

    #[test]
    fn manifest_saved_with_bom_is_read() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), MANIFEST_FILE, "\u{feff}{ \"devDependencies\": { \"jest\": \"29\" } }");

        let manifest = read_manifest(&dir.path().join(MANIFEST_FILE)).unwrap();
        assert!(manifest.dev_dependencies.unwrap().contains_key("jest"));
    }

    #[test]
    fn missing_or_broken_manifest_is_none() {
        let dir = TempDir::new().unwrap();
        assert!(read_manifest(&dir.path().join(MANIFEST_FILE)).is_none());

        write(dir.path(), MANIFEST_FILE, "{ not json");
        assert!(read_manifest(&dir.path().join(MANIFEST_FILE)).is_none());
    }

    #[test]
    fn uninstalled_package_is_untyped() {
        let dir = TempDir::new().unwrap();
        assert!(!package_ships_types(&dir.path().join("node_modules/lodash")));
    }

    #[test]
    fn types_field_marks_package_typed() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), MANIFEST_FILE, r#"{ "types": "dist/index.d.ts" }"#);
        assert!(package_ships_types(dir.path()));
    }

    #[test]
    fn tsconfig_marks_package_typed() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), TSCONFIG_FILE, "{}");
        assert!(package_ships_types(dir.path()));
    }

    #[test]
    fn declaration_next_to_main() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), MANIFEST_FILE, r#"{ "main": "lib/main.js" }"#);
        assert!(!package_ships_types(dir.path()));

        write(dir.path(), "lib/main.d.ts", "export {}");
        assert!(package_ships_types(dir.path()));
    }

    #[test]
    fn default_main_is_index() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), MANIFEST_FILE, r#"{ "name": "pkg" }"#);
        write(dir.path(), "index.d.ts", "export {}");
        assert!(package_ships_types(dir.path()));
    }
}
