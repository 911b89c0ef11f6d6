// src/manifest.rs

//! `package.json` handling
//!
//! The manifest is kept as a JSON document so keys nestpm does not know
//! about survive a load/save cycle in their original order. Only the
//! `dependencies` and `devDependencies` maps are interpreted.

use crate::error::{Error, Result};
use crate::registry::DependencySpec;
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Manifest file name
pub const MANIFEST_FILE: &str = "package.json";

/// Which dependency map an entry lives in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyKind {
    Runtime,
    Dev,
}

impl DependencyKind {
    fn key(self) -> &'static str {
        match self {
            Self::Runtime => "dependencies",
            Self::Dev => "devDependencies",
        }
    }
}

/// A project's `package.json`
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    document: Map<String, Value>,
}

impl Manifest {
    /// Fresh manifest for the project in `project_dir`
    ///
    /// The package name is the project directory's name, resolved through
    /// the filesystem so relative paths like `.` still yield one.
    pub fn default_for(project_dir: &Path) -> Self {
        let resolved = fs::canonicalize(project_dir).unwrap_or_else(|_| project_dir.to_path_buf());
        let name = resolved
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_else(|| "project".to_string());

        let mut document = Map::new();
        document.insert("name".to_string(), Value::String(name));
        document.insert("version".to_string(), Value::String("1.0.0".to_string()));
        document.insert("dependencies".to_string(), Value::Object(Map::new()));
        document.insert("devDependencies".to_string(), Value::Object(Map::new()));

        Self {
            path: project_dir.join(MANIFEST_FILE),
            document,
        }
    }

    /// Read the manifest at `path`
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Reading manifest {}", path.display());
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Manifest(format!("Failed to read {}: {}", path.display(), e)))?;

        let document = match serde_json::from_str(&content)? {
            Value::Object(map) => map,
            _ => {
                return Err(Error::Manifest(format!(
                    "{} is not a JSON object",
                    path.display()
                )));
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            document,
        })
    }

    /// Read `package.json` in `project_dir`, writing a default one if absent
    pub fn load_or_create(project_dir: &Path) -> Result<Self> {
        let path = project_dir.join(MANIFEST_FILE);
        if path.exists() {
            return Self::load(&path);
        }

        let manifest = Self::default_for(project_dir);
        manifest.save()?;
        info!("Created {}", path.display());
        Ok(manifest)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the manifest back with two-space indentation
    pub fn save(&self) -> Result<()> {
        let mut content = serde_json::to_string_pretty(&self.document)?;
        content.push('\n');
        fs::write(&self.path, content)?;
        debug!("Wrote manifest {}", self.path.display());
        Ok(())
    }

    fn section(&self, kind: DependencyKind) -> Result<DependencySpec> {
        let Some(value) = self.document.get(kind.key()) else {
            return Ok(DependencySpec::new());
        };

        let Value::Object(map) = value else {
            return Err(Error::Manifest(format!("'{}' is not an object", kind.key())));
        };

        map.iter()
            .map(|(name, spec)| match spec {
                Value::String(spec) => Ok((name.clone(), spec.clone())),
                other => Err(Error::Manifest(format!(
                    "'{}.{}' must be a string, found {}",
                    kind.key(),
                    name,
                    other
                ))),
            })
            .collect()
    }

    /// The `dependencies` map, in document order
    pub fn dependencies(&self) -> Result<DependencySpec> {
        self.section(DependencyKind::Runtime)
    }

    /// The `devDependencies` map, in document order
    pub fn dev_dependencies(&self) -> Result<DependencySpec> {
        self.section(DependencyKind::Dev)
    }

    /// Set `name` to `specifier` in the chosen map, creating the map if needed
    pub fn add_dependency(&mut self, name: &str, specifier: &str, kind: DependencyKind) -> Result<()> {
        let section = self
            .document
            .entry(kind.key())
            .or_insert_with(|| Value::Object(Map::new()));

        let Value::Object(map) = section else {
            return Err(Error::Manifest(format!("'{}' is not an object", kind.key())));
        };

        map.insert(name.to_string(), Value::String(specifier.to_string()));
        Ok(())
    }

    /// Remove `name` from `dependencies`, or failing that `devDependencies`
    ///
    /// Returns the map it was removed from, or `None` if it was in neither.
    pub fn remove_dependency(&mut self, name: &str) -> Option<DependencyKind> {
        for kind in [DependencyKind::Runtime, DependencyKind::Dev] {
            if let Some(Value::Object(map)) = self.document.get_mut(kind.key()) {
                if map.shift_remove(name).is_some() {
                    return Some(kind);
                }
            }
        }
        None
    }
}

/// Split `name@specifier` into its parts, defaulting the specifier to `latest`
///
/// Scoped names keep their leading `@` (`@types/node@18` -> `@types/node`, `18`).
pub fn parse_package_arg(arg: &str) -> Result<(String, String)> {
    let (name, specifier) = match arg.rfind('@') {
        Some(pos) if pos > 0 => (&arg[..pos], &arg[pos + 1..]),
        _ => (arg, "latest"),
    };

    if name.is_empty() || name == "@" {
        return Err(Error::Manifest(format!("Invalid package name in '{}'", arg)));
    }

    let specifier = if specifier.is_empty() { "latest" } else { specifier };
    Ok((name.to_string(), specifier.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_package_arg() {
        assert_eq!(
            parse_package_arg("is-thirteen@2.0.0").unwrap(),
            ("is-thirteen".to_string(), "2.0.0".to_string())
        );
        assert_eq!(
            parse_package_arg("lodash").unwrap(),
            ("lodash".to_string(), "latest".to_string())
        );
        assert_eq!(
            parse_package_arg("@types/node@^18.0.0").unwrap(),
            ("@types/node".to_string(), "^18.0.0".to_string())
        );
        assert_eq!(
            parse_package_arg("@types/node").unwrap(),
            ("@types/node".to_string(), "latest".to_string())
        );
        assert!(parse_package_arg("").is_err());
        assert!(parse_package_arg("@").is_err());
    }

    #[test]
    fn test_load_or_create_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Manifest::load_or_create(dir.path()).unwrap();

        assert!(dir.path().join(MANIFEST_FILE).exists());
        assert!(manifest.dependencies().unwrap().is_empty());
        assert!(manifest.dev_dependencies().unwrap().is_empty());

        let reloaded = Manifest::load(manifest.path()).unwrap();
        assert_eq!(
            reloaded.document.get("version"),
            Some(&Value::String("1.0.0".to_string()))
        );
    }

    #[test]
    fn test_default_name_for_current_directory() {
        let manifest = Manifest::default_for(Path::new("."));

        let cwd = std::env::current_dir().unwrap();
        let expected = cwd
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_lowercase();
        assert_eq!(manifest.document.get("name"), Some(&Value::String(expected)));
        assert_eq!(manifest.path(), Path::new(".").join(MANIFEST_FILE));
    }

    #[test]
    fn test_default_name_for_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let project = dir.path().join("My-App");
        fs::create_dir_all(project.join("sub")).unwrap();

        let manifest = Manifest::default_for(&project.join("sub").join(".."));
        assert_eq!(
            manifest.document.get("name"),
            Some(&Value::String("my-app".to_string()))
        );
    }

    #[test]
    fn test_dependencies_keep_document_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(
            &path,
            r#"{"name":"app","dependencies":{"zeta":"1.0.0","alpha":"^2.0.0"}}"#,
        )
        .unwrap();

        let manifest = Manifest::load(&path).unwrap();
        let deps = manifest.dependencies().unwrap();
        let names: Vec<_> = deps.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["zeta", "alpha"]);
        assert!(manifest.dev_dependencies().unwrap().is_empty());
    }

    #[test]
    fn test_add_and_remove_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(
            &path,
            r#"{"name":"app","scripts":{"test":"jest"},"dependencies":{"a":"1.0.0"}}"#,
        )
        .unwrap();

        let mut manifest = Manifest::load(&path).unwrap();
        manifest
            .add_dependency("b", "2.0.0", DependencyKind::Runtime)
            .unwrap();
        manifest
            .add_dependency("jest", "^29.0.0", DependencyKind::Dev)
            .unwrap();
        manifest.save().unwrap();

        let mut manifest = Manifest::load(&path).unwrap();
        let names: Vec<_> = manifest.dependencies().unwrap().keys().cloned().collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(
            manifest.dev_dependencies().unwrap().get("jest").map(String::as_str),
            Some("^29.0.0")
        );

        assert_eq!(manifest.remove_dependency("a"), Some(DependencyKind::Runtime));
        assert_eq!(manifest.remove_dependency("jest"), Some(DependencyKind::Dev));
        assert_eq!(manifest.remove_dependency("missing"), None);
        manifest.save().unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let keys: Vec<_> = Manifest::load(&path)
            .unwrap()
            .document
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["name", "scripts", "dependencies", "devDependencies"]);
        assert!(content.contains("\"test\": \"jest\""));
    }

    #[test]
    fn test_non_string_specifier_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, r#"{"dependencies":{"a":1}}"#).unwrap();

        let manifest = Manifest::load(&path).unwrap();
        assert!(matches!(manifest.dependencies(), Err(Error::Manifest(_))));
    }

    #[test]
    fn test_non_object_manifest_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(MANIFEST_FILE);
        fs::write(&path, "[]").unwrap();

        assert!(matches!(Manifest::load(&path), Err(Error::Manifest(_))));
    }
}
