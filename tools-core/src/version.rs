//! Version probe: read the version marker of a source tree.
//!
//! Two marker formats are understood:
//! - a TOML manifest (`*.toml`): `package.version`, falling back to
//!   `workspace.package.version`;
//! - any other text file: the first line assigning `Version = "<literal>"`.
//!
//! The probe never fails. Anything unreadable yields [`Version::UNKNOWN`].

use std::path::Path;

use crate::types::Version;

/// Read the version marker at `path`.
pub fn read_version(path: &Path) -> Version {
    let Ok(contents) = std::fs::read_to_string(path) else {
        return Version::unknown();
    };

    let is_manifest = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    if is_manifest {
        if let Some(version) = manifest_version(&contents) {
            return Version::from(version);
        }
    }

    scan_version_literal(&contents)
        .map(Version::from)
        .unwrap_or_else(Version::unknown)
}

/// `package.version`, or `workspace.package.version` for workspace roots and
/// members that inherit it.
pub fn manifest_version(contents: &str) -> Option<String> {
    let table: toml::Table = toml::from_str(contents).ok()?;

    let from_package = table
        .get("package")
        .and_then(|p| p.get("version"))
        .and_then(|v| v.as_str());
    if let Some(v) = from_package {
        return Some(v.to_owned());
    }

    table
        .get("workspace")
        .and_then(|w| w.get("package"))
        .and_then(|p| p.get("version"))
        .and_then(|v| v.as_str())
        .map(str::to_owned)
}

/// First `Version = "<literal>"` assignment in free-form text.
pub fn scan_version_literal(contents: &str) -> Option<String> {
    contents.lines().find_map(|line| {
        let at = line.find("Version")?;
        let rest = &line[at + "Version".len()..];
        let eq = rest.find('=')?;
        let after_eq = &rest[eq + 1..];
        let open = after_eq.find('"')?;
        let literal = &after_eq[open + 1..];
        let close = literal.find('"')?;
        Some(literal[..close].to_owned())
    })
}
