//! Derives a game's installation root from its executable path.
//!
//! Works on path text only, splitting on both `/` and `\` so Windows paths resolve
//! the same way on every host. Nothing touches the filesystem.

use serde::{Deserialize, Serialize};

const MAX_ASCENT: usize = 4;

/// Folder-name fragments that mark a directory holding binaries rather than the game itself.
pub const CONTAINER_KEYWORDS: &[&str] = &[
    "bin", "binaries", "win64", "win32", "x64", "x86", "amd64", "engine", "build", "release", "shipping", "launcher", "runtime", "debug",
];

/// Folder names that are never a game's root.
pub const GENERIC_FOLDERS: &[&str] = &[
    "games", "program files", "program files (x86)", "steam", "steamapps", "common", "users", "",
];

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootTables {
    pub container_keywords: Vec<String>,
    pub generic_folders: Vec<String>,
}

impl Default for RootTables {
    fn default() -> Self {
        Self {
            container_keywords: CONTAINER_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            generic_folders: GENERIC_FOLDERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRoot {
    pub path: String,
    pub folder_name: String,
}

fn is_sep(c: char) -> bool { c == '/' || c == '\\' }

fn is_drive(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 2 && b[0].is_ascii_alphabetic() && b[1] == b':'
}

/// Parent directory of `path`, or `None` when there is nothing above it.
/// Drive roots keep their separator (`C:/`).
pub fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches(is_sep);
    let idx = trimmed.rfind(is_sep)?;
    Some(if idx == 0 || is_drive(&trimmed[..idx]) { &trimmed[..idx + 1] } else { &trimmed[..idx] })
}

/// Last path segment; empty for `/` and drive roots.
pub fn base_name(path: &str) -> &str {
    let trimmed = path.trim_end_matches(is_sep);
    match trimmed.rfind(is_sep) {
        Some(idx) => &trimmed[idx + 1..],
        None if is_drive(trimmed) => "",
        None => trimmed,
    }
}

/// File name without its final extension.
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') { Some(idx) if idx > 0 => &name[..idx], _ => name }
}

impl RootTables {
    fn is_container(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.container_keywords.iter().any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
    }

    fn is_generic(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        self.generic_folders.iter().any(|g| g.to_lowercase() == lower)
    }

    pub fn resolve(&self, exe_path: &str) -> GameRoot {
        let exe_dir = parent(exe_path).unwrap_or("");
        let mut current = exe_dir;
        for _ in 0..MAX_ASCENT {
            if !self.is_container(base_name(current)) { break; }
            match parent(current) {
                Some(up) if up != current => current = up,
                _ => break,
            }
        }
        if self.is_generic(base_name(current)) {
            log::debug!("root candidate {:?} is a generic folder, using {:?}", current, exe_dir);
            current = exe_dir;
        }
        GameRoot { path: current.to_string(), folder_name: base_name(current).to_string() }
    }
}

/// Resolves with the built-in tables.
pub fn resolve(exe_path: &str) -> GameRoot { RootTables::default().resolve(exe_path) }
