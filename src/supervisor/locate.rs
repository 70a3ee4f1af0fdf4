use std::{
    fs,
    path::{Path, PathBuf},
};

/// Where a worker package is expected to live relative to its install root.
#[derive(Debug, Clone)]
pub struct WorkerLayout {
    /// Directory name of the worker package.
    pub package_name: String,
    /// Worker entry script, relative to the package root.
    pub script_path: PathBuf,
    /// Interpreter shipped inside the package, relative to the package root.
    pub bundled_interpreter: PathBuf,
    /// Interpreter looked up on `PATH` when the bundled one is missing.
    pub fallback_interpreter: String,
    /// How deep the last-resort search descends below the project root.
    pub search_depth: usize,
}

impl Default for WorkerLayout {
    fn default() -> Self {
        let (bundled, fallback) = if cfg!(windows) {
            ("python/runtime/python.exe", "python")
        } else {
            ("python/runtime/bin/python3", "python3")
        };
        Self {
            package_name: "skillbridge-worker".to_string(),
            script_path: PathBuf::from("python/core/ai_server.py"),
            bundled_interpreter: PathBuf::from(bundled),
            fallback_interpreter: fallback.to_string(),
            search_depth: 6,
        }
    }
}

/// How a worker package was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOrigin {
    /// `<project>/packages/<name>`, where a package manager installs it.
    Package,
    /// `<project>/workers/<name>`, a checked-out source tree.
    Source,
    /// Found by scanning the project for the entry script.
    Search,
}

/// A located worker package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerInstall {
    pub root: PathBuf,
    pub origin: InstallOrigin,
}

impl WorkerInstall {
    pub fn script(&self, layout: &WorkerLayout) -> PathBuf {
        self.root.join(&layout.script_path)
    }

    pub fn bundled_interpreter(&self, layout: &WorkerLayout) -> PathBuf {
        self.root.join(&layout.bundled_interpreter)
    }
}

/// Find an installed worker whose entry script exists.
pub fn locate_worker(project_root: &Path, layout: &WorkerLayout) -> Option<WorkerInstall> {
    find_install(project_root, layout).filter(|install| install.script(layout).is_file())
}

/// Find the worker package: package location, then source location, then a
/// bounded search for the entry script. A candidate directory without its
/// script is skipped; it is returned only when nothing runnable exists, so the
/// caller can report the missing script.
pub(super) fn find_install(project_root: &Path, layout: &WorkerLayout) -> Option<WorkerInstall> {
    let candidates = [
        (
            project_root.join("packages").join(&layout.package_name),
            InstallOrigin::Package,
        ),
        (
            project_root.join("workers").join(&layout.package_name),
            InstallOrigin::Source,
        ),
    ];
    let mut incomplete = None;
    for (root, origin) in candidates {
        if !root.is_dir() {
            continue;
        }
        let install = WorkerInstall { root, origin };
        if install.script(layout).is_file() {
            return Some(install);
        }
        incomplete.get_or_insert(install);
    }

    find_script(project_root, &layout.script_path, layout.search_depth)
        .and_then(|script| {
            install_root_for(&script, &layout.script_path).map(|root| WorkerInstall {
                root,
                origin: InstallOrigin::Search,
            })
        })
        .or(incomplete)
}

/// Strip `script_path` off the end of `script` to recover the package root.
pub(super) fn install_root_for(script: &Path, script_path: &Path) -> Option<PathBuf> {
    if !script.ends_with(script_path) {
        return None;
    }
    let depth = script_path.components().count();
    script.ancestors().nth(depth).map(Path::to_path_buf)
}

fn find_script(dir: &Path, script_path: &Path, depth_left: usize) -> Option<PathBuf> {
    let file_name = script_path.file_name()?;
    let mut entries: Vec<_> = fs::read_dir(dir).ok()?.filter_map(Result::ok).collect();
    entries.sort_by_key(|entry| entry.file_name());

    let mut subdirs = Vec::new();
    for entry in entries {
        let path = entry.path();
        let Ok(file_type) = entry.file_type() else {
            continue;
        };
        if file_type.is_file() {
            if entry.file_name() == file_name && path.ends_with(script_path) {
                return Some(path);
            }
        } else if file_type.is_dir() && !skip_dir(&entry.file_name().to_string_lossy()) {
            subdirs.push(path);
        }
    }

    if depth_left == 0 {
        return None;
    }
    subdirs
        .into_iter()
        .find_map(|sub| find_script(&sub, script_path, depth_left - 1))
}

fn skip_dir(name: &str) -> bool {
    name.starts_with('.') || matches!(name, "target" | "node_modules" | "__pycache__")
}
