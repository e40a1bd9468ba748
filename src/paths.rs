//! Lexical path arithmetic.
//!
//! Nothing here touches the filesystem: paths are normalized purely by
//! their components, the way link targets and output locations need to be
//! computed before anything exists on disk.

use std::path::{Component, Path, PathBuf};

/// Collapse `.` and `..` components without consulting the filesystem.
///
/// A `..` at the root is dropped; leading `..` components of a relative path
/// are kept.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out: Vec<Component<'_>> = Vec::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(comp),
            },
            other => out.push(other),
        }
    }
    out.iter().map(|c| c.as_os_str()).collect()
}

/// Resolve `path` against `cwd`. Absolute paths are only normalized.
pub fn resolve(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&cwd.join(path))
    }
}

/// The path that leads from `from` to `to`.
///
/// Both paths should be absolute (or both relative to the same directory).
/// Equal paths yield an empty path.
pub fn relative(from: &Path, to: &Path) -> PathBuf {
    let from = normalize(from);
    let to = normalize(to);
    let from: Vec<_> = from.components().collect();
    let to: Vec<_> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for comp in &to[common..] {
        out.push(comp.as_os_str());
    }
    out
}

/// Where the mirror of `path` lands under `dest`.
///
/// `dest` is resolved against `cwd`, then the `base`-relative offset of
/// `path` is appended. Deterministic for a given tuple.
pub fn link_path(dest: &Path, cwd: &Path, base: &Path, path: &Path) -> PathBuf {
    normalize(&resolve(cwd, dest).join(relative(base, path)))
}

// ---------------------------------------------------------------------------
// Glob prefixing
// ---------------------------------------------------------------------------

/// Prefix every glob with `src_base`, keeping a leading `!` outside the
/// prefix.
///
/// ```rust
/// let globs = pipeset::change_globs("base", ["x/y", "!x/z"]);
/// assert_eq!(globs, ["base/x/y", "!base/x/z"]);
/// ```
pub fn change_globs<I, S>(src_base: &str, globs: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    globs
        .into_iter()
        .map(|glob| change_glob(src_base, glob.as_ref()))
        .collect()
}

/// Prefix a single glob with `src_base`. See [`change_globs`].
pub fn change_glob(src_base: &str, glob: &str) -> String {
    match glob.strip_prefix('!') {
        Some(rest) => format!("!{}", join_glob(src_base, rest)),
        None => join_glob(src_base, glob),
    }
}

/// Join two `/`-separated glob strings and collapse `.`/`..` segments.
fn join_glob(prefix: &str, glob: &str) -> String {
    let absolute = prefix.starts_with('/') || (prefix.is_empty() && glob.starts_with('/'));
    let mut segments: Vec<&str> = Vec::new();

    for seg in prefix.split('/').chain(glob.split('/')) {
        match seg {
            "" | "." => {}
            ".." => match segments.last() {
                Some(last) if *last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(seg),
            },
            _ => segments.push(seg),
        }
    }

    let joined = segments.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
