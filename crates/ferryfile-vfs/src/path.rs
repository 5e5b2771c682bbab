//! Helpers for `/`-separated backend paths.
//!
//! Backend paths are plain strings: they may be absolute (`/srv/data`),
//! relative to an archive or drive root (`docs/a.txt`), or empty for the root.

/// Join a directory and a child name.
pub fn join(base: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if base.is_empty() {
        name.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, name)
    } else {
        format!("{}/{}", base, name)
    }
}

/// Parent directory, `/` for top-level absolute paths and `""` for
/// top-level relative ones.
pub fn parent(path: &str) -> String {
    let trimmed = trim_trailing(path);
    match trimmed.rfind('/') {
        Some(0) => "/".to_string(),
        Some(idx) => trimmed[..idx].to_string(),
        None => String::new(),
    }
}

/// Last path component.
pub fn basename(path: &str) -> &str {
    let trimmed = trim_trailing(path);
    match trimmed.rfind('/') {
        Some(idx) => &trimmed[idx + 1..],
        None => trimmed,
    }
}

/// Convert a local-style path (possibly with `\`) into a backend path.
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/")
}

fn trim_trailing(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("/srv", "a.txt"), "/srv/a.txt");
        assert_eq!(join("/", "a.txt"), "/a.txt");
        assert_eq!(join("", "a.txt"), "a.txt");
        assert_eq!(join("docs/", "/a.txt"), "docs/a.txt");
    }

    #[test]
    fn test_parent_and_basename() {
        assert_eq!(parent("/srv/data/a.txt"), "/srv/data");
        assert_eq!(parent("/a.txt"), "/");
        assert_eq!(parent("docs/a.txt"), "docs");
        assert_eq!(parent("a.txt"), "");
        assert_eq!(basename("/srv/data/"), "data");
        assert_eq!(basename("a.txt"), "a.txt");
        assert_eq!(basename("/"), "");
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(r"dir\sub\file.txt"), "dir/sub/file.txt");
    }
}
