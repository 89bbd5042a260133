/// Returns the canonical form of a request path.
///
/// Empty becomes `/`, a missing leading `/` is added, repeated slashes
/// collapse, and `.` / `..` elements are resolved (`..` never climbs above
/// the root). A trailing slash survives.
pub(crate) fn clean_path(path: &str) -> String {
    if path.is_empty() {
        return "/".to_owned();
    }

    let mut stack: Vec<&str> = Vec::new();
    for element in path.split('/') {
        match element {
            "" | "." => {}
            ".." => {
                stack.pop();
            }
            other => stack.push(other),
        }
    }

    let mut clean = String::with_capacity(path.len() + 1);
    for element in &stack {
        clean.push('/');
        clean.push_str(element);
    }
    if clean.is_empty() || path.ends_with('/') {
        clean.push('/');
    }
    clean
}

#[cfg(test)]
mod tests {
    use super::clean_path;

    #[test]
    fn already_clean() {
        for path in ["/", "/a", "/a/b", "/a/b/", "/purple_teapot"] {
            assert_eq!(clean_path(path), path);
        }
    }

    #[test]
    fn dot_segments() {
        assert_eq!(clean_path("/a/../b"), "/b");
        assert_eq!(clean_path("/a/./b"), "/a/b");
        assert_eq!(clean_path("/a/b/.."), "/a");
        assert_eq!(clean_path("/a/b/../"), "/a/");
        assert_eq!(clean_path("/.."), "/");
        assert_eq!(clean_path("/../../x"), "/x");
        assert_eq!(clean_path("/."), "/");
    }

    #[test]
    fn slashes() {
        assert_eq!(clean_path(""), "/");
        assert_eq!(clean_path("a/b"), "/a/b");
        assert_eq!(clean_path("//a///b"), "/a/b");
        assert_eq!(clean_path("/a//"), "/a/");
        assert_eq!(clean_path("//"), "/");
    }
}
