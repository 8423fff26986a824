//! Request path normalization and root confinement

use std::path::{Path, PathBuf};

use percent_encoding::percent_decode_str;

/// Turn a raw URL path into a path relative to the asset root.
///
/// Percent-decodes, treats `\` as a separator and collapses `.` and `..`.
/// Returns `None` when a `..` would climb above the root, when the path
/// carries a NUL byte, or when a segment is a Windows drive prefix (`C:`).
/// On Windows any `:` is refused since it names an alternate data stream.
pub fn normalize_request_path(raw: &str) -> Option<PathBuf> {
    let decoded = percent_decode_str(raw).decode_utf8().ok()?;
    if decoded.contains('\0') {
        return None;
    }

    let unified = decoded.replace('\\', "/");
    let mut segments: Vec<&str> = Vec::new();
    for segment in unified.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop()?;
            }
            s if is_windows_special(s) => return None,
            s => segments.push(s),
        }
    }

    Some(segments.iter().collect())
}

fn is_windows_special(segment: &str) -> bool {
    let bytes = segment.as_bytes();
    let drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    drive || (cfg!(windows) && segment.contains(':'))
}

/// Whether `candidate` lies at or below `root`. Both must already be canonical.
pub fn is_within_root(root: &Path, candidate: &Path) -> bool {
    candidate.starts_with(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_paths() {
        assert_eq!(normalize_request_path("/app.wasm"), Some(PathBuf::from("app.wasm")));
        assert_eq!(
            normalize_request_path("/assets/img/logo.png"),
            Some(PathBuf::from("assets/img/logo.png"))
        );
        assert_eq!(normalize_request_path("/"), Some(PathBuf::new()));
    }

    #[test]
    fn test_dot_segments_collapse() {
        assert_eq!(
            normalize_request_path("/a/./b/../c.js"),
            Some(PathBuf::from("a/c.js"))
        );
        assert_eq!(normalize_request_path("//a///b"), Some(PathBuf::from("a/b")));
    }

    #[test]
    fn test_escape_rejected() {
        assert_eq!(normalize_request_path("/../secret.txt"), None);
        assert_eq!(normalize_request_path("/a/../../secret.txt"), None);
        assert_eq!(normalize_request_path("/%2e%2e/secret.txt"), None);
        assert_eq!(normalize_request_path("/a/%2E%2E%2F%2E%2E/etc/passwd"), None);
        assert_eq!(normalize_request_path("/..\\..\\windows\\win.ini"), None);
    }

    #[test]
    fn test_percent_decoding() {
        assert_eq!(
            normalize_request_path("/my%20level/map.data"),
            Some(PathBuf::from("my level/map.data"))
        );
    }

    #[test]
    fn test_rejects_nul_and_drive_prefix() {
        assert_eq!(normalize_request_path("/file%00.png"), None);
        assert_eq!(normalize_request_path("/C:/windows/win.ini"), None);
        assert_eq!(normalize_request_path("/%FF%FE"), None);
    }

    #[cfg(not(windows))]
    #[test]
    fn test_colon_in_file_name_allowed() {
        assert_eq!(
            normalize_request_path("/levels/level:1.data"),
            Some(PathBuf::from("levels/level:1.data"))
        );
        assert_eq!(
            normalize_request_path("/ui/12%3A30.png"),
            Some(PathBuf::from("ui/12:30.png"))
        );
        assert_eq!(normalize_request_path("/assets/d:/x.png"), None);
    }

    #[test]
    fn test_is_within_root() {
        let root = Path::new("/srv/game");
        assert!(is_within_root(root, Path::new("/srv/game/app.wasm")));
        assert!(is_within_root(root, Path::new("/srv/game")));
        assert!(!is_within_root(root, Path::new("/srv/game2/app.wasm")));
        assert!(!is_within_root(root, Path::new("/etc/passwd")));
    }
}
