//! Source/output path rules.

/// Whether `path` ends in `.{extension}`, ignoring case and a leading dot
/// in the configured extension.
pub fn has_extension(path: &str, extension: &str) -> bool {
    let extension = extension.trim_start_matches('.');
    let Some((stem, ext)) = path.rsplit_once('.') else {
        return false;
    };
    // "raw/.mp4" has no file stem
    let stem_ok = !stem.is_empty() && !stem.ends_with('/');
    stem_ok && !ext.contains('/') && ext.eq_ignore_ascii_case(extension)
}

/// Whether `path` lies under the `prefix` directory.
pub fn is_under_prefix(path: &str, prefix: &str) -> bool {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        return false;
    }
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.starts_with('/'))
}

/// Final path segment of an object path.
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Destination of the transcoded artifact: the source's file name under
/// `output_prefix`. Pure, so re-running a job overwrites the same object.
pub fn derived_output_path(source_path: &str, output_prefix: &str) -> String {
    let prefix = output_prefix.trim_matches('/');
    let name = file_name(source_path);
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

/// Content type for an artifact, from its extension.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "mp4" | "m4v" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        "mkv" => "video/x-matroska",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_extension() {
        assert!(has_extension("raw/abc.mp4", "mp4"));
        assert!(has_extension("raw/abc.MP4", "mp4"));
        assert!(has_extension("abc.mp4", ".mp4"));
        assert!(!has_extension("raw/abc.mov", "mp4"));
        assert!(!has_extension("raw/abc.mp4.txt", "mp4"));
        assert!(!has_extension("raw/abcmp4", "mp4"));
        assert!(!has_extension("raw/.mp4", "mp4"));
        assert!(!has_extension("raw.mp4/abc", "mp4"));
    }

    #[test]
    fn test_is_under_prefix() {
        assert!(is_under_prefix("compressed/abc.mp4", "compressed"));
        assert!(is_under_prefix("compressed/abc.mp4", "/compressed/"));
        assert!(!is_under_prefix("compressed-old/abc.mp4", "compressed"));
        assert!(!is_under_prefix("raw/compressed/abc.mp4", "compressed"));
        assert!(!is_under_prefix("abc.mp4", ""));
    }

    #[test]
    fn test_derived_output_path() {
        assert_eq!(
            derived_output_path("raw/abc.mp4", "compressed"),
            "compressed/abc.mp4"
        );
        assert_eq!(
            derived_output_path("uploads/2024/05/clip.mp4", "compressed/"),
            "compressed/clip.mp4"
        );
        assert_eq!(derived_output_path("abc.mp4", ""), "abc.mp4");
    }

    #[test]
    fn test_derived_output_path_is_deterministic() {
        for source in ["raw/abc.mp4", "a/b/c.MP4", "x.mp4"] {
            let first = derived_output_path(source, "compressed");
            assert_eq!(first, derived_output_path(source, "compressed"));
        }
    }

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("compressed/abc.mp4"), "video/mp4");
        assert_eq!(content_type_for("compressed/abc.MOV"), "video/quicktime");
        assert_eq!(content_type_for("compressed/abc"), "application/octet-stream");
    }
}
