//! Folder and file name derivation.
//!
//! Thread names come straight from chat users, so they are sanitized before
//! being used as remote folder names. File names are pulled out of attachment
//! URLs with a per-media-kind pattern.

use std::sync::LazyLock;

use regex::Regex;

/// Maximum length, in characters, of a sanitized folder name.
pub const MAX_FOLDER_NAME_LEN: usize = 255;

/// Returned when a name is empty before or after sanitization.
pub const UNNAMED_FOLDER: &str = "unnamed";

const FORBIDDEN_CHARS: [char; 9] = ['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

/// Matches image file names such as `photo_1.heic`.
pub static IMAGE_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+\.(?:png|jpg|jpeg|heic|heif))").expect("static regex is valid")
});

/// Matches video file names such as `clip.mp4`.
pub static VIDEO_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\w+\.(?:mp4|mov|avi|mkv))").expect("static regex is valid")
});

/// Make a raw thread name safe to use as a remote folder name.
///
/// Forbidden characters become `_`, every run of two or more dots becomes the
/// same number of underscores, leading/trailing dots and spaces are trimmed
/// and the result is capped at [`MAX_FOLDER_NAME_LEN`] characters.
pub fn sanitize_folder_name(name: Option<&str>) -> String {
    let Some(name) = name.filter(|n| !n.is_empty()) else {
        return UNNAMED_FOLDER.to_string();
    };

    let replaced: String = name
        .chars()
        .map(|c| if FORBIDDEN_CHARS.contains(&c) { '_' } else { c })
        .collect();

    let collapsed = replace_dot_runs(&replaced);
    let trimmed = collapsed.trim_matches(|c| c == '.' || c == ' ');
    let truncated: String = trimmed.chars().take(MAX_FOLDER_NAME_LEN).collect();

    if truncated.is_empty() {
        UNNAMED_FOLDER.to_string()
    } else {
        truncated
    }
}

fn replace_dot_runs(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut dots = 0usize;

    let mut flush = |out: &mut String, dots: &mut usize| {
        let fill = if *dots >= 2 { '_' } else { '.' };
        out.extend(std::iter::repeat(fill).take(*dots));
        *dots = 0;
    };

    for c in input.chars() {
        if c == '.' {
            dots += 1;
        } else {
            flush(&mut out, &mut dots);
            out.push(c);
        }
    }
    flush(&mut out, &mut dots);
    out
}

/// Pull a file name out of an attachment URL.
///
/// The URL is lower-cased before matching; the first match wins. Spaces are
/// replaced with underscores; single quotes are kept as they are.
pub fn extract_file_name(pattern: &Regex, url: &str) -> Option<String> {
    let lowered = url.to_lowercase();
    let found = pattern.find(&lowered)?;
    Some(found.as_str().replace(' ', "_"))
}

/// Lower-cased text after the last dot; the whole name if there is no dot.
pub fn extract_extension(name: &str) -> String {
    name.rsplit('.').next().unwrap_or(name).to_lowercase()
}

/// Escape a value for a single-quoted Drive query literal.
pub fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_cases() {
        assert_eq!(sanitize_folder_name(Some("MyFolder")), "MyFolder");
        assert_eq!(sanitize_folder_name(Some("")), "unnamed");
        assert_eq!(sanitize_folder_name(None), "unnamed");
        assert_eq!(sanitize_folder_name(Some("  .x.  ")), "x");
        assert_eq!(sanitize_folder_name(Some("  .folder.  ")), "folder");
    }

    #[test]
    fn test_dangerous_characters_replaced() {
        for c in FORBIDDEN_CHARS {
            let result = sanitize_folder_name(Some(&format!("folder{c}name")));
            assert!(!result.contains(c), "{c} survived in {result}");
            assert_eq!(result, "folder_name");
        }
    }

    #[test]
    fn test_path_traversal_prevention() {
        assert!(!sanitize_folder_name(Some("../../../etc/passwd")).contains(".."));
        assert_eq!(sanitize_folder_name(Some("../../folder")), "____folder");
        assert_eq!(sanitize_folder_name(Some("a...b")), "a___b");
        assert_eq!(sanitize_folder_name(Some("v1.2")), "v1.2");
    }

    #[test]
    fn test_only_dots_and_spaces_is_unnamed() {
        assert_eq!(sanitize_folder_name(Some(" . ")), "unnamed");
        assert_eq!(sanitize_folder_name(Some(".")), "unnamed");
    }

    #[test]
    fn test_length_limit() {
        let long_name = "a".repeat(300);
        assert_eq!(sanitize_folder_name(Some(&long_name)).chars().count(), 255);

        let multibyte = "é".repeat(300);
        assert_eq!(sanitize_folder_name(Some(&multibyte)).chars().count(), 255);
    }

    #[test]
    fn test_idempotent() {
        for input in [
            "Trip <2024>",
            "../../folder",
            "  spaced  ",
            "a..b",
            "plain",
            "dots...",
        ] {
            let once = sanitize_folder_name(Some(input));
            assert_eq!(sanitize_folder_name(Some(&once)), once, "{input}");
        }
    }

    #[test]
    fn test_truncation_can_expose_trailing_space() {
        // Truncation happens after trimming, so a second pass may trim again.
        let input = format!("{} tail", "a".repeat(254));
        let once = sanitize_folder_name(Some(&input));
        assert_eq!(once.chars().count(), 255);
        assert!(once.ends_with(' '));
        let twice = sanitize_folder_name(Some(&once));
        assert_eq!(twice, "a".repeat(254));
    }

    #[test]
    fn test_extract_file_name() {
        assert_eq!(
            extract_file_name(&IMAGE_NAME_PATTERN, "https://x.com/a.jpg"),
            Some("a.jpg".to_string())
        );
        assert_eq!(
            extract_file_name(&IMAGE_NAME_PATTERN, "https://example.com/path/to/Photo.PNG"),
            Some("photo.png".to_string())
        );
        assert_eq!(
            extract_file_name(&VIDEO_NAME_PATTERN, "https://example.com/video.mp4?ex=1"),
            Some("video.mp4".to_string())
        );
        assert_eq!(extract_file_name(&IMAGE_NAME_PATTERN, "https://x.com/a.txt"), None);
    }

    #[test]
    fn test_extract_file_name_quotes() {
        let result = extract_file_name(&IMAGE_NAME_PATTERN, "https://example.com/image'name.jpg");
        assert_eq!(result, Some("name.jpg".to_string()));
    }

    #[test]
    fn test_extract_file_name_keeps_quotes_from_wider_patterns() {
        let pattern = Regex::new(r"[^/]+\.jpg").unwrap();
        let result = extract_file_name(&pattern, "https://example.com/It's A Pic.jpg");
        assert_eq!(result, Some("it's_a_pic.jpg".to_string()));
    }

    #[test]
    fn test_extract_extension() {
        assert_eq!(extract_extension("photo.HEIC"), "heic");
        assert_eq!(extract_extension("archive.tar.gz"), "gz");
        assert_eq!(extract_extension("noext"), "noext");
    }

    #[test]
    fn test_escape_query_literal() {
        assert_eq!(escape_query_literal("Bob's trip"), "Bob\\'s trip");
    }
}
