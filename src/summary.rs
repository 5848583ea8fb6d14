#![forbid(unsafe_code)]

//! Extraction of viewer records from generated summary markdown.
//!
//! Every rule below is independent and returns `None` when its marker is
//! absent, so one malformed field never hides the others.

use std::{fs, path::Path, sync::LazyLock};

use regex::Regex;
use serde::Serialize;

/// Date used when a file name carries no `YYYY-MM-DD` prefix.
pub const FALLBACK_DATE: &str = "2025-01-01";
pub const UNKNOWN_CHANNEL: &str = "Unknown";

const ID_PATTERN: &str = "[A-Za-z0-9_-]{11}";

static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^#\s+(.+)$").expect("title pattern"));
static CHANNEL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*Channel:\*\*\s*(.+)").expect("channel pattern"));
static URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\*\*URL:\*\*\s*(https?://\S+)").expect("url pattern"));
static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{4}-[0-9]{2}-[0-9]{2})").expect("date pattern"));
static QUERY_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"[?&]v=({ID_PATTERN})")).expect("query id pattern"));
static SHORT_LINK_ID_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"youtu\.be/({ID_PATTERN})")).expect("short link id pattern")
});
static FILENAME_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"-({ID_PATTERN})\.md$")).expect("filename id pattern"));

/// One entry of the viewer's data array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub id: String,
    pub title: String,
    pub channel: String,
    pub url: String,
    pub date: String,
    pub thumbnail: String,
    pub content: String,
}

fn first_capture(re: &Regex, haystack: &str) -> Option<String> {
    re.captures(haystack)
        .and_then(|captures| captures.get(1))
        .map(|found| found.as_str().trim().to_string())
}

/// Text of the first `# ` heading.
pub fn extract_title(content: &str) -> Option<String> {
    first_capture(&TITLE_RE, content)
}

/// Value after the first `**Channel:**` marker.
pub fn extract_channel(content: &str) -> Option<String> {
    first_capture(&CHANNEL_RE, content)
}

/// First http(s) URL following a `**URL:**` marker.
pub fn extract_url(content: &str) -> Option<String> {
    first_capture(&URL_RE, content)
}

/// `YYYY-MM-DD` prefix of a file stem. Only the shape is checked.
pub fn extract_date(stem: &str) -> Option<String> {
    first_capture(&DATE_RE, stem)
}

/// Reads the id from a `v=` query parameter or a `youtu.be/` short link.
pub fn video_id_from_url(url: &str) -> Option<String> {
    first_capture(&QUERY_ID_RE, url).or_else(|| first_capture(&SHORT_LINK_ID_RE, url))
}

/// Reads the id from a `...-{id}.md` file name.
pub fn video_id_from_filename(file_name: &str) -> Option<String> {
    first_capture(&FILENAME_ID_RE, file_name)
}

/// The URL wins; the file name is only consulted when it yields nothing.
pub fn extract_video_id(file_name: &str, url: Option<&str>) -> Option<String> {
    url.and_then(video_id_from_url)
        .or_else(|| video_id_from_filename(file_name))
}

pub fn watch_url(video_id: &str) -> String {
    format!("https://www.youtube.com/watch?v={video_id}")
}

pub fn thumbnail_url(video_id: &str) -> String {
    format!("https://i.ytimg.com/vi/{video_id}/maxresdefault.jpg")
}

/// Builds a [`Summary`] from a file name and its markdown. Returns `None`
/// when no video id can be found anywhere.
pub fn parse_summary(file_name: &str, content: &str) -> Option<Summary> {
    let stem = Path::new(file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());

    let url = extract_url(content);
    let id = extract_video_id(file_name, url.as_deref())?;

    Some(Summary {
        title: extract_title(content).unwrap_or_else(|| stem.clone()),
        channel: extract_channel(content).unwrap_or_else(|| UNKNOWN_CHANNEL.to_string()),
        url: url.unwrap_or_else(|| watch_url(&id)),
        date: extract_date(&stem).unwrap_or_else(|| FALLBACK_DATE.to_string()),
        thumbnail: thumbnail_url(&id),
        content: content.to_string(),
        id,
    })
}

/// Reads and parses one summary file. Unreadable files and files without a
/// recognizable id are reported and skipped.
pub fn parse_summary_file(path: &Path) -> Option<Summary> {
    let file_name = path.file_name()?.to_string_lossy();
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            log::warn!("could not read {}: {}", file_name, err);
            return None;
        }
    };

    let summary = parse_summary(&file_name, &content);
    if summary.is_none() {
        log::warn!("could not extract video id from {}", file_name);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FULL: &str = "# Building a Compiler\n\n\
        **Channel:** Tsoding Daily\n\
        **URL:** https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42\n\n\
        ## Key points\n- lexing\n";

    #[test]
    fn title_uses_first_top_level_heading() {
        assert_eq!(
            extract_title("intro\n## Not this\n#   Real Title  \n# Second"),
            Some("Real Title".into())
        );
        assert_eq!(extract_title("no headings here"), None);
    }

    #[test]
    fn channel_and_url_markers() {
        assert_eq!(extract_channel(FULL), Some("Tsoding Daily".into()));
        assert_eq!(
            extract_url(FULL),
            Some("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=42".into())
        );
        assert_eq!(extract_channel("**Author:** someone"), None);
        assert_eq!(extract_url("**URL:** ftp://example.com/file"), None);
    }

    #[test]
    fn date_is_taken_from_the_stem_prefix() {
        assert_eq!(
            extract_date("2024-11-03-dQw4w9WgXcQ"),
            Some("2024-11-03".into())
        );
        assert_eq!(
            extract_date("2024-13-45-dQw4w9WgXcQ"),
            Some("2024-13-45".into())
        );
        assert_eq!(extract_date("notes-2024-11-03"), None);
        assert_eq!(extract_date("24-11-03-dQw4w9WgXcQ"), None);
    }

    #[test]
    fn date_prefix_is_kept_verbatim_in_summary() {
        let summary = parse_summary("2024-13-45-abcdefgh123.md", "# x").unwrap();
        assert_eq!(summary.date, "2024-13-45");
    }

    #[test]
    fn video_id_from_query_and_short_links() {
        assert_eq!(
            video_id_from_url("https://www.youtube.com/watch?feature=share&v=abcdefgh123"),
            Some("abcdefgh123".into())
        );
        assert_eq!(
            video_id_from_url("https://youtu.be/abcdefgh123"),
            Some("abcdefgh123".into())
        );
        assert_eq!(video_id_from_url("https://example.com/watch?v=short"), None);
    }

    #[test]
    fn url_id_wins_over_filename() {
        let summary = parse_summary(
            "2025-01-01-zzzzzzzzzzz.md",
            "# T\n**URL:** https://youtu.be/abcdefgh123\n",
        )
        .unwrap();
        assert_eq!(summary.id, "abcdefgh123");
        assert_eq!(summary.url, "https://youtu.be/abcdefgh123");
    }

    #[test]
    fn filename_fallback_synthesizes_watch_url() {
        let summary = parse_summary("2025-01-01-abcdefgh123.md", "# Title only\n").unwrap();
        assert_eq!(summary.id, "abcdefgh123");
        assert_eq!(summary.url, "https://www.youtube.com/watch?v=abcdefgh123");
        assert_eq!(summary.date, "2025-01-01");
        assert_eq!(
            summary.thumbnail,
            "https://i.ytimg.com/vi/abcdefgh123/maxresdefault.jpg"
        );
    }

    #[test]
    fn unmatched_url_falls_back_to_filename() {
        let summary = parse_summary(
            "2024-06-30-abcdefgh123.md",
            "**URL:** https://example.com/article\n",
        )
        .unwrap();
        assert_eq!(summary.id, "abcdefgh123");
        assert_eq!(summary.url, "https://example.com/article");
    }

    #[test]
    fn missing_fields_use_defaults() {
        let summary = parse_summary("notes-abcdefgh123.md", "plain text").unwrap();
        assert_eq!(summary.title, "notes-abcdefgh123");
        assert_eq!(summary.channel, UNKNOWN_CHANNEL);
        assert_eq!(summary.date, FALLBACK_DATE);
        assert_eq!(summary.content, "plain text");
    }

    #[test]
    fn no_id_anywhere_yields_none() {
        assert_eq!(parse_summary("2025-01-01-hi.md", "# Hello\n"), None);
    }

    #[test]
    fn parse_summary_file_reads_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2024-02-29-dQw4w9WgXcQ.md");
        fs::write(&path, FULL).unwrap();

        let summary = parse_summary_file(&path).unwrap();
        assert_eq!(summary.id, "dQw4w9WgXcQ");
        assert_eq!(summary.title, "Building a Compiler");
        assert_eq!(summary.date, "2024-02-29");

        assert_eq!(parse_summary_file(&dir.path().join("missing.md")), None);
    }
}
