//! Directory listing HTML and per-file delivery planning.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use crate::config::Config;
use crate::encoding::{detect_file, EncodingGuess};
use crate::error::ServerError;

/// One child of a listed directory. `size` and `encoding` stay `None` for
/// directories; `size` is also `None` when the metadata read fails.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryEntry {
    pub name: String,
    pub is_dir: bool,
    pub size: Option<u64>,
    pub encoding: Option<String>,
}

/// How the body of a file response is presented to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Inline,
    Attachment,
}

/// Everything the transfer step needs to emit headers and pick a body
/// strategy, computed once per file request.
#[derive(Debug, Clone)]
pub struct FileDeliveryPlan {
    pub content_type: String,
    pub disposition: Disposition,
    pub filename_primary: String,
    pub filename_encoded: String,
    pub size_bytes: u64,
    /// Set only for inline text whose detected encoding is not UTF-8.
    pub transcode_from: Option<EncodingGuess>,
}

/// Escapes the five HTML-significant characters for safe embedding.
pub fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Formats a byte count with binary-prefixed units and one decimal place.
pub fn human_size(size: u64) -> String {
    let mut size = size as f64;
    for unit in ["B", "KB", "MB", "GB", "TB"] {
        if size < 1024.0 {
            return format!("{size:.1} {unit}");
        }
        size /= 1024.0;
    }
    format!("{size:.1} PB")
}

/// Percent-encodes a slash-separated path for use in an href, leaving the
/// separators themselves intact.
pub fn encode_href(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Replaces anything outside word characters, `-`, `_`, `.`, `(` and `)`
/// with `_` so the suggested download name is safe on common filesystems.
/// Alphanumeric here is Unicode-aware, so CJK names survive unchanged.
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Reads the immediate children of `dir`, sorted by name (case-sensitive).
/// Files carry a size and, when detection is confident and the guess is not
/// UTF-8, the encoding name for the listing badge.
pub fn scan_directory(dir: &Path, config: &Config) -> Result<Vec<DirectoryEntry>, ServerError> {
    let mut entries = Vec::new();

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        // Follows symlinks, so a link to a directory lists as one. Broken
        // links fall back to the file shape with no size.
        let is_dir = path.is_dir();

        let (size, encoding) = if is_dir {
            (None, None)
        } else {
            let size = fs::metadata(&path).map(|m| m.len()).ok();
            let encoding =
                detect_file(&path, config.detect_sample_size, config.detect_confidence)
                    .filter(|guess| !guess.is_utf8())
                    .map(|guess| guess.name);
            (size, encoding)
        };

        entries.push(DirectoryEntry {
            name,
            is_dir,
            size,
            encoding,
        });
    }

    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

const LISTING_STYLE: &str = "\
body { font-family: sans-serif; margin: 0; padding: 20px; background: #f5f5f5; }
.container { max-width: 960px; margin: 0 auto; background: #fff; border-radius: 8px;
  box-shadow: 0 2px 8px rgba(0,0,0,0.1); padding: 20px; }
h1 { color: #333; border-bottom: 2px solid #4a6bff; padding-bottom: 10px;
  font-size: 1.3em; word-break: break-all; }
ul.entries { list-style: none; padding: 0; margin: 0; }
ul.entries li { display: flex; align-items: center; padding: 8px 10px;
  border-bottom: 1px solid #eee; }
ul.entries li:hover { background: #f9f9f9; }
ul.entries li.parent { background: #eef2ff; }
.name { flex: 1; word-break: break-all; }
.size { color: #777; font-size: 0.85em; margin-left: 10px; white-space: nowrap; }
.badge { background: #e8f4fd; color: #2196f3; border-radius: 10px;
  padding: 1px 8px; font-size: 0.75em; margin-left: 8px; }
.download { font-size: 0.8em; margin-left: 10px; }
a { color: #4a6bff; text-decoration: none; }
a:hover { text-decoration: underline; }
.empty { color: #888; padding: 12px 10px; }
.footer { margin-top: 16px; text-align: center; color: #999; font-size: 0.8em; }
";

/// Renders the listing page for a directory. `rel_path` is the directory's
/// path relative to the served root, empty for the root itself.
pub fn render_listing(rel_path: &str, entries: &[DirectoryEntry]) -> String {
    let display_path = format!("/{rel_path}");
    let mut html = String::with_capacity(2048 + entries.len() * 256);

    let _ = write!(
        html,
        "<!DOCTYPE html>\n\
         <html lang=\"en\">\n\
         <head>\n\
         <meta charset=\"UTF-8\">\n\
         <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n\
         <title>Directory listing for {title}</title>\n\
         <style>\n{LISTING_STYLE}</style>\n\
         </head>\n\
         <body>\n\
         <div class=\"container\">\n\
         <h1>Directory listing for {title}</h1>\n\
         <ul class=\"entries\">\n",
        title = html_escape(&display_path),
    );

    if !rel_path.is_empty() {
        let parent = match rel_path.rsplit_once('/') {
            Some((head, _)) => format!("/{head}"),
            None => "/".to_string(),
        };
        let _ = write!(
            html,
            "<li class=\"parent\"><span class=\"name\">\
             <a href=\"{href}\">.. (parent directory)</a></span></li>\n",
            href = encode_href(&parent),
        );
    }

    for entry in entries {
        let target = if rel_path.is_empty() {
            format!("/{}", entry.name)
        } else {
            format!("/{rel_path}/{}", entry.name)
        };
        let href = encode_href(&target);
        let display = if entry.is_dir {
            format!("{}/", html_escape(&entry.name))
        } else {
            html_escape(&entry.name)
        };

        let _ = write!(
            html,
            "<li><span class=\"name\"><a href=\"{href}\">{display}</a>"
        );
        if let Some(encoding) = &entry.encoding {
            let _ = write!(html, "<span class=\"badge\">{}</span>", html_escape(encoding));
        }
        html.push_str("</span>");
        if !entry.is_dir {
            let size = entry.size.map(human_size).unwrap_or_else(|| "-".to_string());
            let _ = write!(
                html,
                "<span class=\"size\">{size}</span>\
                 <a class=\"download\" href=\"{href}?download=true\">download</a>"
            );
        }
        html.push_str("</li>\n");
    }

    html.push_str("</ul>\n");
    if entries.is_empty() {
        html.push_str("<p class=\"empty\">This directory is empty.</p>\n");
    }
    html.push_str(
        "<div class=\"footer\">servedir</div>\n</div>\n</body>\n</html>\n",
    );
    html
}

/// Returns true when the content type is served as viewable text.
fn is_text_type(content_type: &str) -> bool {
    content_type.starts_with("text/")
        || matches!(
            content_type,
            "application/json" | "application/xml" | "application/javascript"
        )
}

/// Resolves the content type for a path: configured extension overrides
/// first, then the system MIME table, then `application/octet-stream`.
fn content_type_for(path: &Path, config: &Config) -> String {
    if let Some(ext) = path.extension().map(|e| e.to_string_lossy()) {
        // The override table is keyed with the leading dot; `extension()`
        // hands back the bare suffix.
        if let Some(mapped) = config.mime_override(&format!(".{ext}")) {
            return mapped.to_string();
        }
    }
    mime_guess::from_path(path)
        .first_raw()
        .unwrap_or("application/octet-stream")
        .to_string()
}

/// Decides headers and body strategy for one file request.
///
/// Disposition is attachment for everything that is not text, and for any
/// request that explicitly asks to download. Inline text gets a charset
/// suffix and, when the detector is confident the source is not UTF-8, a
/// transcoding instruction for the transfer step.
pub fn plan_delivery(
    path: &Path,
    download_requested: bool,
    config: &Config,
) -> Result<FileDeliveryPlan, ServerError> {
    let metadata = fs::metadata(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "download".to_string());

    let base_type = content_type_for(path, config);
    let text = is_text_type(&base_type);

    let disposition = if !text || download_requested {
        Disposition::Attachment
    } else {
        Disposition::Inline
    };

    let content_type = match disposition {
        Disposition::Inline => format!("{base_type}; charset=utf-8"),
        Disposition::Attachment => base_type,
    };

    let transcode_from = match disposition {
        Disposition::Inline => {
            detect_file(path, config.detect_sample_size, config.detect_confidence)
                .filter(|guess| !guess.is_utf8())
        }
        Disposition::Attachment => None,
    };

    let filename_primary = safe_filename(&filename);
    let filename_encoded = urlencoding::encode(&filename_primary).into_owned();

    Ok(FileDeliveryPlan {
        content_type,
        disposition,
        filename_primary,
        filename_encoded,
        size_bytes: metadata.len(),
        transcode_from,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // "中文编码测试" in GB2312, repeated for detector confidence.
    fn gbk_bytes() -> Vec<u8> {
        let phrase = [
            0xd6, 0xd0, 0xce, 0xc4, 0xb1, 0xe0, 0xc2, 0xeb, 0xb2, 0xe2, 0xca, 0xd4,
        ];
        phrase.repeat(20)
    }

    #[test]
    fn sizes_use_binary_units_with_one_decimal() {
        assert_eq!(human_size(0), "0.0 B");
        assert_eq!(human_size(2), "2.0 B");
        assert_eq!(human_size(1023), "1023.0 B");
        assert_eq!(human_size(1024), "1.0 KB");
        assert_eq!(human_size(1536), "1.5 KB");
        assert_eq!(human_size(1_048_576), "1.0 MB");
        assert_eq!(human_size(1024u64.pow(4)), "1.0 TB");
        assert_eq!(human_size(1024u64.pow(5)), "1.0 PB");
    }

    #[test]
    fn escape_covers_all_special_characters() {
        assert_eq!(
            html_escape("<a href=\"x\">&'quoted'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;quoted&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn safe_filenames_keep_word_characters_and_cjk() {
        assert_eq!(safe_filename("report (final).txt"), "report_(final).txt");
        assert_eq!(safe_filename("中文文档.txt"), "中文文档.txt");
        assert_eq!(safe_filename("a/b\\c:d*e.txt"), "a_b_c_d_e.txt");
        assert_eq!(safe_filename("naïve-résumé.pdf"), "naïve-résumé.pdf");
    }

    #[test]
    fn hrefs_encode_segments_but_not_separators() {
        assert_eq!(
            encode_href("/sub dir/文件.txt"),
            "/sub%20dir/%E6%96%87%E4%BB%B6.txt"
        );
        assert_eq!(encode_href("/plain/path.txt"), "/plain/path.txt");
    }

    #[test]
    fn scan_sorts_lexicographically_case_sensitive() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("b.txt"), "b").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("Z")).unwrap();

        let entries = scan_directory(dir.path(), &Config::default()).unwrap();
        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Z", "a.txt", "b.txt"]);
        assert!(entries[0].is_dir);
        assert_eq!(entries[1].size, Some(1));
    }

    #[test]
    fn scan_badges_non_utf8_files_only() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("gbk.txt"), gbk_bytes()).unwrap();
        // Multibyte content so the detector reports utf-8 rather than ascii.
        std::fs::write(
            dir.path().join("plain.txt"),
            "utf-8 内容，多字节文本。".repeat(10),
        )
        .unwrap();

        let entries = scan_directory(dir.path(), &Config::default()).unwrap();
        let gbk = entries.iter().find(|e| e.name == "gbk.txt").unwrap();
        let plain = entries.iter().find(|e| e.name == "plain.txt").unwrap();
        assert!(gbk.encoding.is_some());
        assert!(plain.encoding.is_none());
    }

    #[cfg(unix)]
    #[test]
    fn scan_classifies_symlinks_by_their_target() {
        use std::os::unix::fs::symlink;

        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("real")).unwrap();
        std::fs::write(dir.path().join("real/inner.txt"), "x").unwrap();
        symlink(dir.path().join("real"), dir.path().join("linked_dir")).unwrap();
        symlink(
            dir.path().join("real/inner.txt"),
            dir.path().join("linked_file.txt"),
        )
        .unwrap();
        symlink(dir.path().join("absent"), dir.path().join("broken")).unwrap();

        let entries = scan_directory(dir.path(), &Config::default()).unwrap();

        let linked_dir = entries.iter().find(|e| e.name == "linked_dir").unwrap();
        assert!(linked_dir.is_dir);
        assert!(linked_dir.size.is_none());
        assert!(linked_dir.encoding.is_none());

        let linked_file = entries.iter().find(|e| e.name == "linked_file.txt").unwrap();
        assert!(!linked_file.is_dir);
        assert_eq!(linked_file.size, Some(1));

        let broken = entries.iter().find(|e| e.name == "broken").unwrap();
        assert!(!broken.is_dir);
        assert_eq!(broken.size, None);
        assert!(broken.encoding.is_none());
    }

    #[test]
    fn listing_escapes_names_and_encodes_hrefs() {
        let entries = vec![DirectoryEntry {
            name: "a<b> & c.txt".to_string(),
            is_dir: false,
            size: Some(10),
            encoding: None,
        }];
        let html = render_listing("", &entries);
        assert!(html.contains("a&lt;b&gt; &amp; c.txt"));
        assert!(html.contains("href=\"/a%3Cb%3E%20%26%20c.txt\""));
        assert!(html.contains("?download=true"));
    }

    #[test]
    fn listing_parent_link_only_below_the_root() {
        let root = render_listing("", &[]);
        assert!(!root.contains("parent directory"));
        assert!(root.contains("This directory is empty."));

        let one_deep = render_listing("sub", &[]);
        assert!(one_deep.contains("parent directory"));
        assert!(one_deep.contains("href=\"/\""));

        let two_deep = render_listing("sub/inner", &[]);
        assert!(two_deep.contains("href=\"/sub\""));
    }

    #[test]
    fn listing_marks_directories_with_a_slash() {
        let entries = vec![DirectoryEntry {
            name: "docs".to_string(),
            is_dir: true,
            size: None,
            encoding: None,
        }];
        let html = render_listing("", &entries);
        assert!(html.contains(">docs/</a>"));
        assert!(!html.contains("download=true"));
    }

    #[test]
    fn content_types_come_from_overrides_then_mime_table() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();

        for (name, expected) in [
            ("page.html", "text/html"),
            ("notes.txt", "text/plain"),
            ("data.json", "application/json"),
            ("feed.xml", "application/xml"),
            ("style.css", "text/css"),
            ("app.js", "application/javascript"),
            ("readme.md", "text/markdown"),
            ("UPPER.XML", "application/xml"),
            ("archive.bin", "application/octet-stream"),
        ] {
            let path = dir.path().join(name);
            std::fs::write(&path, "x").unwrap();
            let plan = plan_delivery(&path, false, &config).unwrap();
            assert!(
                plan.content_type.starts_with(expected),
                "{name}: got {}",
                plan.content_type
            );
        }
    }

    #[test]
    fn configured_overrides_reach_extensions_unknown_to_the_mime_table() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.changelog");
        std::fs::write(&path, "1.0 initial release").unwrap();

        let mut config = Config::default();
        config
            .mime_overrides
            .insert(".changelog".to_string(), "text/plain".to_string());

        // Without the override this extension would fall through to
        // application/octet-stream and flip to an attachment.
        let plan = plan_delivery(&path, false, &config).unwrap();
        assert_eq!(plan.disposition, Disposition::Inline);
        assert_eq!(plan.content_type, "text/plain; charset=utf-8");
    }

    #[test]
    fn text_files_are_inline_with_charset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain text").unwrap();

        let plan = plan_delivery(&path, false, &Config::default()).unwrap();
        assert_eq!(plan.disposition, Disposition::Inline);
        assert_eq!(plan.content_type, "text/plain; charset=utf-8");
        assert_eq!(plan.size_bytes, 10);
    }

    #[test]
    fn utf8_text_plans_no_transcoding() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "utf-8 文本内容，多字节。".repeat(5)).unwrap();

        let plan = plan_delivery(&path, false, &Config::default()).unwrap();
        assert!(plan.transcode_from.is_none());
    }

    #[test]
    fn ascii_text_plans_an_identity_transcode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "pure ascii text, single byte all the way").unwrap();

        // The detector labels pure ASCII as `ascii`, which is not UTF-8,
        // so the plan carries a guess. Decoding ASCII bytes through it is
        // an identity mapping; the delivery tests check that end to end.
        let plan = plan_delivery(&path, false, &Config::default()).unwrap();
        let guess = plan.transcode_from.expect("ascii should produce a guess");
        assert!(!guess.is_utf8());
    }

    #[test]
    fn download_flag_forces_attachment_for_text() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain text").unwrap();

        let plan = plan_delivery(&path, true, &Config::default()).unwrap();
        assert_eq!(plan.disposition, Disposition::Attachment);
        assert_eq!(plan.content_type, "text/plain");
        assert!(plan.transcode_from.is_none());
    }

    #[test]
    fn binary_files_are_attachments_regardless_of_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("image.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

        let plan = plan_delivery(&path, false, &Config::default()).unwrap();
        assert_eq!(plan.disposition, Disposition::Attachment);
        assert_eq!(plan.content_type, "image/png");
    }

    #[test]
    fn attachment_filenames_come_in_plain_and_encoded_forms() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("中文 文档.md");
        std::fs::write(&path, "# heading").unwrap();

        let plan = plan_delivery(&path, true, &Config::default()).unwrap();
        assert_eq!(plan.filename_primary, "中文_文档.md");
        assert_eq!(
            plan.filename_encoded,
            "%E4%B8%AD%E6%96%87_%E6%96%87%E6%A1%A3.md"
        );
    }

    #[test]
    fn inline_gbk_text_requests_transcoding() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gbk.txt");
        std::fs::write(&path, gbk_bytes()).unwrap();

        let plan = plan_delivery(&path, false, &Config::default()).unwrap();
        assert_eq!(plan.disposition, Disposition::Inline);
        let guess = plan.transcode_from.expect("expected an encoding guess");
        assert!(!guess.is_utf8());
    }

    #[test]
    fn downloaded_gbk_text_is_never_transcoded() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gbk.txt");
        std::fs::write(&path, gbk_bytes()).unwrap();

        let plan = plan_delivery(&path, true, &Config::default()).unwrap();
        assert!(plan.transcode_from.is_none());
    }

    #[test]
    fn missing_files_surface_an_io_error() {
        let dir = TempDir::new().unwrap();
        let result = plan_delivery(&dir.path().join("absent.txt"), false, &Config::default());
        assert!(result.is_err());
    }
}
