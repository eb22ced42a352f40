//! Source-specific content normalizers (text, web page, PDF).
//!
//! Each normalizer turns raw input into the markdown-formatted content
//! string persisted as a resource. Acquisition/parsing failures are
//! classified by [`IngestError`]; validation of empty content happens in
//! the resource store, before any side effect.

use scraper::{ElementRef, Html, Selector};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

/// Source acquisition or parsing failure.
#[derive(Debug)]
pub enum IngestError {
    /// All fetch attempts for a URL failed; carries the last error.
    FetchFailed(String),
    /// The document could not be parsed or yielded no usable text.
    UnreadableDocument(String),
    /// The document declares a character encoding we cannot decode.
    EncodingUnrecognized(String),
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::FetchFailed(e) => write!(f, "fetch failed: {}", e),
            IngestError::UnreadableDocument(e) => write!(f, "unreadable document: {}", e),
            IngestError::EncodingUnrecognized(enc) => {
                write!(f, "unrecognized character encoding: {}", enc)
            }
        }
    }
}

impl std::error::Error for IngestError {}

/// Normalize raw text input. Identity — the text itself is the body.
pub fn normalize_text(content: &str) -> String {
    content.trim().to_string()
}

/// Normalize a fetched web page into markdown content.
///
/// Verifies the in-document charset declaration, strips non-content
/// elements (scripts, styles, navigation, cookie banners, ads), extracts
/// the body text and title, collapses whitespace, and NFC-normalizes
/// composed characters. Output shape: `# {title}\n\nURL: {url}\n\n{body}`.
pub fn normalize_html(
    url: &str,
    fallback_title: &str,
    html: &str,
) -> Result<String, IngestError> {
    if let Some(label) = declared_charset(html) {
        if !charset_supported(&label) {
            return Err(IngestError::EncodingUnrecognized(label));
        }
    }

    let document = Html::parse_document(html);

    let title_sel = Selector::parse("title").expect("static selector");
    let title = document
        .select(&title_sel)
        .next()
        .map(|el| el.text().collect::<String>())
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| fallback_title.to_string());

    let body_sel = Selector::parse("body").expect("static selector");
    let mut raw = String::new();
    let root = document
        .select(&body_sel)
        .next()
        .unwrap_or_else(|| document.root_element());
    collect_text(root, &mut raw);

    let body: String = raw
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .nfc()
        .collect();

    if body.is_empty() {
        return Err(IngestError::UnreadableDocument(
            "page contains no extractable text".to_string(),
        ));
    }

    Ok(format!("# {}\n\nURL: {}\n\n{}", title, url, body))
}

/// Normalize a PDF into markdown content plus a generated source id.
///
/// The uploaded filename (minus extension) becomes the title; the source
/// id is the hex SHA-256 of the raw bytes, giving repeated uploads of the
/// same file a stable identity.
pub fn normalize_pdf(bytes: &[u8], filename: &str) -> Result<(String, String), IngestError> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| IngestError::UnreadableDocument(e.to_string()))?;

    let text = text.trim();
    if text.is_empty() {
        return Err(IngestError::UnreadableDocument(
            "PDF yielded no usable text".to_string(),
        ));
    }

    let title = title_from_filename(filename);
    let content = format!("# {}\n\n{}", title, text);

    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let source_id = format!("{:x}", hasher.finalize());

    Ok((content, source_id))
}

fn title_from_filename(filename: &str) -> String {
    match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => filename.to_string(),
    }
}

/// Tags that never carry document content.
const NOISE_TAGS: &[&str] = &[
    "script", "style", "nav", "header", "footer", "iframe", "noscript",
];

/// Class/id substrings marking boilerplate (cookie banners, ad slots).
const NOISE_MARKERS: &[&str] = &["cookie", "banner", "ads", "advert"];

fn collect_text(el: ElementRef<'_>, out: &mut String) {
    for child in el.children() {
        if let Some(text) = child.value().as_text() {
            out.push_str(text);
            out.push(' ');
        } else if let Some(child_el) = ElementRef::wrap(child) {
            if is_noise_element(child_el.value()) {
                continue;
            }
            collect_text(child_el, out);
        }
    }
}

fn is_noise_element(el: &scraper::node::Element) -> bool {
    let tag = el.name();
    if NOISE_TAGS.contains(&tag) {
        return true;
    }
    for attr in ["class", "id"] {
        if let Some(value) = el.attr(attr) {
            let value = value.to_ascii_lowercase();
            if NOISE_MARKERS.iter().any(|m| value.contains(m)) {
                return true;
            }
        }
    }
    false
}

/// Charset declared via `<meta charset>` or a content-type `<meta>` tag.
fn declared_charset(html: &str) -> Option<String> {
    let lower = html.to_ascii_lowercase();

    if let Some(pos) = lower.find("<meta charset=") {
        let rest = &lower[pos + "<meta charset=".len()..];
        let rest = rest.trim_start_matches(['"', '\'']);
        let end = rest.find(['"', '\'', '>', ' '])?;
        return Some(rest[..end].trim().to_string());
    }

    if let Some(pos) = lower.find("charset=") {
        // Only honor it inside a content-type meta declaration.
        let before = &lower[..pos];
        if before.rfind("<meta").is_some() && before.rfind("http-equiv").is_some() {
            let rest = &lower[pos + "charset=".len()..];
            let end = rest.find(['"', '\'', '>', ';', ' '])?;
            return Some(rest[..end].trim().to_string());
        }
    }

    None
}

fn charset_supported(label: &str) -> bool {
    matches!(
        label,
        "utf-8" | "utf8" | "us-ascii" | "ascii" | "iso-8859-1" | "latin1" | "windows-1252"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_normalizer_is_identity_modulo_trim() {
        assert_eq!(normalize_text("  hello world \n"), "hello world");
    }

    #[test]
    fn html_strips_scripts_styles_and_cookie_banners() {
        let html = r#"<html><head><title>Leave Policy</title>
            <script>alert(1)</script><style>body{}</style></head>
            <body>
              <nav>Home | About</nav>
              <div class="cookie-consent">We use cookies</div>
              <div id="ads-slot">Buy now</div>
              <p>Employees are entitled to 30 days of paid leave.</p>
              <footer>Copyright</footer>
            </body></html>"#;
        let content = normalize_html("https://example.com/policy", "fallback", html).unwrap();
        assert!(content.starts_with("# Leave Policy\n\nURL: https://example.com/policy\n\n"));
        assert!(content.contains("30 days of paid leave"));
        assert!(!content.contains("alert"));
        assert!(!content.contains("cookies"));
        assert!(!content.contains("Buy now"));
        assert!(!content.contains("Home | About"));
        assert!(!content.contains("Copyright"));
    }

    #[test]
    fn html_falls_back_to_stored_title() {
        let html = "<html><body><p>Some body text here.</p></body></html>";
        let content = normalize_html("https://example.com", "Stored Title", html).unwrap();
        assert!(content.starts_with("# Stored Title\n"));
    }

    #[test]
    fn html_collapses_whitespace_runs() {
        let html = "<html><body><p>a   b\n\n\nc</p></body></html>";
        let content = normalize_html("https://x.test", "t", html).unwrap();
        assert!(content.ends_with("a b c"));
    }

    #[test]
    fn html_normalizes_to_nfc() {
        // "e" + combining acute accent must come out as the composed "é".
        let html = "<html><body><p>f\u{0065}\u{0301}rias remuneradas</p></body></html>";
        let content = normalize_html("https://x.test", "t", html).unwrap();
        assert!(content.contains("férias"));
    }

    #[test]
    fn html_unrecognized_charset_is_rejected() {
        let html = r#"<html><head><meta charset="shift_jis"></head><body>x</body></html>"#;
        let err = normalize_html("https://x.test", "t", html).unwrap_err();
        assert!(matches!(err, IngestError::EncodingUnrecognized(_)));
    }

    #[test]
    fn html_utf8_charset_accepted() {
        let html = r#"<html><head><meta charset="utf-8"></head><body><p>ok</p></body></html>"#;
        assert!(normalize_html("https://x.test", "t", html).is_ok());
    }

    #[test]
    fn html_without_text_is_unreadable() {
        let html = "<html><body><script>only()</script></body></html>";
        let err = normalize_html("https://x.test", "t", html).unwrap_err();
        assert!(matches!(err, IngestError::UnreadableDocument(_)));
    }

    #[test]
    fn pdf_invalid_bytes_are_unreadable() {
        let err = normalize_pdf(b"not a pdf", "doc.pdf").unwrap_err();
        assert!(matches!(err, IngestError::UnreadableDocument(_)));
    }

    #[test]
    fn pdf_title_drops_extension() {
        assert_eq!(title_from_filename("employee-handbook.pdf"), "employee-handbook");
        assert_eq!(title_from_filename("noextension"), "noextension");
        assert_eq!(title_from_filename(".hidden"), ".hidden");
    }

    #[test]
    fn declared_charset_variants() {
        assert_eq!(
            declared_charset(r#"<meta charset="UTF-8">"#).as_deref(),
            Some("utf-8")
        );
        assert_eq!(
            declared_charset(
                r#"<meta http-equiv="content-type" content="text/html; charset=iso-8859-1">"#
            )
            .as_deref(),
            Some("iso-8859-1")
        );
        assert_eq!(declared_charset("<html><body></body></html>"), None);
    }
}
