use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use std::path::Path;

/// Name used when the upload carries no usable filename.
pub const FALLBACK_FILENAME: &str = "unnamed";

/// Reduces a caller supplied filename to its last path component with control
/// characters and path separators removed.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or("");
    let name = Path::new(base)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let sanitized: String = name.chars().filter(|c| !c.is_control()).collect();
    let sanitized = sanitized.trim();

    if sanitized.is_empty() || sanitized == "." || sanitized == ".." {
        return FALLBACK_FILENAME.to_string();
    }

    // Limit length safely for UTF-8
    if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        return sanitized[..end].to_string();
    }

    sanitized.to_string()
}

/// `attachment` disposition with an ASCII fallback and an RFC 5987 encoded name.
pub fn attachment_disposition(filename: &str) -> String {
    let ascii_filename = filename
        .chars()
        .filter(|c| c.is_ascii() && !c.is_control() && *c != '"' && *c != '\\' && *c != ';')
        .collect::<String>();
    let fallback_filename = if ascii_filename.is_empty() {
        "file"
    } else {
        &ascii_filename
    };

    let encoded_filename = utf8_percent_encode(filename, NON_ALPHANUMERIC).to_string();

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback_filename, encoded_filename
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_keeps_plain_names() {
        assert_eq!(sanitize_filename("report.pdf"), "report.pdf");
        assert_eq!(sanitize_filename("report.pdf.encrypted"), "report.pdf.encrypted");
        assert_eq!(sanitize_filename("résumé 2024.docx"), "résumé 2024.docx");
    }

    #[test]
    fn test_sanitize_strips_directories() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\Users\\me\\secret.txt"), "secret.txt");
        assert_eq!(sanitize_filename("dir/"), FALLBACK_FILENAME);
    }

    #[test]
    fn test_sanitize_falls_back_for_empty_names() {
        assert_eq!(sanitize_filename(""), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename(".."), FALLBACK_FILENAME);
        assert_eq!(sanitize_filename("\r\n"), FALLBACK_FILENAME);
    }

    #[test]
    fn test_sanitize_removes_control_characters() {
        assert_eq!(sanitize_filename("evil\r\nname.txt"), "evilname.txt");
    }

    #[test]
    fn test_sanitize_truncates_long_names() {
        let long = "é".repeat(200);
        let sanitized = sanitize_filename(&long);
        assert!(sanitized.len() <= 255);
        assert!(sanitized.chars().all(|c| c == 'é'));
    }

    #[test]
    fn test_attachment_disposition() {
        assert_eq!(
            attachment_disposition("report.pdf.encrypted"),
            "attachment; filename=\"report.pdf.encrypted\"; filename*=UTF-8''report%2Epdf%2Eencrypted"
        );
    }

    #[test]
    fn test_attachment_disposition_escapes_quotes_and_unicode() {
        let header = attachment_disposition("a\"b;ü.txt");
        assert!(header.starts_with("attachment; filename=\"ab.txt\";"));
        assert!(header.ends_with("filename*=UTF-8''a%22b%3B%C3%BC%2Etxt"));
        assert_eq!(
            attachment_disposition("ü"),
            "attachment; filename=\"file\"; filename*=UTF-8''%C3%BC"
        );
    }
}
