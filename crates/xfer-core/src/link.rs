//! Public link composition and download-path parsing.
//!
//! A public link has the shape `{domain}/{key}/{filename}`. The download side
//! receives the `{key}/{filename}` tail and must split it back apart; the
//! filename segment is cosmetic and never consulted for lookup.

use url::Url;

use crate::error::TransferError;
use crate::key::TransferKey;

/// Longest filename accepted at upload, in bytes.
pub const MAX_FILENAME_BYTES: usize = 255;

/// Validate a filename supplied at upload.
pub fn validate_filename(filename: &str) -> Result<(), TransferError> {
    if filename.is_empty() {
        return Err(TransferError::MalformedInput("filename is empty".into()));
    }
    if filename.len() > MAX_FILENAME_BYTES {
        return Err(TransferError::MalformedInput(format!(
            "filename is {} bytes (max {MAX_FILENAME_BYTES})",
            filename.len()
        )));
    }
    if filename.starts_with('/') || filename.ends_with('/') {
        return Err(TransferError::MalformedInput(
            "filename has a leading or trailing '/'".into(),
        ));
    }
    if filename.chars().any(char::is_control) {
        return Err(TransferError::MalformedInput(
            "filename contains control characters".into(),
        ));
    }
    Ok(())
}

/// `Content-Disposition` value that suggests `filename` to the downloader.
pub fn content_disposition(filename: &str) -> String {
    let mut escaped = String::with_capacity(filename.len());
    for c in filename.chars() {
        if c == '"' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    format!("attachment; filename=\"{escaped}\"")
}

/// Compose the public link handed back to the uploader.
///
/// Each `/`-separated piece of the filename becomes one percent-encoded path
/// segment, so names with spaces, `#` or `?` still yield a valid URL.
pub fn compose_link(domain: &Url, key: &TransferKey, filename: &str) -> String {
    let mut link = domain.clone();
    link.set_query(None);
    link.set_fragment(None);
    match link.path_segments_mut() {
        Ok(mut segments) => {
            segments
                .pop_if_empty()
                .push(key.as_str())
                .extend(filename.split('/'));
        }
        // Cannot-be-a-base domains are refused by `TransferConfig::validate`.
        Err(()) => {
            return format!(
                "{}/{}/{}",
                domain.as_str().trim_end_matches('/'),
                key,
                filename
            )
        }
    }
    link.into()
}

/// A parsed `{key}/{filename}` download path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadPath {
    /// The transfer key.
    pub key: TransferKey,
    /// The cosmetic filename segment (may itself contain '/').
    pub filename: String,
}

impl DownloadPath {
    /// Split a download path into key and filename.
    ///
    /// Anything that does not decompose into exactly two non-empty segments,
    /// or whose key segment is not a well-formed key, is
    /// [`TransferError::MalformedInput`].
    pub fn parse(path: &str) -> Result<Self, TransferError> {
        let path = path.strip_prefix('/').unwrap_or(path);
        let (key, filename) = path
            .split_once('/')
            .ok_or_else(|| TransferError::MalformedInput("missing filename segment".into()))?;
        if key.is_empty() || filename.is_empty() {
            return Err(TransferError::MalformedInput("empty path segment".into()));
        }
        let key = TransferKey::parse(key)
            .map_err(|e| TransferError::MalformedInput(e.to_string()))?;
        Ok(Self {
            key,
            filename: filename.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_link_matches_public_shape() {
        let domain = Url::parse("https://example.com").unwrap();
        let key = TransferKey::parse("a1b2c3d4e5").unwrap();
        assert_eq!(
            compose_link(&domain, &key, "report.pdf"),
            "https://example.com/a1b2c3d4e5/report.pdf"
        );
    }

    #[test]
    fn compose_link_keeps_domain_path_prefix() {
        let domain = Url::parse("https://example.com/t/").unwrap();
        let key = TransferKey::parse("ab").unwrap();
        assert_eq!(compose_link(&domain, &key, "x"), "https://example.com/t/ab/x");
    }

    #[test]
    fn compose_link_percent_encodes_filename() {
        let domain = Url::parse("https://example.com").unwrap();
        let key = TransferKey::parse("ab").unwrap();
        let link = compose_link(&domain, &key, "a b#1?.txt");
        assert_eq!(link, "https://example.com/ab/a%20b%231%3F.txt");
        assert!(Url::parse(&link).unwrap().fragment().is_none());

        let nested = compose_link(&domain, &key, "dir/100%.txt");
        assert_eq!(nested, "https://example.com/ab/dir/100%25.txt");
    }

    #[test]
    fn parse_splits_on_first_slash() {
        let p = DownloadPath::parse("a1b2c3d4e5/dir/report.pdf").unwrap();
        assert_eq!(p.key.as_str(), "a1b2c3d4e5");
        assert_eq!(p.filename, "dir/report.pdf");
    }

    #[test]
    fn parse_tolerates_leading_slash() {
        let p = DownloadPath::parse("/a1b2c3d4e5/report.pdf").unwrap();
        assert_eq!(p.filename, "report.pdf");
    }

    #[test]
    fn parse_rejects_malformed_paths() {
        for path in ["", "a1b2c3d4e5", "a1b2c3d4e5/", "/report.pdf", "zz/report.pdf"] {
            let err = DownloadPath::parse(path).unwrap_err();
            assert!(
                matches!(err, TransferError::MalformedInput(_)),
                "{path:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn filename_validation() {
        assert!(validate_filename("report.pdf").is_ok());
        assert!(validate_filename("nested/report.pdf").is_ok());
        assert!(validate_filename("").is_err());
        assert!(validate_filename("/abs").is_err());
        assert!(validate_filename("dir/").is_err());
        assert!(validate_filename("bad\nname").is_err());
        assert!(validate_filename(&"x".repeat(MAX_FILENAME_BYTES + 1)).is_err());
    }

    #[test]
    fn content_disposition_escapes_quotes() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
        assert_eq!(
            content_disposition("a\"b\\c"),
            "attachment; filename=\"a\\\"b\\\\c\""
        );
    }
}
