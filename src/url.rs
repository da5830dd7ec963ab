/// Turns page URLs into note keys.
///
/// Everything from the first `?` on is dropped so a note survives navigations
/// that only change the query string. The trailing `/` is dropped too unless
/// the normalizer was built with `keep_trailing_slash`; a run of slashes is
/// dropped as a whole so that normalizing twice changes nothing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UrlNormalizer {
    strip_trailing_slash: bool,
}

impl Default for UrlNormalizer {
    fn default() -> Self {
        Self {
            strip_trailing_slash: true,
        }
    }
}

impl UrlNormalizer {
    pub fn new(strip_trailing_slash: bool) -> Self {
        Self {
            strip_trailing_slash,
        }
    }

    pub fn keep_trailing_slash() -> Self {
        Self::new(false)
    }

    pub fn normalize(&self, raw: &str) -> String {
        let without_query = raw.split_once('?').map_or(raw, |(path, _)| path);
        let key = if self.strip_trailing_slash {
            without_query.trim_end_matches('/')
        } else {
            without_query
        };
        key.to_string()
    }

    /// Like [`normalize`](Self::normalize) but accepts a missing URL, which
    /// maps to the empty key.
    pub fn normalize_opt(&self, raw: Option<&str>) -> String {
        raw.map(|url| self.normalize(url)).unwrap_or_default()
    }
}

/// Normalizes with the default rules (query and trailing slash stripped).
pub fn normalize_url(raw: &str) -> String {
    UrlNormalizer::default().normalize(raw)
}
