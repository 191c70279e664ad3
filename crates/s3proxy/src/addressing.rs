//! Addressing Parser.
//!
//! Decides whether an inbound request used path-style or virtual-hosted-style
//! S3 addressing and extracts `(bucket, key)` from the host header and path.

/// Addressing style an inbound request used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Style {
    Path,
    VirtualHosted,
}

/// Result of parsing an inbound `(host, path)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Addressing {
    pub bucket: String,
    pub key: String,
    pub style: Style,
}

impl Addressing {
    /// An empty bucket token means this isn't an S3 object request — the
    /// dispatcher must still forward it, but must not spawn inventory or
    /// mirror work for it.
    pub fn is_object_request(&self) -> bool {
        !self.bucket.is_empty()
    }
}

/// Parse `(host, path)` into `(bucket, key, style)`.
///
/// `host` may carry a `:port` suffix (stripped before classification, since
/// `proxy_domain` is configured without one). Classification order:
/// 1. `host == proxy_domain` → path-style.
/// 2. `host` ends with `.proxy_domain` → virtual-hosted.
/// 3. No `proxy_domain` match but `host` has ≥2 dot-separated labels →
///    virtual-hosted (bucket = first label).
/// 4. Otherwise → path-style.
pub fn parse_addressing(host: &str, path: &str, proxy_domain: Option<&str>) -> Addressing {
    let host = strip_port(host);

    if let Some(domain) = proxy_domain {
        if host == domain {
            return path_style(path);
        }
        let suffix = format!(".{domain}");
        if let Some(bucket) = host.strip_suffix(&suffix) {
            return Addressing {
                bucket: bucket.to_string(),
                key: strip_leading_slash(path).to_string(),
                style: Style::VirtualHosted,
            };
        }
    }

    if host.split('.').count() >= 2 {
        let bucket = host.split('.').next().unwrap_or("").to_string();
        return Addressing {
            bucket,
            key: strip_leading_slash(path).to_string(),
            style: Style::VirtualHosted,
        };
    }

    path_style(path)
}

fn path_style(path: &str) -> Addressing {
    let stripped = strip_leading_slash(path);
    match stripped.find('/') {
        Some(idx) => Addressing {
            bucket: stripped[..idx].to_string(),
            key: stripped[idx + 1..].to_string(),
            style: Style::Path,
        },
        None => Addressing {
            bucket: stripped.to_string(),
            key: String::new(),
            style: Style::Path,
        },
    }
}

fn strip_port(host: &str) -> &str {
    host.split(':').next().unwrap_or(host)
}

fn strip_leading_slash(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_style_bucket_and_key() {
        let a = parse_addressing("s3.internal:8080", "/my-data/a/b.txt", None);
        assert_eq!(a.style, Style::Path);
        assert_eq!(a.bucket, "my-data");
        assert_eq!(a.key, "a/b.txt");
    }

    #[test]
    fn test_path_style_no_key() {
        let a = parse_addressing("s3.internal", "/my-data", None);
        assert_eq!(a.style, Style::Path);
        assert_eq!(a.bucket, "my-data");
        assert_eq!(a.key, "");
    }

    #[test]
    fn test_path_style_root() {
        let a = parse_addressing("s3.internal", "/", None);
        assert_eq!(a.style, Style::Path);
        assert_eq!(a.bucket, "");
        assert_eq!(a.key, "");
        assert!(!a.is_object_request());
    }

    #[test]
    fn test_proxy_domain_exact_match_is_path_style() {
        let a = parse_addressing("proxy:8080", "/my-data/a/b.txt", Some("proxy"));
        assert_eq!(a.style, Style::Path);
        assert_eq!(a.bucket, "my-data");
        assert_eq!(a.key, "a/b.txt");
    }

    #[test]
    fn test_proxy_domain_suffix_is_virtual_hosted() {
        let a = parse_addressing("my-data.s3.local", "/a/b.txt", Some("s3.local"));
        assert_eq!(a.style, Style::VirtualHosted);
        assert_eq!(a.bucket, "my-data");
        assert_eq!(a.key, "a/b.txt");
    }

    #[test]
    fn test_proxy_domain_suffix_root_path_yields_empty_key() {
        let a = parse_addressing("my-data.s3.local", "/", Some("s3.local"));
        assert_eq!(a.style, Style::VirtualHosted);
        assert_eq!(a.bucket, "my-data");
        assert_eq!(a.key, "");
    }

    #[test]
    fn test_no_proxy_domain_multi_label_host_is_virtual_hosted() {
        let a = parse_addressing("my-data.s3.amazonaws.com", "/a/b.txt", None);
        assert_eq!(a.style, Style::VirtualHosted);
        assert_eq!(a.bucket, "my-data");
        assert_eq!(a.key, "a/b.txt");
    }

    #[test]
    fn test_no_proxy_domain_single_label_host_is_path_style() {
        let a = parse_addressing("localhost:9000", "/my-data/a/b.txt", None);
        assert_eq!(a.style, Style::Path);
        assert_eq!(a.bucket, "my-data");
        assert_eq!(a.key, "a/b.txt");
    }

    #[test]
    fn test_proxy_domain_configured_but_host_unrelated_falls_through_to_rule_3() {
        // host doesn't match proxy_domain or its suffix, but has ≥2 labels.
        let a = parse_addressing("my-data.s3.amazonaws.com", "/a/b.txt", Some("proxy.internal"));
        assert_eq!(a.style, Style::VirtualHosted);
        assert_eq!(a.bucket, "my-data");
    }
}
