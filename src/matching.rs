/// Case-insensitive text and domain hierarchy helpers shared by every leaf predicate
pub struct TextMatch;

impl TextMatch {
    /// Normalize a value for comparison
    pub fn fold(value: &str) -> String {
        value.to_lowercase()
    }

    pub fn equals(haystack: &str, expected: &str) -> bool {
        Self::fold(haystack) == Self::fold(expected)
    }

    pub fn contains(haystack: &str, needle: &str) -> bool {
        Self::fold(haystack).contains(&Self::fold(needle))
    }

    /// Check if host is the suffix itself or one of its subdomains
    /// Examples:
    /// - is_domain_suffix("aspmx.l.google.com", "google.com") -> true
    /// - is_domain_suffix("google.com", "google.com") -> true
    /// - is_domain_suffix("notgoogle.com", "google.com") -> false
    pub fn is_domain_suffix(host: &str, suffix: &str) -> bool {
        let host_lower = Self::fold(host);
        let suffix_lower = Self::fold(suffix);

        if host_lower == suffix_lower {
            return true;
        }

        host_lower.ends_with(&format!(".{suffix_lower}"))
    }

    /// Check if any host in the list matches the suffix (with hierarchy support)
    pub fn any_domain_suffix(hosts: &[String], suffix: &str) -> bool {
        hosts.iter().any(|host| Self::is_domain_suffix(host, suffix))
    }
}
