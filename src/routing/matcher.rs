//! Path matching primitives.
//!
//! # Responsibilities
//! - Match a path against a route prefix on segment boundaries
//! - Compile path templates (`/catalog/products/:id/image`) once at startup
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - A prefix only matches whole segments: `/cart` matches `/cart` and
//!   `/cart/items`, never `/cartography`
//! - No regex to guarantee O(n) matching

/// Matches the request path against a route prefix.
#[derive(Debug, Clone)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// True if `path == prefix` or `path` starts with `prefix + "/"`.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// The part of `path` after the prefix, always starting with `/`.
    pub fn remainder<'a>(&self, path: &'a str) -> &'a str {
        if self.prefix == "/" {
            return path;
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) if !rest.is_empty() => rest,
            _ => "/",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    /// `:name` placeholder, matches any single non-empty segment.
    Any,
}

/// A compiled path template where `:name` segments match any single segment.
#[derive(Debug, Clone)]
pub struct PathTemplate {
    segments: Vec<Segment>,
}

impl PathTemplate {
    pub fn compile(template: &str) -> Self {
        let segments = template
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if s.starts_with(':') {
                    Segment::Any
                } else {
                    Segment::Literal(s.to_string())
                }
            })
            .collect();
        Self { segments }
    }

    /// Exact match: same number of segments, literals equal.
    pub fn matches(&self, path: &str) -> bool {
        let mut parts = path.split('/').skip(1);
        for segment in &self.segments {
            match (segment, parts.next()) {
                (_, None) => return false,
                (_, Some("")) => return false,
                (Segment::Any, Some(_)) => {}
                (Segment::Literal(lit), Some(part)) if lit == part => {}
                _ => return false,
            }
        }
        // Tolerate a single trailing slash.
        match parts.next() {
            None => true,
            Some("") => parts.next().is_none(),
            Some(_) => false,
        }
    }
}

/// A set of compiled templates; matches if any template does.
#[derive(Debug, Clone, Default)]
pub struct TemplateSet {
    templates: Vec<PathTemplate>,
}

impl TemplateSet {
    pub fn compile<I, S>(templates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            templates: templates
                .into_iter()
                .map(|t| PathTemplate::compile(t.as_ref()))
                .collect(),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        self.templates.iter().any(|t| t.matches(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_path_matcher() {
        let matcher = PathPrefixMatcher::new("/cart");

        assert!(matcher.matches("/cart"));
        assert!(matcher.matches("/cart/items/1"));
        assert!(!matcher.matches("/cartography"));
        assert!(!matcher.matches("/catalog"));

        assert_eq!(matcher.remainder("/cart/items"), "/items");
        assert_eq!(matcher.remainder("/cart"), "/");
    }

    #[test]
    fn test_root_prefix_matches_everything() {
        let matcher = PathPrefixMatcher::new("/");
        assert!(matcher.matches("/anything/at/all"));
        assert_eq!(matcher.remainder("/x"), "/x");
    }

    #[test]
    fn test_template_placeholders() {
        let template = PathTemplate::compile("/catalog/products/:productId/image");

        assert!(template.matches("/catalog/products/42/image"));
        assert!(template.matches("/catalog/products/abc/image/"));
        assert!(!template.matches("/catalog/products//image"));
        assert!(!template.matches("/catalog/products/42"));
        assert!(!template.matches("/catalog/products/42/image/extra"));
        assert!(!template.matches("/catalog/products/4/2/image"));
    }

    #[test]
    fn test_template_set() {
        let set = TemplateSet::compile(["/auth/refresh", "/health"]);
        assert!(set.matches("/auth/refresh"));
        assert!(set.matches("/health"));
        assert!(!set.matches("/auth/refresh/now"));
        assert!(!set.matches("/auth"));
    }
}
