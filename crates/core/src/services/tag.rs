//! Tag service.

use std::sync::LazyLock;

use regex::Regex;
use stackit_common::{AppError, AppResult};
use stackit_db::{entities::tag, repositories::TagRepository};

/// Maximum tags on one question.
pub const MAX_TAGS: usize = 5;
/// Maximum length of a tag name.
pub const MAX_TAG_LEN: usize = 32;

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9+#.\-]+$").expect("tag pattern is valid"));

/// Normalize one tag name: trimmed and lowercased.
pub fn normalize_tag(raw: &str) -> AppResult<String> {
    let name = raw.trim().to_lowercase();
    if name.is_empty() || name.chars().count() > MAX_TAG_LEN {
        return Err(AppError::InvalidArgument(format!(
            "Tags must be 1-{MAX_TAG_LEN} characters"
        )));
    }
    if !TAG_RE.is_match(&name) {
        return Err(AppError::InvalidArgument(format!(
            "Tag '{name}' may only contain a-z, 0-9, '+', '#', '.' and '-'"
        )));
    }
    Ok(name)
}

/// Normalize a question's tags, collapsing duplicates and keeping order.
pub fn normalize_tags(raw: &[String]) -> AppResult<Vec<String>> {
    let mut tags: Vec<String> = Vec::with_capacity(raw.len());
    for name in raw {
        let name = normalize_tag(name)?;
        if !tags.contains(&name) {
            tags.push(name);
        }
    }
    if tags.is_empty() {
        return Err(AppError::InvalidArgument(
            "At least one tag is required".to_string(),
        ));
    }
    if tags.len() > MAX_TAGS {
        return Err(AppError::InvalidArgument(format!(
            "A question can have at most {MAX_TAGS} tags"
        )));
    }
    Ok(tags)
}

/// Tag service for business logic.
#[derive(Clone)]
pub struct TagService {
    tag_repo: TagRepository,
}

impl TagService {
    /// Create a new tag service.
    #[must_use]
    pub const fn new(tag_repo: TagRepository) -> Self {
        Self { tag_repo }
    }

    /// Every tag by question count, then name.
    pub async fn list(&self) -> AppResult<Vec<tag::Model>> {
        self.tag_repo.find_popular(10_000).await
    }

    /// The most used tags.
    pub async fn popular(&self, limit: u64) -> AppResult<Vec<tag::Model>> {
        self.tag_repo.find_popular(limit.clamp(1, 100)).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags_lowercases_and_dedupes() {
        let raw = vec![" Rust ".to_string(), "rust".to_string(), "C++".to_string()];
        assert_eq!(normalize_tags(&raw).unwrap(), vec!["rust", "c++"]);
    }

    #[test]
    fn test_normalize_tags_limits() {
        let six: Vec<String> = (0..6).map(|i| format!("t{i}")).collect();
        assert!(matches!(
            normalize_tags(&six),
            Err(AppError::InvalidArgument(_))
        ));
        assert!(normalize_tags(&[]).is_err());
        assert!(normalize_tags(&["   ".to_string()]).is_err());
    }

    #[test]
    fn test_normalize_tag_charset() {
        assert_eq!(normalize_tag("C#").unwrap(), "c#");
        assert_eq!(normalize_tag("node.js").unwrap(), "node.js");
        assert!(normalize_tag("two words").is_err());
        assert!(normalize_tag(&"x".repeat(33)).is_err());
    }
}
