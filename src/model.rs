//! Canonical data model for Blogger content.
//!
//! Shapes mirror the Blogger v3 JSON payloads; the API adapter deserializes
//! into these directly and the exporter and renderer consume them as the
//! single source of truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One blog, as returned by `blogs/{blogId}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blog {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub posts: BlogPostCounts,
}

/// Post counts nested under `posts` in the blog payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlogPostCounts {
    #[serde(rename = "totalItems", default)]
    pub total_items: u64,
}

/// One post. Immutable, externally sourced; `content` is the raw HTML body
/// as served by the API, with image URLs still pointing at Blogger hosting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default)]
    pub published: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: Option<Author>,
}

fn default_title() -> String {
    "No Title".to_string()
}

/// Post author; only the display name is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Author {
    #[serde(rename = "displayName", default)]
    pub display_name: Option<String>,
}

/// One page of the paginated post list (`blogs/{blogId}/posts`).
#[derive(Debug, Clone, Deserialize)]
pub struct PostPage {
    #[serde(default)]
    pub items: Vec<Post>,
    #[serde(rename = "nextPageToken", default)]
    pub next_page_token: Option<String>,
}

impl Post {
    /// Author display name with the API's fallback.
    pub fn author_name(&self) -> &str {
        self.author
            .as_ref()
            .and_then(|a| a.display_name.as_deref())
            .unwrap_or("Unknown Author")
    }

    /// Published timestamp as `YYYY-MM-DD HH:MM:SS UTC`, or a placeholder.
    pub fn published_utc(&self) -> String {
        match self.published {
            Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            None => "Unknown Date".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const POST_JSON: &str = r#"{
        "kind": "blogger#post",
        "id": "6814573853229626501",
        "blog": {"id": "2399953"},
        "published": "2023-04-11T14:30:00-07:00",
        "updated": "2023-04-12T09:00:00-07:00",
        "url": "https://example.blogspot.com/2023/04/hello.html",
        "title": "Hello World",
        "content": "<p>First post.</p>",
        "author": {"id": "1", "displayName": "Jo Blogger"}
    }"#;

    #[test]
    fn post_deserializes_from_api_payload() {
        let post: Post = serde_json::from_str(POST_JSON).unwrap();
        assert_eq!(post.id, "6814573853229626501");
        assert_eq!(post.title, "Hello World");
        assert_eq!(post.author_name(), "Jo Blogger");
        assert_eq!(post.content, "<p>First post.</p>");
        // -07:00 offset normalizes to UTC.
        assert_eq!(post.published_utc(), "2023-04-11 21:30:00 UTC");
    }

    #[test]
    fn post_missing_optional_fields_uses_fallbacks() {
        let post: Post = serde_json::from_str(r#"{"id": "42"}"#).unwrap();
        assert_eq!(post.title, "No Title");
        assert_eq!(post.author_name(), "Unknown Author");
        assert_eq!(post.published_utc(), "Unknown Date");
        assert!(post.content.is_empty());
    }

    #[test]
    fn post_page_carries_items_and_token() {
        let page: PostPage = serde_json::from_str(
            r#"{"items": [{"id": "1"}, {"id": "2"}], "nextPageToken": "CgkIABCx"}"#,
        )
        .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("CgkIABCx"));
    }

    #[test]
    fn post_page_without_items_is_empty() {
        let page: PostPage = serde_json::from_str(r#"{"kind": "blogger#postList"}"#).unwrap();
        assert!(page.items.is_empty());
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn blog_total_items_from_nested_posts() {
        let blog: Blog = serde_json::from_str(
            r#"{"id": "2399953", "name": "My Blog", "url": "https://example.blogspot.com/",
                "posts": {"totalItems": 187, "selfLink": "..."}}"#,
        )
        .unwrap();
        assert_eq!(blog.name, "My Blog");
        assert_eq!(blog.posts.total_items, 187);
    }
}
