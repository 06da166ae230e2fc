//! Blogger v3 REST adapter: blog metadata, the paginated post list, and
//! single-post fetch. Produces the canonical model types.

use crate::api::{ApiClient, ApiError};
use crate::model::{Blog, Post, PostPage};

const API_BASE: &str = "https://www.googleapis.com/blogger/v3";
/// Page size for the post list. The API caps maxResults at 500; 50 matches
/// a comfortable payload size for content-bearing posts.
const PAGE_SIZE: u32 = 50;

/// Ordered, paginated source of posts. The exporter consumes this trait so
/// tests can substitute a canned source.
pub trait PostSource {
    fn fetch_blog(&mut self, blog_id: &str) -> Result<Blog, ApiError>;

    /// Fetch the post sequence in API order (newest first), following
    /// `nextPageToken` until exhausted or `limit` is reached. The result is
    /// truncated to `limit` when set.
    fn fetch_posts(&mut self, blog_id: &str, limit: Option<usize>) -> Result<Vec<Post>, ApiError>;

    fn fetch_post(&mut self, blog_id: &str, post_id: &str) -> Result<Post, ApiError>;
}

/// The real adapter. Holds a reference to the shared authenticated client.
pub struct BloggerApi<'a> {
    client: &'a mut ApiClient,
}

impl<'a> BloggerApi<'a> {
    pub fn new(client: &'a mut ApiClient) -> Self {
        Self { client }
    }

    fn get_json(&mut self, url: &str, context: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .get_with_retry(url)
            .map_err(|e| ApiError::Network {
                url: url.to_string(),
                source: e,
            })?;
        check_response(response, url, Some(context))
    }
}

/// Check response status and read the body. Returns body or ApiError.
fn check_response(
    response: reqwest::blocking::Response,
    url: &str,
    context: Option<&str>,
) -> Result<String, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::HttpStatus {
            status: status.as_u16(),
            url: url.to_string(),
            context: context.map(String::from),
        });
    }
    response.text().map_err(|e| ApiError::BodyRead { source: e })
}

/// Decode one page of the post list.
fn decode_post_page(body: &str, url: &str) -> Result<PostPage, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        source: e,
    })
}

fn decode_blog(body: &str, url: &str) -> Result<Blog, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        source: e,
    })
}

fn decode_post(body: &str, url: &str) -> Result<Post, ApiError> {
    serde_json::from_str(body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        source: e,
    })
}

impl PostSource for BloggerApi<'_> {
    fn fetch_blog(&mut self, blog_id: &str) -> Result<Blog, ApiError> {
        let url = format!("{}/blogs/{}", API_BASE, blog_id);
        let body = self.get_json(&url, "blog")?;
        decode_blog(&body, &url)
    }

    fn fetch_posts(&mut self, blog_id: &str, limit: Option<usize>) -> Result<Vec<Post>, ApiError> {
        let mut posts: Vec<Post> = Vec::new();
        let mut page_token: Option<String> = None;
        let mut page_number = 1u32;
        loop {
            let mut url = format!(
                "{}/blogs/{}/posts?maxResults={}",
                API_BASE, blog_id, PAGE_SIZE
            );
            if let Some(ref token) = page_token {
                url.push_str("&pageToken=");
                url.push_str(token);
            }
            let context = format!("post list page {}", page_number);
            let body = self.get_json(&url, &context)?;
            let page = decode_post_page(&body, &url)?;
            posts.extend(page.items);

            if let Some(limit) = limit {
                if posts.len() >= limit {
                    posts.truncate(limit);
                    break;
                }
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
            page_number += 1;
        }
        Ok(posts)
    }

    fn fetch_post(&mut self, blog_id: &str, post_id: &str) -> Result<Post, ApiError> {
        let url = format!("{}/blogs/{}/posts/{}", API_BASE, blog_id, post_id);
        let body = self.get_json(&url, "post")?;
        decode_post(&body, &url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_post_page_with_token() {
        let body = r#"{"kind": "blogger#postList",
            "nextPageToken": "CgkIChiAkceVjiYQ0b2SAQ",
            "items": [{"id": "1", "title": "A"}, {"id": "2", "title": "B"}]}"#;
        let page = decode_post_page(body, "u").unwrap();
        assert_eq!(page.items.len(), 2);
        assert!(page.next_page_token.is_some());
    }

    #[test]
    fn decode_post_page_last_page() {
        let body = r#"{"items": [{"id": "3"}]}"#;
        let page = decode_post_page(body, "u").unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.next_page_token.is_none());
    }

    #[test]
    fn decode_post_page_invalid_json_errors() {
        let result = decode_post_page("<html>quota exceeded</html>", "u");
        assert!(matches!(result, Err(ApiError::Decode { .. })));
    }

    #[test]
    fn decode_blog_reads_counts() {
        let body = r#"{"id": "99", "name": "Travels", "posts": {"totalItems": 12}}"#;
        let blog = decode_blog(body, "u").unwrap();
        assert_eq!(blog.id, "99");
        assert_eq!(blog.posts.total_items, 12);
    }

    #[test]
    fn decode_single_post() {
        let body = r#"{"id": "7", "title": "Lone", "content": "<p>x</p>"}"#;
        let post = decode_post(body, "u").unwrap();
        assert_eq!(post.id, "7");
        assert_eq!(post.content, "<p>x</p>");
    }
}
