//! Renderer/downloader: writes each post's HTML page, downloads the images
//! it references, rewrites content URLs to the local copies, and writes the
//! blog index.
//!
//! Blogger-hosted user content is detected by URL prefix: an `<a href>` to
//! it carries the full-size image (and advances the per-post image index),
//! an `<img src>` carries the thumbnail at the current index, so the usual
//! thumbnail-wrapped-in-link markup yields one matched pair per image.

use crate::api::ApiClient;
use crate::model::{Blog, Post};
use chrono::Utc;
use scraper::{Html, Selector};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Host prefix for Blogger-hosted post images.
const USER_CONTENT_PREFIX: &str = "https://blogger.googleusercontent.com";
/// Raw-content dump written in single-post troubleshooting mode.
const SOURCE_DUMP_FILE: &str = "blog_source.html";
/// Navigation fallback for the first and last post.
const INDEX_FALLBACK: &str = "../index.html";

/// Errors from rendering a post or writing the index.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Failed to write output: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Network error: could not download {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} when downloading image: {url}")]
    HttpStatus { status: u16, url: String },

    #[error("Failed to read image bytes from {url}: {source}")]
    BodyRead {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// What to do when a retried export encounters an image it may already have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePolicy {
    /// Wipe the post directory and fetch every image again (default).
    Refetch,
    /// Keep image files already on disk; only the HTML is rewritten.
    SkipExisting,
}

/// Previous/next links for one post's page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavLinks {
    pub previous: String,
    pub next: String,
}

impl Default for NavLinks {
    fn default() -> Self {
        Self {
            previous: INDEX_FALLBACK.to_string(),
            next: INDEX_FALLBACK.to_string(),
        }
    }
}

/// Compute previous/next links for each post from the sequence order. The
/// first post's previous and the last post's next fall back to the index.
pub fn navigation_links(posts: &[Post]) -> HashMap<String, NavLinks> {
    let mut navigation = HashMap::with_capacity(posts.len());
    for (i, post) in posts.iter().enumerate() {
        let previous = if i > 0 {
            post_href(&posts[i - 1].id)
        } else {
            INDEX_FALLBACK.to_string()
        };
        let next = if i + 1 < posts.len() {
            post_href(&posts[i + 1].id)
        } else {
            INDEX_FALLBACK.to_string()
        };
        navigation.insert(post.id.clone(), NavLinks { previous, next });
    }
    navigation
}

fn post_href(post_id: &str) -> String {
    format!("../{}/{}.html", post_id, post_id)
}

/// Writes one post's files. The exporter depends on this trait so tests can
/// substitute a recording fake.
pub trait PostRenderer {
    /// Write the post's HTML and every referenced image. Must only return
    /// Ok(()) once all writes succeeded.
    fn render_post(&mut self, post: &Post, nav: &NavLinks) -> Result<(), RenderError>;
}

/// One image to download: its remote URL and the local filename the content
/// is rewritten to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRef {
    pub url: String,
    pub filename: String,
}

/// Scan post content for Blogger-hosted images, in document order.
///
/// Filenames follow `{post_id}_{full|thumbnail}_{index}.jpg`. The index
/// advances on each full-size link, and a thumbnail inside such a link
/// shares its link's index; a thumbnail outside one gets its own. A URL
/// seen twice maps to one ref, and filenames never collide, so no download
/// silently overwrites another.
pub fn collect_image_refs(content: &str, post_id: &str) -> Vec<ImageRef> {
    let fragment = Html::parse_fragment(content);
    let selector = match Selector::parse("a[href], img[src]") {
        Ok(s) => s,
        Err(_) => return Vec::new(),
    };
    let mut refs: Vec<ImageRef> = Vec::new();
    let mut seen_urls: HashSet<String> = HashSet::new();
    let mut used_filenames: HashSet<String> = HashSet::new();
    let mut image_index = 0u32;
    for element in fragment.select(&selector) {
        let (kind, url) = match element.value().name() {
            "a" => match element.value().attr("href") {
                Some(href) if href.starts_with(USER_CONTENT_PREFIX) => {
                    image_index += 1;
                    ("full", href)
                }
                _ => continue,
            },
            "img" => match element.value().attr("src") {
                Some(src) if src.starts_with(USER_CONTENT_PREFIX) => {
                    if !inside_user_content_link(&element) {
                        image_index += 1;
                    }
                    ("thumbnail", src)
                }
                _ => continue,
            },
            _ => continue,
        };
        if !seen_urls.insert(url.to_string()) {
            continue;
        }
        // Local bump only: several thumbnails under one link would otherwise
        // compute the same name.
        let mut index = image_index;
        let mut filename = format!("{}_{}_{}.jpg", post_id, kind, index);
        while used_filenames.contains(&filename) {
            index += 1;
            filename = format!("{}_{}_{}.jpg", post_id, kind, index);
        }
        used_filenames.insert(filename.clone());
        refs.push(ImageRef {
            url: url.to_string(),
            filename,
        });
    }
    refs
}

fn inside_user_content_link(element: &scraper::ElementRef<'_>) -> bool {
    element.ancestors().filter_map(scraper::ElementRef::wrap).any(|a| {
        a.value().name() == "a"
            && a.value()
                .attr("href")
                .map_or(false, |h| h.starts_with(USER_CONTENT_PREFIX))
    })
}

/// Replace each downloaded image's remote URL with its local filename.
pub fn rewrite_content(content: &str, refs: &[ImageRef]) -> String {
    let mut rewritten = content.to_string();
    for r in refs {
        rewritten = rewritten.replace(&r.url, &r.filename);
    }
    rewritten
}

pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// Real renderer: writes under `output_dir` through the authenticated client.
pub struct HtmlRenderer<'a> {
    client: &'a mut ApiClient,
    output_dir: PathBuf,
    image_policy: ImagePolicy,
    /// Also dump the post's raw content to blog_source.html (single-post
    /// troubleshooting mode).
    save_source: bool,
}

impl<'a> HtmlRenderer<'a> {
    pub fn new(
        client: &'a mut ApiClient,
        output_dir: impl Into<PathBuf>,
        image_policy: ImagePolicy,
        save_source: bool,
    ) -> Self {
        Self {
            client,
            output_dir: output_dir.into(),
            image_policy,
            save_source,
        }
    }

    fn download_image(&mut self, url: &str, target: &Path) -> Result<(), RenderError> {
        if self.image_policy == ImagePolicy::SkipExisting && target.exists() {
            return Ok(());
        }
        // Blogger occasionally emits scheme-relative image URLs.
        let url = if url.starts_with("http") {
            url.to_string()
        } else {
            format!("https:{}", url)
        };
        let response = self
            .client
            .get_with_retry(&url)
            .map_err(|e| RenderError::Network {
                url: url.clone(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::HttpStatus {
                status: status.as_u16(),
                url,
            });
        }
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.contains("text/html"))
            .unwrap_or(false);
        if is_html {
            // Some image URLs answer with an HTML wrapper page instead of
            // bytes; the real image is the first <img> inside it.
            let body = response
                .text()
                .map_err(|e| RenderError::BodyRead {
                    url: url.clone(),
                    source: e,
                })?;
            return match first_img_src(&body) {
                Some(inner) => self.fetch_image_bytes(&inner, target),
                None => {
                    eprintln!("No image found in HTML content at {}, skipping.", url);
                    Ok(())
                }
            };
        }
        let bytes = response.bytes().map_err(|e| RenderError::BodyRead {
            url: url.clone(),
            source: e,
        })?;
        std::fs::write(target, &bytes).map_err(|e| RenderError::Io {
            path: target.to_path_buf(),
            source: e,
        })
    }

    /// Single-level fetch for the URL extracted from an HTML wrapper page.
    fn fetch_image_bytes(&mut self, url: &str, target: &Path) -> Result<(), RenderError> {
        let response = self
            .client
            .get_with_retry(url)
            .map_err(|e| RenderError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = response.bytes().map_err(|e| RenderError::BodyRead {
            url: url.to_string(),
            source: e,
        })?;
        std::fs::write(target, &bytes).map_err(|e| RenderError::Io {
            path: target.to_path_buf(),
            source: e,
        })
    }
}

fn first_img_src(html: &str) -> Option<String> {
    let doc = Html::parse_document(html);
    let selector = Selector::parse("img[src]").ok()?;
    doc.select(&selector)
        .next()
        .and_then(|e| e.value().attr("src"))
        .map(String::from)
}

impl PostRenderer for HtmlRenderer<'_> {
    fn render_post(&mut self, post: &Post, nav: &NavLinks) -> Result<(), RenderError> {
        let post_dir = self.output_dir.join(&post.id);
        if self.image_policy == ImagePolicy::Refetch {
            // A directory left by an interrupted export may hold partial
            // output; replace it wholesale.
            std::fs::remove_dir_all(&post_dir).ok();
        }
        std::fs::create_dir_all(&post_dir).map_err(|e| RenderError::Io {
            path: post_dir.clone(),
            source: e,
        })?;

        if self.save_source {
            let source_path = self.output_dir.join(SOURCE_DUMP_FILE);
            std::fs::write(&source_path, &post.content).map_err(|e| RenderError::Io {
                path: source_path,
                source: e,
            })?;
        }

        let refs = collect_image_refs(&post.content, &post.id);
        for r in &refs {
            self.download_image(&r.url, &post_dir.join(&r.filename))?;
        }
        let content = rewrite_content(&post.content, &refs);

        let html_path = post_dir.join(format!("{}.html", post.id));
        let html = post_html(post, &content, nav);
        std::fs::write(&html_path, html).map_err(|e| RenderError::Io {
            path: html_path,
            source: e,
        })
    }
}

/// Render one post's page from the fixed template.
pub fn post_html(post: &Post, content: &str, nav: &NavLinks) -> String {
    let title = html_escape(&post.title);
    let author = html_escape(post.author_name());
    let live_url = post.url.as_deref().unwrap_or("#");
    let mut out = String::new();
    out.push_str("<html>\n");
    out.push_str("  <head>\n");
    out.push_str(&format!("    <title>{}</title>\n", title));
    out.push_str("  </head>\n");
    out.push_str("  <body>\n");
    out.push_str("    <article>\n");
    out.push_str(&format!("      <h1>{}</h1>\n", title));
    out.push_str(&format!(
        "      <div><strong>Published:</strong> {}</div>\n",
        post.published_utc()
    ));
    out.push_str(&format!(
        "      <div><strong>Author:</strong> {}</div>\n",
        author
    ));
    out.push_str(&format!("      <div>{}</div>\n", content));
    out.push_str("    </article>\n");
    out.push_str(&format!(
        "    <p>\n      <a href=\"{}\">Previous Post</a> |\n      <a href=\"{}\">Next Post</a>\n    </p>\n",
        nav.previous, nav.next
    ));
    out.push_str("    <p>\n      <a href=\"../index.html\">Back to index</a>\n    </p>\n");
    out.push_str(&format!(
        "    <p>\n      <a href=\"{}\" target=\"_blank\">View on Blogger</a>\n    </p>\n",
        live_url
    ));
    out.push_str("  </body>\n");
    out.push_str("</html>\n");
    out
}

/// Write `<output>/index.html` listing every fetched post with its date.
pub fn write_index(output_dir: &Path, blog: &Blog, posts: &[Post]) -> Result<PathBuf, RenderError> {
    let path = output_dir.join("index.html");
    let mut f = File::create(&path).map_err(|e| RenderError::Io {
        path: path.clone(),
        source: e,
    })?;
    let html = index_html(blog, posts);
    f.write_all(html.as_bytes()).map_err(|e| RenderError::Io {
        path: path.clone(),
        source: e,
    })?;
    Ok(path)
}

/// Render the index page from the fixed template.
pub fn index_html(blog: &Blog, posts: &[Post]) -> String {
    let name = html_escape(&blog.name);
    let blog_url = blog.url.as_deref().unwrap_or("#");
    let exported_on = Utc::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let mut out = String::new();
    out.push_str("<html>\n");
    out.push_str("  <head>\n");
    out.push_str(&format!("    <title>{}</title>\n", name));
    out.push_str("  </head>\n");
    out.push_str("  <body>\n");
    out.push_str(&format!("    <h1>{}</h1>\n", name));
    out.push_str(&format!(
        "    <p><b>Total Posts:</b> {}</p>\n",
        blog.posts.total_items
    ));
    out.push_str(&format!("    <p><b>Exported on:</b> {}</p>\n", exported_on));
    out.push_str(&format!(
        "    <p><a href=\"{}\" target=\"_blank\">View on Blogger</a></p>\n",
        blog_url
    ));
    out.push_str("    <ul>\n");
    for post in posts {
        out.push_str(&format!(
            "      <li>{} &ndash; <a href=\"{}/{}.html\">{}</a></li>\n",
            post.published_utc(),
            post.id,
            post.id,
            html_escape(&post.title)
        ));
    }
    out.push_str("    </ul>\n");
    out.push_str(&format!(
        "    <p><b>Exported Posts:</b> {}</p>\n",
        posts.len()
    ));
    out.push_str("  </body>\n");
    out.push_str("</html>\n");
    out
}
