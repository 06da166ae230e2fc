//! CLI parsing and orchestration. Parses args, runs authenticate -> fetch ->
//! index -> export, and maps errors to exit codes.

use crate::api::{ApiClient, ApiError, BloggerApi, PostSource};
use crate::auth::{self, AuthError, DEFAULT_TOKEN_FILE};
use crate::config;
use crate::export::{run_export, ExportError, ExportMode, ExportOptions};
use crate::model::Post;
use crate::render::{write_index, HtmlRenderer, ImagePolicy, RenderError};
use crate::state::{DirStateStore, MemoryStateStore, StateError, StateStore};
use clap::Parser;
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// CLI error carrying exit code and message.
#[derive(Debug, Error)]
pub enum CliRunError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("{0}")]
    Api(#[from] ApiError),

    #[error("{0}")]
    Export(#[from] ExportError),

    #[error("{0}")]
    Render(#[from] RenderError),

    #[error("{0}")]
    State(#[from] StateError),
}

impl CliRunError {
    pub fn exit_code(&self) -> i32 {
        match self {
            CliRunError::InvalidInput(_) => 1,
            CliRunError::Auth(_) | CliRunError::Api(_) => 2,
            CliRunError::Export(_) | CliRunError::Render(_) | CliRunError::State(_) => 3,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "blogmirror")]
#[command(about = "Export a Blogger blog to a static, browsable HTML mirror")]
#[command(
    after_help = "Config file keys (output_dir, user_agent, request_delay_secs, timeout_secs, retry_count, retry_backoff_secs, token_file, test_limit, images) are documented in the README. CLI flags override config."
)]
pub struct Args {
    /// Blogger blog ID to export.
    pub blog_id: String,

    /// Export the complete post history (resumable). Without this flag a
    /// bounded test export of the most recent posts is run.
    #[arg(long)]
    pub full: bool,

    /// Reset export state before a full run, forcing re-export of every post.
    #[arg(long)]
    pub clean: bool,

    /// Export a single post by ID for troubleshooting (non-resumable; also
    /// writes the post's raw source content to blog_source.html).
    #[arg(long)]
    pub post: Option<String>,

    /// Base output directory. The per-mode trees (blogs/, blogs_test/,
    /// blogs_<POST_ID>/) are created under it. Default: current directory.
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Maximum posts in test mode (overrides config; default 10).
    #[arg(long)]
    pub limit: Option<usize>,

    /// Image re-download policy on retried exports: refetch (default) or
    /// skip-existing.
    #[arg(long, value_parser = parse_image_policy)]
    pub images: Option<ImagePolicy>,

    /// Path to the OAuth token file (overrides config; default ./token.json).
    #[arg(long)]
    pub token: Option<PathBuf>,

    /// HTTP User-Agent (overrides config).
    #[arg(long)]
    pub user_agent: Option<String>,

    /// Delay between requests in seconds (overrides config; default 1).
    #[arg(long)]
    pub delay: Option<u64>,

    /// Request timeout in seconds (overrides config; default 30).
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Fetch the blog and post list, print counts and the target directory,
    /// and write nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Suppress progress output (errors only).
    #[arg(short, long)]
    pub quiet: bool,

    /// Print verbose error chain.
    #[arg(long)]
    pub verbose: bool,
}

fn parse_image_policy(s: &str) -> Result<ImagePolicy, String> {
    match s.to_lowercase().as_str() {
        "refetch" => Ok(ImagePolicy::Refetch),
        "skip-existing" | "skip_existing" | "skip" => Ok(ImagePolicy::SkipExisting),
        _ => Err(format!(
            "Invalid --images value: '{}'. Use refetch or skip-existing.",
            s
        )),
    }
}

/// Which kind of run the flags select.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RunKind {
    /// Bounded export of the most recent posts, output wiped first.
    Test,
    /// Resumable export of the whole post history.
    Full,
    /// One post, non-resumable, with a raw source dump.
    SinglePost(String),
}

fn resolve_run(full: bool, post: Option<&str>) -> Result<RunKind, String> {
    match (full, post) {
        (true, Some(_)) => Err("Cannot specify both --full and --post.".to_string()),
        (true, None) => Ok(RunKind::Full),
        (false, Some(id)) => Ok(RunKind::SinglePost(id.to_string())),
        (false, None) => Ok(RunKind::Test),
    }
}

/// Per-mode output tree under the base directory. Test and single-post runs
/// get trees separate from the full-export tree so they never collide with
/// it (or with its export state).
fn output_dir_for(kind: &RunKind, base: &Path, blog_id: &str) -> PathBuf {
    match kind {
        RunKind::Full => base.join("blogs").join(blog_id),
        RunKind::Test => base.join("blogs_test").join(blog_id),
        RunKind::SinglePost(post_id) => base.join(format!("blogs_{}", post_id)).join(blog_id),
    }
}

/// Blog and post ids become path components; restrict them to the id
/// alphabet Blogger actually uses.
fn validate_id(kind: &str, id: &str) -> Result<(), String> {
    if id.is_empty() {
        return Err(format!("{} must not be empty.", kind));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(format!(
            "Invalid {}: '{}'. Expected only letters, digits, '-' or '_'.",
            kind, id
        ));
    }
    Ok(())
}

const DEFAULT_DELAY_SECS: u64 = 1;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_RETRY_COUNT: u32 = 3;
const DEFAULT_TEST_LIMIT: usize = 10;

/// Entry point for the CLI. Returns Ok(()) on success; Err with exit code and message on failure.
pub fn run(args: &Args) -> Result<(), CliRunError> {
    let kind = resolve_run(args.full, args.post.as_deref()).map_err(CliRunError::InvalidInput)?;
    validate_id("blog ID", &args.blog_id).map_err(CliRunError::InvalidInput)?;
    if let RunKind::SinglePost(ref post_id) = kind {
        validate_id("post ID", post_id).map_err(CliRunError::InvalidInput)?;
    }

    let config = config::load_config().map_err(CliRunError::InvalidInput)?;

    let base_dir: PathBuf = args
        .output
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.output_dir.clone()))
        .unwrap_or_else(|| PathBuf::from("."));
    let delay_secs = args
        .delay
        .or_else(|| config.as_ref().and_then(|c| c.request_delay_secs))
        .unwrap_or(DEFAULT_DELAY_SECS);
    let timeout_secs = args
        .timeout
        .or_else(|| config.as_ref().and_then(|c| c.timeout_secs))
        .unwrap_or(DEFAULT_TIMEOUT_SECS);
    let retry_count = config
        .as_ref()
        .and_then(|c| c.retry_count)
        .unwrap_or(DEFAULT_RETRY_COUNT)
        .max(1);
    let retry_backoff_secs = config
        .as_ref()
        .and_then(|c| c.retry_backoff_secs.clone())
        .unwrap_or_else(|| vec![1, 2, 4]);
    let user_agent = args
        .user_agent
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.user_agent.clone()));
    let test_limit = args
        .limit
        .or_else(|| config.as_ref().and_then(|c| c.test_limit))
        .unwrap_or(DEFAULT_TEST_LIMIT);
    let image_policy = args
        .images
        .or_else(|| {
            config
                .as_ref()
                .and_then(|c| c.images.as_deref())
                .and_then(|s| parse_image_policy(s).ok())
        })
        .unwrap_or(ImagePolicy::Refetch);
    let token_path = args
        .token
        .clone()
        .or_else(|| config.as_ref().and_then(|c| c.token_file.clone()))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_FILE));

    // Authentication failures are fatal before any post processing.
    let credentials = auth::load_credentials(&token_path)?;

    let mut builder = ApiClient::builder(credentials)
        .delay_secs(delay_secs)
        .timeout_secs(timeout_secs)
        .retry_count(retry_count)
        .retry_backoff_secs(retry_backoff_secs);
    if let Some(ua) = user_agent {
        builder = builder.user_agent(ua);
    }
    let mut client = builder
        .build()
        .map_err(|e| CliRunError::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

    let output_dir = output_dir_for(&kind, &base_dir, &args.blog_id);

    let mut api = BloggerApi::new(&mut client);
    let blog = api.fetch_blog(&args.blog_id)?;
    if !args.quiet {
        eprintln!("Processing blog: {} (ID: {})", blog.name, blog.id);
    }

    let posts: Vec<Post> = match &kind {
        RunKind::Full => api.fetch_posts(&args.blog_id, None)?,
        RunKind::Test => api.fetch_posts(&args.blog_id, Some(test_limit))?,
        RunKind::SinglePost(post_id) => vec![api.fetch_post(&args.blog_id, post_id)?],
    };
    if !args.quiet {
        eprintln!("Retrieved {} posts.", posts.len());
    }

    if args.dry_run {
        eprintln!("Posts: {}", posts.len());
        eprintln!("Output: {}", output_dir.display());
        return Ok(());
    }

    // Test and single-post output is overwritten wholesale every run; only
    // the full-export tree persists across invocations.
    if !matches!(kind, RunKind::Full) {
        std::fs::remove_dir_all(&output_dir).ok();
    }
    std::fs::create_dir_all(&output_dir).map_err(|e| {
        CliRunError::Render(RenderError::Io {
            path: output_dir.clone(),
            source: e,
        })
    })?;

    let index_path = write_index(&output_dir, &blog, &posts)?;

    let mut dir_store;
    let mut memory_store;
    let store: &mut dyn StateStore = match kind {
        RunKind::Full => {
            dir_store = DirStateStore::open(&output_dir)?;
            &mut dir_store
        }
        // Stateless modes never consult entries; the in-memory store is a
        // placeholder.
        _ => {
            memory_store = MemoryStateStore::new();
            &mut memory_store
        }
    };

    let progress_state: RefCell<Option<indicatif::ProgressBar>> = RefCell::new(None);
    let progress_cb = |n: u32, total: u32| {
        if total == 0 {
            return;
        }
        let mut state = progress_state.borrow_mut();
        let pb = state.get_or_insert_with(|| {
            let bar = indicatif::ProgressBar::new(total as u64);
            bar.set_style(
                indicatif::ProgressStyle::default_bar()
                    .template("{spinner} {msg} [{bar:40}] {pos}/{len} ({elapsed})")
                    .unwrap()
                    .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏")
                    .progress_chars("█▉▊▋▌▍▎▏ "),
            );
            bar.enable_steady_tick(Duration::from_millis(80));
            bar
        });
        pb.set_position(n as u64);
        pb.set_message(format!("Exporting post {}/{}", n, total));
    };
    let progress: Option<&dyn Fn(u32, u32)> = if args.quiet { None } else { Some(&progress_cb) };

    let mode = match kind {
        RunKind::Full => ExportMode::Full,
        _ => ExportMode::Test,
    };
    let save_source = matches!(kind, RunKind::SinglePost(_));
    let mut renderer = HtmlRenderer::new(&mut client, &output_dir, image_policy, save_source);

    let options = ExportOptions {
        mode,
        clean: args.clean,
        filter_post_id: None,
        progress,
    };
    let summary = run_export(&posts, store, &mut renderer, &options)?;

    if let Some(pb) = progress_state.borrow_mut().take() {
        pb.disable_steady_tick();
        pb.finish_and_clear();
    }

    eprintln!("Export complete: {}.", summary);
    if !summary.failed.is_empty() {
        eprintln!("Failed posts (left in progress, will be retried on the next full run):");
        for id in &summary.failed {
            eprintln!(
                "  {}  (or retry alone: blogmirror {} --post {})",
                id, args.blog_id, id
            );
        }
    }
    if !args.quiet {
        eprintln!("Open {} to view the export.", index_path.display());
    }
    Ok(())
}
