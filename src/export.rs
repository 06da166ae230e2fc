//! Export controller: decides per post whether to skip, claim, or re-export,
//! and drives the renderer. Owns the resumability semantics.
//!
//! Full mode walks the post sequence once. A post whose entry is Complete is
//! skipped without any writes; otherwise the InProgress claim is persisted
//! first, then the renderer runs, and only after every write succeeded is
//! the entry advanced to Complete. A crash between claim and completion
//! leaves the entry InProgress, which the next run re-exports. Per-post
//! failures are non-fatal: the entry stays InProgress, the id is recorded,
//! and the run continues.

use crate::model::Post;
use crate::render::{navigation_links, PostRenderer};
use crate::state::{ExportStatus, StateStore};
use thiserror::Error;

/// Export mode. Test mode always overwrites and never touches the state
/// store; full mode is resumable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportMode {
    Test,
    Full,
}

/// Options for one export run.
pub struct ExportOptions<'a> {
    pub mode: ExportMode,
    /// Reset every state entry to NotStarted before processing (full mode).
    pub clean: bool,
    /// Restrict the run to exactly one post id.
    ///
    /// For library callers already holding a fetched sequence. The CLI's
    /// `--post` mode does not use it: fetching the one post directly costs a
    /// single API call instead of paginating the whole history, so it passes
    /// a one-element slice here instead.
    pub filter_post_id: Option<&'a str>,
    /// Called as (processed, total) after each post is handled.
    pub progress: Option<&'a dyn Fn(u32, u32)>,
}

/// End-of-run report. `failed` holds the post ids to retry individually.
#[derive(Debug, Default)]
pub struct ExportSummary {
    pub skipped: u32,
    pub exported: u32,
    pub failed: Vec<String>,
}

impl ExportSummary {
    pub fn failed_count(&self) -> u32 {
        self.failed.len() as u32
    }
}

impl std::fmt::Display for ExportSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "exported {}, skipped {}, failed {}",
            self.exported,
            self.skipped,
            self.failed_count()
        )
    }
}

/// Errors that abort the whole run. Per-post render failures do not abort
/// and are reported through [ExportSummary::failed] instead.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Post {post_id} was not found in the fetched post list.")]
    PostNotFound { post_id: String },

    #[error("Could not reset export state: {0}")]
    Clean(#[source] crate::state::StateError),
}

/// Run one export over `posts` (in source order, newest first).
///
/// `posts` is the full fetched sequence; navigation links between posts are
/// derived from it even when `filter_post_id` narrows the run to one post.
pub fn run_export(
    posts: &[Post],
    store: &mut dyn StateStore,
    renderer: &mut dyn PostRenderer,
    options: &ExportOptions<'_>,
) -> Result<ExportSummary, ExportError> {
    if options.clean && options.mode == ExportMode::Full {
        store.clean().map_err(ExportError::Clean)?;
    }

    let selected: Vec<&Post> = match options.filter_post_id {
        Some(id) => {
            let post = posts
                .iter()
                .find(|p| p.id == id)
                .ok_or_else(|| ExportError::PostNotFound {
                    post_id: id.to_string(),
                })?;
            vec![post]
        }
        None => posts.iter().collect(),
    };

    let navigation = navigation_links(posts);
    let total = selected.len() as u32;
    let mut summary = ExportSummary::default();
    let mut done = 0u32;

    for post in selected {
        done += 1;

        if options.mode == ExportMode::Full {
            // Complete is the only terminal state; InProgress from an
            // interrupted run and NotStarted are both re-exported.
            if store.get(&post.id).status == ExportStatus::Complete {
                summary.skipped += 1;
                if let Some(ref p) = options.progress {
                    p(done, total);
                }
                continue;
            }

            // Persist the claim before any write. If the claim itself cannot
            // be made durable, rendering would void the resumability
            // guarantee, so the post is counted failed instead.
            if let Err(e) = store.mark_in_progress(&post.id) {
                eprintln!("Post {}: could not record export start: {}.", post.id, e);
                summary.failed.push(post.id.clone());
                if let Some(ref p) = options.progress {
                    p(done, total);
                }
                continue;
            }
        }

        let nav = navigation
            .get(&post.id)
            .cloned()
            .unwrap_or_default();
        match renderer.render_post(post, &nav) {
            Ok(()) => {
                if options.mode == ExportMode::Full {
                    if let Err(e) = store.mark_complete(&post.id) {
                        // Files are on disk but the entry stays InProgress;
                        // the next run re-exports rather than trusting an
                        // unrecorded completion.
                        eprintln!(
                            "Post {}: exported but could not record completion: {}.",
                            post.id, e
                        );
                        summary.failed.push(post.id.clone());
                        if let Some(ref p) = options.progress {
                            p(done, total);
                        }
                        continue;
                    }
                }
                summary.exported += 1;
            }
            Err(e) => {
                eprintln!("Post {}: export failed: {}. Continuing.", post.id, e);
                summary.failed.push(post.id.clone());
            }
        }

        if let Some(ref p) = options.progress {
            p(done, total);
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::{NavLinks, RenderError};
    use crate::state::{ExportStatus, MemoryStateStore};
    use std::collections::HashSet;

    /// Recording renderer: remembers which posts it rendered and can be told
    /// to fail specific ids.
    #[derive(Default)]
    struct FakeRenderer {
        rendered: Vec<String>,
        fail_ids: HashSet<String>,
    }

    impl FakeRenderer {
        fn failing(ids: &[&str]) -> Self {
            Self {
                rendered: Vec::new(),
                fail_ids: ids.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    impl PostRenderer for FakeRenderer {
        fn render_post(&mut self, post: &Post, _nav: &NavLinks) -> Result<(), RenderError> {
            if self.fail_ids.contains(&post.id) {
                return Err(RenderError::Io {
                    path: std::path::PathBuf::from(&post.id),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.rendered.push(post.id.clone());
            Ok(())
        }
    }

    fn post(id: &str) -> Post {
        serde_json::from_str(&format!(
            r#"{{"id": "{}", "title": "Post {}", "content": "<p>body</p>"}}"#,
            id, id
        ))
        .unwrap()
    }

    fn full_options() -> ExportOptions<'static> {
        ExportOptions {
            mode: ExportMode::Full,
            clean: false,
            filter_post_id: None,
            progress: None,
        }
    }

    #[test]
    fn fresh_full_run_exports_everything() {
        let posts = vec![post("1"), post("2"), post("3")];
        let mut store = MemoryStateStore::new();
        let mut renderer = FakeRenderer::default();
        let summary = run_export(&posts, &mut store, &mut renderer, &full_options()).unwrap();
        assert_eq!(summary.exported, 3);
        assert_eq!(summary.skipped, 0);
        assert!(summary.failed.is_empty());
        assert_eq!(renderer.rendered, vec!["1", "2", "3"]);
        for id in ["1", "2", "3"] {
            assert_eq!(store.get(id).status, ExportStatus::Complete);
        }
    }

    #[test]
    fn complete_entries_are_skipped_without_writes() {
        let posts = vec![post("1"), post("2")];
        let mut store = MemoryStateStore::new();
        store.insert("1", ExportStatus::Complete);
        store.insert("2", ExportStatus::Complete);
        let mut renderer = FakeRenderer::default();
        let summary = run_export(&posts, &mut store, &mut renderer, &full_options()).unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.exported, 0);
        assert!(renderer.rendered.is_empty());
    }

    #[test]
    fn in_progress_from_interrupted_run_is_retried() {
        let posts = vec![post("1"), post("2"), post("3")];
        let mut store = MemoryStateStore::new();
        store.insert("1", ExportStatus::Complete);
        store.insert("2", ExportStatus::InProgress); // crashed mid-export
        store.insert("3", ExportStatus::Complete);
        let mut renderer = FakeRenderer::default();
        let summary = run_export(&posts, &mut store, &mut renderer, &full_options()).unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.exported, 1);
        assert_eq!(renderer.rendered, vec!["2"]);
        assert_eq!(store.get("2").status, ExportStatus::Complete);
    }

    #[test]
    fn clean_forces_full_re_export() {
        let posts = vec![post("1"), post("2")];
        let mut store = MemoryStateStore::new();
        store.insert("1", ExportStatus::Complete);
        store.insert("2", ExportStatus::Complete);
        let mut renderer = FakeRenderer::default();
        let options = ExportOptions {
            clean: true,
            ..full_options()
        };
        let summary = run_export(&posts, &mut store, &mut renderer, &options).unwrap();
        assert_eq!(summary.exported, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(renderer.rendered, vec!["1", "2"]);
    }

    #[test]
    fn failure_is_non_fatal_and_leaves_entry_in_progress() {
        let posts = vec![post("1"), post("2"), post("3")];
        let mut store = MemoryStateStore::new();
        let mut renderer = FakeRenderer::failing(&["2"]);
        let summary = run_export(&posts, &mut store, &mut renderer, &full_options()).unwrap();
        assert_eq!(summary.exported, 2);
        assert_eq!(summary.failed, vec!["2"]);
        assert_eq!(store.get("1").status, ExportStatus::Complete);
        assert_eq!(store.get("2").status, ExportStatus::InProgress);
        assert_eq!(store.get("3").status, ExportStatus::Complete);

        // Second run: only the failed post is re-attempted.
        let mut renderer = FakeRenderer::default();
        let summary = run_export(&posts, &mut store, &mut renderer, &full_options()).unwrap();
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.exported, 1);
        assert_eq!(renderer.rendered, vec!["2"]);
    }

    /// Store wrapper that fails persistence for chosen post ids, standing in
    /// for an unwritable state directory.
    #[derive(Default)]
    struct FailingStore {
        inner: MemoryStateStore,
        fail_claim: HashSet<String>,
        fail_complete: HashSet<String>,
    }

    impl FailingStore {
        fn denied(id: &str) -> crate::state::StateError {
            crate::state::StateError::Io {
                path: std::path::PathBuf::from(format!(".state/{}.json", id)),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            }
        }
    }

    impl StateStore for FailingStore {
        fn get(&self, post_id: &str) -> crate::state::ExportEntry {
            self.inner.get(post_id)
        }

        fn mark_in_progress(&mut self, post_id: &str) -> Result<(), crate::state::StateError> {
            if self.fail_claim.contains(post_id) {
                return Err(Self::denied(post_id));
            }
            self.inner.mark_in_progress(post_id)
        }

        fn mark_complete(&mut self, post_id: &str) -> Result<(), crate::state::StateError> {
            if self.fail_complete.contains(post_id) {
                return Err(Self::denied(post_id));
            }
            self.inner.mark_complete(post_id)
        }

        fn clean(&mut self) -> Result<(), crate::state::StateError> {
            self.inner.clean()
        }
    }

    #[test]
    fn unpersistable_claim_skips_rendering_and_counts_failed() {
        let posts = vec![post("1"), post("2"), post("3")];
        let mut store = FailingStore::default();
        store.fail_claim.insert("2".to_string());
        let mut renderer = FakeRenderer::default();
        let summary = run_export(&posts, &mut store, &mut renderer, &full_options()).unwrap();
        // Without a durable claim the renderer must not write anything for
        // that post; the run continues with the rest.
        assert_eq!(renderer.rendered, vec!["1", "3"]);
        assert_eq!(summary.exported, 2);
        assert_eq!(summary.failed, vec!["2"]);
        assert_eq!(store.get("2").status, ExportStatus::NotStarted);
    }

    #[test]
    fn unpersistable_completion_leaves_entry_in_progress() {
        let posts = vec![post("1"), post("2")];
        let mut store = FailingStore::default();
        store.fail_complete.insert("1".to_string());
        let mut renderer = FakeRenderer::default();
        let summary = run_export(&posts, &mut store, &mut renderer, &full_options()).unwrap();
        // The files were written, but an unrecorded completion is reported
        // as a failure and re-exported next run.
        assert_eq!(renderer.rendered, vec!["1", "2"]);
        assert_eq!(summary.exported, 1);
        assert_eq!(summary.failed, vec!["1"]);
        assert_eq!(store.get("1").status, ExportStatus::InProgress);
        assert_eq!(store.get("2").status, ExportStatus::Complete);
    }

    #[test]
    fn test_mode_ignores_state_and_always_renders() {
        let posts = vec![post("1"), post("2")];
        let mut store = MemoryStateStore::new();
        store.insert("1", ExportStatus::Complete);
        store.insert("2", ExportStatus::Complete);
        let mut renderer = FakeRenderer::default();
        let options = ExportOptions {
            mode: ExportMode::Test,
            clean: false,
            filter_post_id: None,
            progress: None,
        };
        let summary = run_export(&posts, &mut store, &mut renderer, &options).unwrap();
        assert_eq!(summary.exported, 2);
        assert_eq!(summary.skipped, 0);
        assert_eq!(renderer.rendered, vec!["1", "2"]);
        // State untouched.
        assert_eq!(store.get("1").status, ExportStatus::Complete);
    }

    #[test]
    fn filter_restricts_run_to_one_post() {
        let posts = vec![post("1"), post("2"), post("3")];
        let mut store = MemoryStateStore::new();
        store.insert("1", ExportStatus::Complete);
        store.insert("3", ExportStatus::Complete);
        let mut renderer = FakeRenderer::default();
        let options = ExportOptions {
            filter_post_id: Some("2"),
            ..full_options()
        };
        let summary = run_export(&posts, &mut store, &mut renderer, &options).unwrap();
        assert_eq!(summary.exported, 1);
        assert_eq!(summary.skipped, 0);
        assert_eq!(renderer.rendered, vec!["2"]);
        // Other posts' entries untouched.
        assert_eq!(store.get("1").status, ExportStatus::Complete);
        assert_eq!(store.get("3").status, ExportStatus::Complete);
    }

    #[test]
    fn filter_unknown_post_errors() {
        let posts = vec![post("1")];
        let mut store = MemoryStateStore::new();
        let mut renderer = FakeRenderer::default();
        let options = ExportOptions {
            filter_post_id: Some("99"),
            ..full_options()
        };
        let result = run_export(&posts, &mut store, &mut renderer, &options);
        assert!(matches!(
            result,
            Err(ExportError::PostNotFound { post_id }) if post_id == "99"
        ));
    }

    #[test]
    fn progress_reports_every_post_including_skips() {
        let posts = vec![post("1"), post("2")];
        let mut store = MemoryStateStore::new();
        store.insert("1", ExportStatus::Complete);
        let mut renderer = FakeRenderer::default();
        let seen = std::cell::RefCell::new(Vec::new());
        let progress = |n: u32, total: u32| seen.borrow_mut().push((n, total));
        let options = ExportOptions {
            progress: Some(&progress),
            ..full_options()
        };
        run_export(&posts, &mut store, &mut renderer, &options).unwrap();
        assert_eq!(*seen.borrow(), vec![(1, 2), (2, 2)]);
    }

    #[test]
    fn summary_display_reads_naturally() {
        let summary = ExportSummary {
            skipped: 5,
            exported: 2,
            failed: vec!["9".into()],
        };
        assert_eq!(summary.to_string(), "exported 2, skipped 5, failed 1");
    }
}
