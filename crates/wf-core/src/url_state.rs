//! Query parameters that let a page resume live tracking of a task.

use url::Url;

pub const TASK_ID_PARAM: &str = "task_id";
pub const GENERATING_PARAM: &str = "generating";

/// A task view that should resume live tracking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeTarget {
    pub task_id: String,
    pub generating: bool,
}

impl ResumeTarget {
    /// Read `task_id` / `generating=true` from a page URL.
    pub fn from_url(url: &Url) -> Option<Self> {
        let mut task_id = None;
        let mut generating = false;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                TASK_ID_PARAM if !value.is_empty() => task_id = Some(value.into_owned()),
                GENERATING_PARAM => generating = value == "true",
                _ => {}
            }
        }
        task_id.map(|task_id| Self {
            task_id,
            generating,
        })
    }
}

/// Whether the URL still carries any tracking parameter.
pub fn has_tracking_params(url: &Url) -> bool {
    url.query_pairs()
        .any(|(k, _)| k == TASK_ID_PARAM || k == GENERATING_PARAM)
}

/// Copy of `url` without the tracking parameters; other query pairs and the
/// fragment are preserved in order.
pub fn strip_tracking_params(url: &Url) -> Url {
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != TASK_ID_PARAM && k != GENERATING_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut stripped = url.clone();
    if kept.is_empty() {
        stripped.set_query(None);
    } else {
        stripped.query_pairs_mut().clear().extend_pairs(kept);
    }
    stripped
}
