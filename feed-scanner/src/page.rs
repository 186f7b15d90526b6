use crate::selectors::{parse, DomContract};
use feedfilter_core::{CoreError, PostLocator};
use parking_lot::Mutex;
use scraper::Html;
use std::collections::HashMap;
use tracing::debug;

/// A change to how a post is presented on the host page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationChange {
    MarkProcessed,
    /// Blur the post and show the analyzing indicator.
    Analyzing,
    ClearAnalyzing,
    /// Remove blur and the analyzing indicator.
    Reveal,
    Hide,
}

/// The host page as seen by the filter.
pub trait FeedPage {
    /// Current markup of the page.
    fn snapshot(&self) -> Result<String, CoreError>;

    fn is_processed(&self, locator: &PostLocator) -> bool;

    /// Applies a change to the post the locator resolves to. Returns false
    /// when the post is no longer on the page, in which case nothing changes.
    fn apply(&self, locator: &PostLocator, change: PresentationChange) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PresentationState {
    pub processed: bool,
    pub blurred: bool,
    pub analyzing: bool,
    pub hidden: bool,
}

impl PresentationState {
    pub fn apply(&mut self, change: PresentationChange) {
        match change {
            PresentationChange::MarkProcessed => self.processed = true,
            PresentationChange::Analyzing => {
                self.blurred = true;
                self.analyzing = true;
            }
            PresentationChange::ClearAnalyzing => self.analyzing = false,
            PresentationChange::Reveal => {
                self.blurred = false;
                self.analyzing = false;
            }
            PresentationChange::Hide => self.hidden = true,
        }
    }

    pub fn label(&self) -> &'static str {
        if self.hidden {
            "hidden"
        } else if self.analyzing {
            "analyzing"
        } else if self.blurred {
            "blurred"
        } else if self.processed {
            "visible"
        } else {
            "unprocessed"
        }
    }
}

#[derive(Debug, Default)]
struct PageInner {
    html: String,
    /// Status hrefs found in each post container of the current markup
    container_links: Vec<Vec<String>>,
    states: HashMap<String, PresentationState>,
}

/// In-memory page over an HTML snapshot.
///
/// Presentation state is kept per post identifier, so a post keeps its state
/// when the markup is replaced and the post is rendered again.
#[derive(Debug, Default)]
pub struct SnapshotPage {
    inner: Mutex<PageInner>,
}

impl SnapshotPage {
    pub fn from_html(html: impl Into<String>) -> Self {
        let page = Self::default();
        page.replace_html(html);
        page
    }

    pub fn replace_html(&self, html: impl Into<String>) {
        let html = html.into();
        let container_links = collect_container_links(&html);
        debug!("Page replaced, {} post containers", container_links.len());

        let mut inner = self.inner.lock();
        inner.html = html;
        inner.container_links = container_links;
    }

    pub fn state(&self, identifier: &str) -> Option<PresentationState> {
        self.inner.lock().states.get(identifier).copied()
    }

    pub fn is_attached(&self, locator: &PostLocator) -> bool {
        let needle = format!("/status/{}", locator.identifier());
        self.inner
            .lock()
            .container_links
            .iter()
            .any(|links| links.iter().any(|href| href.contains(&needle)))
    }

    /// States of every post touched so far, ordered by identifier.
    pub fn report(&self) -> Vec<(String, PresentationState)> {
        let inner = self.inner.lock();
        let mut report: Vec<_> = inner
            .states
            .iter()
            .map(|(id, state)| (id.clone(), *state))
            .collect();
        report.sort_by(|a, b| a.0.cmp(&b.0));
        report
    }

    pub fn hidden_count(&self) -> usize {
        self.inner.lock().states.values().filter(|s| s.hidden).count()
    }
}

impl FeedPage for SnapshotPage {
    fn snapshot(&self) -> Result<String, CoreError> {
        Ok(self.inner.lock().html.clone())
    }

    fn is_processed(&self, locator: &PostLocator) -> bool {
        self.inner
            .lock()
            .states
            .get(locator.identifier())
            .map_or(false, |state| state.processed)
    }

    fn apply(&self, locator: &PostLocator, change: PresentationChange) -> bool {
        if !self.is_attached(locator) {
            debug!(
                "Post {} is no longer on the page, ignoring {:?}",
                locator.identifier(),
                change
            );
            return false;
        }

        self.inner
            .lock()
            .states
            .entry(locator.identifier().to_string())
            .or_default()
            .apply(change);
        true
    }
}

fn collect_container_links(html: &str) -> Vec<Vec<String>> {
    let contract = DomContract::default();
    let (Ok(container), Ok(link)) = (parse(&contract.container), parse(r#"a[href*="/status/"]"#))
    else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    document
        .select(&container)
        .map(|element| {
            element
                .select(&link)
                .filter_map(|a| a.value().attr("href"))
                .map(str::to_string)
                .collect()
        })
        .collect()
}
