use crate::page::FeedPage;
use crate::selectors::{CompiledSelectors, DomContract};
use feedfilter_core::{CoreError, PostRecord};
use scraper::{ElementRef, Html};
use tracing::debug;
use url::Url;

const HOST_BASE: &str = "https://x.com/";

/// Finds unprocessed posts in a page snapshot.
#[derive(Debug, Clone)]
pub struct PostScanner {
    contract: DomContract,
    selectors: CompiledSelectors,
}

impl PostScanner {
    pub fn new(contract: DomContract) -> Result<Self, CoreError> {
        let selectors = CompiledSelectors::compile(&contract)?;
        Ok(Self {
            contract,
            selectors,
        })
    }

    pub fn with_default_contract() -> Result<Self, CoreError> {
        Self::new(DomContract::default())
    }

    pub fn contract(&self) -> &DomContract {
        &self.contract
    }

    /// Lazily yields every post that has an identifier, some text and has not
    /// been processed yet. Each call starts a fresh pass over the document.
    pub fn scan<'a, P>(
        &'a self,
        document: &'a Html,
        page: &'a P,
    ) -> impl Iterator<Item = PostRecord> + 'a
    where
        P: FeedPage + ?Sized + 'a,
    {
        document
            .select(&self.selectors.container)
            .filter(move |container| {
                container
                    .value()
                    .attr(&self.contract.processed_attribute)
                    .is_none()
            })
            .filter_map(move |container| self.extract(container))
            .filter(move |post| !page.is_processed(&post.locator))
    }

    /// Reads one post container. `None` when the container holds no post,
    /// no status link, or no text.
    pub fn extract(&self, container: ElementRef<'_>) -> Option<PostRecord> {
        let article = container.select(&self.selectors.article).next()?;

        let href = article
            .select(&self.selectors.link)
            .filter_map(|link| link.value().attr("href"))
            .find(|href| href.contains("/status/"))?;
        let Some(identifier) = status_identifier(href) else {
            debug!("Status link without identifier: {}", href);
            return None;
        };

        let primary_text = article
            .select(&self.selectors.text)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let quoted_text = article
            .select(&self.selectors.quote)
            .next()
            .and_then(|quote| quote.select(&self.selectors.text).next())
            .map(element_text)
            .filter(|text| !text.is_empty());

        let post = PostRecord::new(identifier, primary_text, quoted_text);
        if !post.has_text() {
            debug!("Post {} has no text, skipping", post.identifier);
            return None;
        }
        Some(post)
    }
}

/// The path segment following `status` in a post link.
pub fn status_identifier(href: &str) -> Option<String> {
    let base = Url::parse(HOST_BASE).ok()?;
    let url = base.join(href).ok()?;
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == "status")?;
    segments
        .next()
        .filter(|segment| !segment.is_empty())
        .map(str::to_string)
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}
