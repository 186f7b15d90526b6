use feedfilter_core::{CoreError, ScanError};
use scraper::Selector;

/// Attribute set on a post container once it has been claimed.
pub const PROCESSED_ATTRIBUTE: &str = "data-x-content-filter-processed";

/// The host page markup the scanner relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct DomContract {
    pub container: String,
    pub article: String,
    pub text: String,
    pub quote: String,
    pub link: String,
    pub processed_attribute: String,
}

impl Default for DomContract {
    fn default() -> Self {
        Self {
            container: r#"[data-testid="cellInnerDiv"]"#.to_string(),
            article: r#"article[data-testid="tweet"]"#.to_string(),
            text: r#"[data-testid="tweetText"]"#.to_string(),
            quote: r#"[data-testid="quoteTweet"]"#.to_string(),
            link: "a[href]".to_string(),
            processed_attribute: PROCESSED_ATTRIBUTE.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompiledSelectors {
    pub container: Selector,
    pub article: Selector,
    pub text: Selector,
    pub quote: Selector,
    pub link: Selector,
}

impl CompiledSelectors {
    pub fn compile(contract: &DomContract) -> Result<Self, CoreError> {
        Ok(Self {
            container: parse(&contract.container)?,
            article: parse(&contract.article)?,
            text: parse(&contract.text)?,
            quote: parse(&contract.quote)?,
            link: parse(&contract.link)?,
        })
    }
}

pub fn parse(selector: &str) -> Result<Selector, CoreError> {
    Selector::parse(selector).map_err(|e| {
        ScanError::InvalidSelector {
            selector: selector.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
