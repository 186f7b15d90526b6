use crate::audit::{preview, AuditRecord, AuditSink, ContentSource, HiddenPost, TopicTrigger};
use database::{quoted_identifier, ResultCache};
use feed_scanner::{FeedPage, PresentationChange};
use feedfilter_core::{
    Analysis, AnalysisResult, ErrorExt, KeyValueStore, PostRecord, TopicSnapshot,
};
use llm_interface::Classifier;
use std::sync::Arc;
use tracing::{debug, warn};

const MISSING_TEXT: &str = "Text not found";

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Hidden(Vec<TopicTrigger>),
    Passed,
    /// The primary analysis was not a score object.
    Skipped,
}

impl Verdict {
    pub fn is_hidden(&self) -> bool {
        matches!(self, Verdict::Hidden(_))
    }
}

fn exceeded(
    topics: &TopicSnapshot,
    result: &AnalysisResult,
    source: ContentSource,
) -> Vec<TopicTrigger> {
    topics
        .rules()
        .iter()
        .filter_map(|rule| {
            rule.exceeded_by(result).map(|score| TopicTrigger {
                source,
                topic: rule.name.clone(),
                score,
                threshold: rule.threshold,
            })
        })
        .collect()
}

/// Hide when any enabled topic scores strictly above its threshold in either
/// the post or its quoted post.
pub fn decide(topics: &TopicSnapshot, primary: &Analysis, quoted: Option<&Analysis>) -> Verdict {
    let Some(primary) = primary.scores() else {
        return Verdict::Skipped;
    };

    let mut triggers = exceeded(topics, primary, ContentSource::Main);
    if let Some(quoted) = quoted.and_then(Analysis::scores) {
        triggers.extend(exceeded(topics, quoted, ContentSource::Quoted));
    }

    if triggers.is_empty() {
        Verdict::Passed
    } else {
        Verdict::Hidden(triggers)
    }
}

/// Decides and applies the visibility of individual posts.
pub struct VisibilityEngine<S, C> {
    cache: ResultCache<S>,
    classifier: Arc<C>,
    audit: Arc<dyn AuditSink>,
}

impl<S: KeyValueStore, C: Classifier> VisibilityEngine<S, C> {
    pub fn new(cache: ResultCache<S>, classifier: Arc<C>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            cache,
            classifier,
            audit,
        }
    }

    pub fn cache(&self) -> &ResultCache<S> {
        &self.cache
    }

    /// Marks the post processed and blurs it. Returns false when the post was
    /// already processed or is gone from the page.
    pub fn claim<P: FeedPage + ?Sized>(&self, page: &P, post: &PostRecord) -> bool {
        if page.is_processed(&post.locator) {
            return false;
        }
        if !page.apply(&post.locator, PresentationChange::MarkProcessed) {
            return false;
        }
        page.apply(&post.locator, PresentationChange::Analyzing);
        true
    }

    /// Resolves the analyses of a claimed post and applies the verdict.
    pub async fn evaluate<P: FeedPage + ?Sized>(
        &self,
        page: &P,
        post: &PostRecord,
        topics: &TopicSnapshot,
        credential: &str,
    ) -> Verdict {
        let primary = self
            .resolve(&post.identifier, &post.primary_text, topics, credential)
            .await;

        let quoted = match &post.quoted_text {
            Some(text) => Some(
                self.resolve(&quoted_identifier(&post.identifier), text, topics, credential)
                    .await,
            ),
            None => None,
        };

        let verdict = decide(topics, &primary, quoted.as_ref());
        self.present(page, post, &verdict);
        verdict
    }

    async fn resolve(
        &self,
        identifier: &str,
        text: &str,
        topics: &TopicSnapshot,
        credential: &str,
    ) -> Analysis {
        match self.cache.get(identifier).await {
            Ok(Some(analysis)) => {
                debug!("Cache hit for {}", identifier);
                return analysis;
            }
            Ok(None) => {}
            Err(e) => {
                e.log_warn();
            }
        }

        if text.is_empty() {
            debug!("No text for {}, treating as an empty result", identifier);
            return Analysis::empty();
        }

        let analysis = self.classifier.classify(text, topics, credential).await;
        if let Err(e) = self.cache.put(identifier, &analysis).await {
            warn!("Failed to cache analysis for {}: {}", identifier, e);
        }
        analysis
    }

    fn present<P: FeedPage + ?Sized>(&self, page: &P, post: &PostRecord, verdict: &Verdict) {
        let attached = match verdict {
            Verdict::Hidden(triggers) => {
                let attached = page.apply(&post.locator, PresentationChange::Hide);
                page.apply(&post.locator, PresentationChange::ClearAnalyzing);
                let text = if post.primary_text.is_empty() {
                    MISSING_TEXT.to_string()
                } else {
                    post.primary_text.clone()
                };
                self.audit.record(AuditRecord::Hidden(HiddenPost {
                    identifier: post.identifier.clone(),
                    permalink: post.locator.permalink(),
                    text,
                    quoted_text: post.quoted_text.clone(),
                    triggers: triggers.clone(),
                }));
                attached
            }
            Verdict::Passed => {
                let attached = page.apply(&post.locator, PresentationChange::Reveal);
                self.audit.record(AuditRecord::Passed {
                    identifier: post.identifier.clone(),
                    preview: preview(&post.primary_text),
                });
                attached
            }
            Verdict::Skipped => {
                let attached = page.apply(&post.locator, PresentationChange::Reveal);
                self.audit.record(AuditRecord::Skipped {
                    identifier: post.identifier.clone(),
                    reason: "invalid analysis result".to_string(),
                });
                attached
            }
        };

        if !attached {
            debug!("Could not find element for post {}", post.identifier);
        }
    }
}
