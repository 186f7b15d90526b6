use crate::audit::AuditSink;
use crate::engine::{Verdict, VisibilityEngine};
use crate::topics::TopicRegistry;
use crate::trigger::Debouncer;
use database::{CredentialPrompt, KeyStore, ResultCache};
use feed_scanner::{FeedPage, Html, PostScanner};
use feedfilter_core::{CoreError, ErrorExt, KeyValueStore, PostRecord, TopicRule, TopicSnapshot};
use llm_interface::Classifier;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use tokio::task::{AbortHandle, JoinError, JoinSet};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    CredentialDeclined,
    NoEnabledTopics,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    Aborted(AbortReason),
    Completed { scanned: usize, claimed: usize },
}

pub type PostOutcome = (String, Verdict);

/// Runs scan cycles over a page and evaluates each new post in its own task.
///
/// Post tasks are spawned with `spawn_local`, so the service must be driven
/// from inside a `LocalSet`.
pub struct FilterService<S, C, K, P> {
    engine: Rc<VisibilityEngine<S, C>>,
    keys: KeyStore<S, K>,
    topics: TopicRegistry<S>,
    scanner: PostScanner,
    page: Rc<P>,
    tasks: JoinSet<PostOutcome>,
    handles: HashMap<String, AbortHandle>,
}

impl<S, C, K, P> FilterService<S, C, K, P>
where
    S: KeyValueStore + 'static,
    C: Classifier + 'static,
    K: CredentialPrompt,
    P: FeedPage + 'static,
{
    pub fn new(
        store: Arc<S>,
        classifier: Arc<C>,
        prompt: K,
        page: Rc<P>,
        default_topics: Vec<TopicRule>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, CoreError> {
        let engine = VisibilityEngine::new(ResultCache::new(store.clone()), classifier, audit);
        Ok(Self {
            engine: Rc::new(engine),
            keys: KeyStore::new(store.clone(), prompt),
            topics: TopicRegistry::new(store, default_topics),
            scanner: PostScanner::with_default_contract()?,
            page,
            tasks: JoinSet::new(),
            handles: HashMap::new(),
        })
    }

    pub fn with_scanner(mut self, scanner: PostScanner) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn page(&self) -> &Rc<P> {
        &self.page
    }

    pub fn engine(&self) -> &VisibilityEngine<S, C> {
        &self.engine
    }

    /// Number of post tasks that have not been joined yet.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Enabled topics for one cycle.
    pub async fn load_topics(&self) -> TopicSnapshot {
        TopicSnapshot::capture(&self.topics.load().await)
    }

    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, CoreError> {
        self.reap();

        let Some(credential) = self.keys.get_credential().await? else {
            error!("No API key provided. Aborting analysis.");
            return Ok(CycleOutcome::Aborted(AbortReason::CredentialDeclined));
        };

        let topics = self.load_topics().await;
        if topics.is_empty() {
            warn!("No topics enabled. Aborting analysis.");
            return Ok(CycleOutcome::Aborted(AbortReason::NoEnabledTopics));
        }

        let html = self.page.snapshot()?;
        let posts: Vec<PostRecord> = {
            let document = Html::parse_document(&html);
            self.scanner.scan(&document, self.page.as_ref()).collect()
        };

        let scanned = posts.len();
        let credential: Rc<str> = credential.into();
        let mut claimed = 0;

        for post in posts {
            if self.handles.contains_key(&post.identifier) {
                continue;
            }
            if !self.engine.claim(self.page.as_ref(), &post) {
                continue;
            }
            claimed += 1;

            let engine = Rc::clone(&self.engine);
            let page = Rc::clone(&self.page);
            let topics = topics.clone();
            let credential = Rc::clone(&credential);
            let identifier = post.identifier.clone();

            debug!("Evaluating post {}", identifier);
            let handle = self.tasks.spawn_local(async move {
                let verdict = engine
                    .evaluate(page.as_ref(), &post, &topics, &credential)
                    .await;
                (post.identifier, verdict)
            });
            self.handles.insert(identifier, handle);
        }

        info!("Scan cycle: {} new posts, {} claimed", scanned, claimed);
        Ok(CycleOutcome::Completed { scanned, claimed })
    }

    /// Aborts the task evaluating the given post.
    pub fn cancel(&mut self, identifier: &str) -> bool {
        match self.handles.remove(identifier) {
            Some(handle) => {
                handle.abort();
                debug!("Cancelled evaluation of post {}", identifier);
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        let cancelled = self.handles.len();
        self.tasks.abort_all();
        self.handles.clear();
        if cancelled > 0 {
            info!("Cancelled {} post evaluations", cancelled);
        }
    }

    /// Waits for every outstanding post task and returns the finished ones.
    pub async fn wait_idle(&mut self) -> Vec<PostOutcome> {
        let mut finished = Vec::new();
        while let Some(result) = self.tasks.join_next().await {
            finished.extend(self.finish(result));
        }
        finished
    }

    /// Runs an initial cycle, then one cycle per trigger fire until the
    /// trigger closes.
    pub async fn run(&mut self, mut debouncer: Debouncer) -> Result<(), CoreError> {
        info!(
            "Filter service started, debounce window {:?}",
            debouncer.window()
        );
        self.cycle_logged().await;
        while debouncer.next_fire().await.is_some() {
            self.cycle_logged().await;
        }

        let finished = self.wait_idle().await;
        info!(
            "Filter service stopped after {} cycles, {} posts finished in the last batch",
            debouncer.fires() + 1,
            finished.len()
        );
        Ok(())
    }

    async fn cycle_logged(&mut self) {
        match self.run_cycle().await {
            Ok(outcome) => debug!("Cycle outcome: {:?}", outcome),
            Err(e) => {
                e.log_error();
            }
        }
    }

    fn reap(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            self.finish(result);
        }
    }

    fn finish(&mut self, result: Result<PostOutcome, JoinError>) -> Option<PostOutcome> {
        let outcome = match result {
            Ok(outcome) => Some(outcome),
            Err(e) if e.is_cancelled() => None,
            Err(e) => {
                error!("Post evaluation failed: {}", e);
                None
            }
        };
        self.handles.retain(|_, handle| !handle.is_finished());
        outcome
    }
}
