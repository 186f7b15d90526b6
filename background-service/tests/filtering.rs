use background_service::{
    AbortReason, AuditLog, AuditRecord, ChangeTrigger, ContentSource, CycleOutcome,
    FilterService, PageSignal, TopicRegistry, Verdict,
};
use database::{cache_key, FixedPrompt, ResultCache};
use feed_scanner::SnapshotPage;
use feedfilter_core::{
    default_topics, Analysis, AnalysisResult, ClassifierSettings, CoreError, KeyValueStore,
    MemoryStore, TopicSnapshot, CREDENTIAL_KEY,
};
use llm_interface::{ChatRequest, ChatTransport, Classifier, OpenRouterClassifier, TransportResponse};
use serde_json::json;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::LocalSet;

const ORDINARY: &str = "ordinary post";
const ELECTION: &str = "Election results are in";
const CAT: &str = "Look at my cat";
const TAKE: &str = "Interesting take";
const POLICY: &str = "This policy is a disaster and everyone involved should be ashamed";

/// Returns canned scores per text and records every call.
#[derive(Default)]
struct ScriptedClassifier {
    responses: HashMap<String, Analysis>,
    calls: RefCell<Vec<String>>,
}

impl ScriptedClassifier {
    fn with(mut self, text: &str, scores: &[(&str, f64)]) -> Self {
        self.responses.insert(
            text.to_string(),
            Analysis::Scores(AnalysisResult::from_scores(scores.iter().copied())),
        );
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Classifier for ScriptedClassifier {
    async fn classify(&self, text: &str, _topics: &TopicSnapshot, _credential: &str) -> Analysis {
        self.calls.borrow_mut().push(text.to_string());
        match text {
            "panic" => panic!("classifier blew up"),
            "hang" => std::future::pending().await,
            _ => {
                tokio::task::yield_now().await;
                self.responses.get(text).cloned().unwrap_or_else(Analysis::empty)
            }
        }
    }
}

/// Fails every request with a server error.
#[derive(Default)]
struct FailingTransport {
    sent: Cell<usize>,
}

impl ChatTransport for FailingTransport {
    async fn send(
        &self,
        _request: &ChatRequest,
        _credential: &str,
    ) -> Result<TransportResponse, CoreError> {
        self.sent.set(self.sent.get() + 1);
        Ok(TransportResponse {
            status: 503,
            body: "unavailable".to_string(),
        })
    }
}

fn tweet(id: &str, text: &str) -> String {
    format!(
        r#"<div data-testid="cellInnerDiv">
             <article data-testid="tweet">
               <a href="/someone/status/{id}">1h</a>
               <div data-testid="tweetText">{text}</div>
             </article>
           </div>"#
    )
}

fn quote_tweet(id: &str, text: &str, quoted: &str) -> String {
    format!(
        r#"<div data-testid="cellInnerDiv">
             <article data-testid="tweet">
               <a href="/someone/status/{id}">1h</a>
               <div data-testid="tweetText">{text}</div>
               <div data-testid="quoteTweet"><div data-testid="tweetText">{quoted}</div></div>
             </article>
           </div>"#
    )
}

fn page(cells: &[String]) -> Rc<SnapshotPage> {
    Rc::new(SnapshotPage::from_html(format!(
        "<html><body>{}</body></html>",
        cells.concat()
    )))
}

fn feed_classifier() -> ScriptedClassifier {
    ScriptedClassifier::default()
        .with(ORDINARY, &[("politics", 0.2), ("negativity", 0.1)])
        .with(ELECTION, &[("politics", 0.95), ("negativity", 0.1)])
        .with(CAT, &[("politics", 0.1), ("negativity", 0.05)])
        .with(TAKE, &[("politics", 0.1), ("negativity", 0.2)])
        .with(POLICY, &[("politics", 0.3), ("negativity", 0.95)])
}

async fn store_with_key() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.set_one(CREDENTIAL_KEY, json!("sk-or-test")).await.unwrap();
    store
}

type Service<C> = FilterService<MemoryStore, C, FixedPrompt, SnapshotPage>;

fn service<C: Classifier + 'static>(
    store: &Arc<MemoryStore>,
    classifier: &Arc<C>,
    page: &Rc<SnapshotPage>,
    audit: &Arc<AuditLog>,
    prompt: FixedPrompt,
) -> Service<C> {
    FilterService::new(
        store.clone(),
        classifier.clone(),
        prompt,
        page.clone(),
        default_topics(),
        audit.clone(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_feed_scenarios() {
    LocalSet::new()
        .run_until(async {
            let store = store_with_key().await;
            let classifier = Arc::new(feed_classifier());
            let audit = Arc::new(AuditLog::new());
            let page = page(&[
                tweet("12345", ORDINARY),
                tweet("67890", ELECTION),
                quote_tweet("11111", TAKE, POLICY),
            ]);
            let mut service = service(&store, &classifier, &page, &audit, FixedPrompt(None));

            let outcome = service.run_cycle().await.unwrap();
            assert_eq!(outcome, CycleOutcome::Completed { scanned: 3, claimed: 3 });

            // Claimed synchronously, before any task ran
            let pending = page.state("67890").unwrap();
            assert!(pending.processed && pending.blurred && pending.analyzing);

            let finished = service.wait_idle().await;
            assert_eq!(finished.len(), 3);

            let visible = page.state("12345").unwrap();
            assert!(!visible.hidden && !visible.blurred && !visible.analyzing);
            let hidden = page.state("67890").unwrap();
            assert!(hidden.hidden && !hidden.analyzing);
            assert!(page.state("11111").unwrap().hidden);

            assert_eq!(
                audit.find("12345"),
                Some(AuditRecord::Passed {
                    identifier: "12345".to_string(),
                    preview: ORDINARY.to_string(),
                })
            );

            let Some(AuditRecord::Hidden(post)) = audit.find("67890") else {
                panic!("67890 should be hidden");
            };
            assert_eq!(post.permalink, "https://x.com/user/status/67890");
            assert_eq!(post.triggers.len(), 1);
            assert_eq!(post.triggers[0].source, ContentSource::Main);
            assert_eq!(post.triggers[0].topic, "politics");
            assert_eq!(post.triggers[0].score, 0.95);
            assert_eq!(post.triggers[0].threshold, 0.8);

            let Some(AuditRecord::Hidden(quoted)) = audit.find("11111") else {
                panic!("11111 should be hidden");
            };
            assert_eq!(quoted.quoted_text.as_deref(), Some(POLICY));
            assert_eq!(quoted.triggers.len(), 1);
            assert_eq!(quoted.triggers[0].source, ContentSource::Quoted);
            assert_eq!(quoted.triggers[0].topic, "negativity");
            assert_eq!(quoted.triggers[0].score, 0.95);
            assert_eq!(quoted.triggers[0].threshold, 0.9);
            assert_eq!(audit.hidden_count(), 2);

            assert!(store.get_one(&cache_key("12345")).await.unwrap().is_some());
            assert!(store.get_one(&cache_key("67890")).await.unwrap().is_some());
            assert!(store.get_one(&cache_key("11111")).await.unwrap().is_some());
            assert!(store.get_one(&cache_key("11111_quoted")).await.unwrap().is_some());
            assert_eq!(classifier.calls().len(), 4);
        })
        .await;
}

#[tokio::test]
async fn test_exhausted_classifier_caches_empty_result() {
    LocalSet::new()
        .run_until(async {
            let store = store_with_key().await;
            let classifier = Arc::new(OpenRouterClassifier::new(
                FailingTransport::default(),
                ClassifierSettings::default(),
            ));
            let audit = Arc::new(AuditLog::new());
            let page = page(&[tweet("22222", "Some post")]);
            let mut service = service(&store, &classifier, &page, &audit, FixedPrompt(None));

            service.run_cycle().await.unwrap();
            let finished = service.wait_idle().await;

            assert_eq!(finished, vec![("22222".to_string(), Verdict::Passed)]);
            assert_eq!(classifier.metrics().get_metrics().await.total_attempts, 3);
            assert_eq!(
                store.get_one(&cache_key("22222")).await.unwrap(),
                Some(json!({}))
            );
            assert!(!page.state("22222").unwrap().blurred);

            // The empty result stays cached until the cache is cleared
            let mut fresh = service_for_new_page(&store, &classifier, &audit);
            fresh.run_cycle().await.unwrap();
            fresh.wait_idle().await;
            assert_eq!(classifier.metrics().get_metrics().await.total_attempts, 3);

            assert_eq!(ResultCache::new(store.clone()).clear_all().await.unwrap(), 1);
            assert!(store.get_one(CREDENTIAL_KEY).await.unwrap().is_some());
        })
        .await;
}

fn service_for_new_page<C: Classifier + 'static>(
    store: &Arc<MemoryStore>,
    classifier: &Arc<C>,
    audit: &Arc<AuditLog>,
) -> Service<C> {
    let page = page(&[tweet("22222", "Some post")]);
    service(store, classifier, &page, audit, FixedPrompt(None))
}

#[tokio::test]
async fn test_cycles_are_idempotent() {
    LocalSet::new()
        .run_until(async {
            let store = store_with_key().await;
            let classifier = Arc::new(feed_classifier());
            let audit = Arc::new(AuditLog::new());
            let page = page(&[tweet("12345", ELECTION), tweet("67890", CAT)]);
            let mut service = service(&store, &classifier, &page, &audit, FixedPrompt(None));

            service.run_cycle().await.unwrap();
            // Second cycle while the first batch is still in flight
            let second = service.run_cycle().await.unwrap();
            assert_eq!(second, CycleOutcome::Completed { scanned: 0, claimed: 0 });
            service.wait_idle().await;

            // The feed re-renders the same posts
            page.replace_html(format!(
                "<html><body>{}{}</body></html>",
                tweet("67890", CAT),
                tweet("12345", ELECTION)
            ));
            let third = service.run_cycle().await.unwrap();
            assert_eq!(third, CycleOutcome::Completed { scanned: 0, claimed: 0 });
            service.wait_idle().await;

            assert_eq!(classifier.calls().len(), 2);
            assert_eq!(audit.len(), 2);
        })
        .await;
}

#[tokio::test]
async fn test_cached_results_skip_classification() {
    LocalSet::new()
        .run_until(async {
            let store = store_with_key().await;
            ResultCache::new(store.clone())
                .put(
                    "12345",
                    &Analysis::Scores(AnalysisResult::from_scores([("politics", 0.99)])),
                )
                .await
                .unwrap();

            let classifier = Arc::new(feed_classifier());
            let audit = Arc::new(AuditLog::new());
            let page = page(&[tweet("12345", CAT)]);
            let mut service = service(&store, &classifier, &page, &audit, FixedPrompt(None));

            service.run_cycle().await.unwrap();
            service.wait_idle().await;

            assert!(classifier.calls().is_empty());
            assert!(page.state("12345").unwrap().hidden);
        })
        .await;
}

#[tokio::test]
async fn test_malformed_result_reveals_post() {
    LocalSet::new()
        .run_until(async {
            let store = store_with_key().await;
            store
                .set_one(&cache_key("12345"), json!("politics: high"))
                .await
                .unwrap();

            let classifier = Arc::new(feed_classifier());
            let audit = Arc::new(AuditLog::new());
            let page = page(&[tweet("12345", ELECTION)]);
            let mut service = service(&store, &classifier, &page, &audit, FixedPrompt(None));

            service.run_cycle().await.unwrap();
            let finished = service.wait_idle().await;

            assert_eq!(finished[0].1, Verdict::Skipped);
            let state = page.state("12345").unwrap();
            assert!(!state.hidden && !state.blurred && !state.analyzing);
            assert!(matches!(audit.find("12345"), Some(AuditRecord::Skipped { .. })));
        })
        .await;
}

#[tokio::test]
async fn test_declined_credential_aborts_cycle() {
    LocalSet::new()
        .run_until(async {
            let store = Arc::new(MemoryStore::new());
            let classifier = Arc::new(feed_classifier());
            let audit = Arc::new(AuditLog::new());
            let page = page(&[tweet("12345", ELECTION)]);
            let mut service = service(&store, &classifier, &page, &audit, FixedPrompt(None));

            let outcome = service.run_cycle().await.unwrap();

            assert_eq!(outcome, CycleOutcome::Aborted(AbortReason::CredentialDeclined));
            assert!(page.state("12345").is_none());
            assert!(classifier.calls().is_empty());
        })
        .await;
}

#[tokio::test]
async fn test_prompted_credential_is_persisted() {
    LocalSet::new()
        .run_until(async {
            let store = Arc::new(MemoryStore::new());
            let classifier = Arc::new(feed_classifier());
            let audit = Arc::new(AuditLog::new());
            let page = page(&[tweet("67890", CAT)]);
            let prompt = FixedPrompt(Some("  sk-or-typed  ".to_string()));
            let mut service = service(&store, &classifier, &page, &audit, prompt);

            let outcome = service.run_cycle().await.unwrap();
            service.wait_idle().await;

            assert_eq!(outcome, CycleOutcome::Completed { scanned: 1, claimed: 1 });
            assert_eq!(
                store.get_one(CREDENTIAL_KEY).await.unwrap(),
                Some(json!("sk-or-typed"))
            );
        })
        .await;
}

#[tokio::test]
async fn test_no_enabled_topics_aborts_cycle() {
    LocalSet::new()
        .run_until(async {
            let store = store_with_key().await;
            let registry = TopicRegistry::new(store.clone(), default_topics());
            registry.toggle("politics").await.unwrap();
            registry.toggle("negativity").await.unwrap();

            let classifier = Arc::new(feed_classifier());
            let audit = Arc::new(AuditLog::new());
            let page = page(&[tweet("12345", ELECTION)]);
            let mut service = service(&store, &classifier, &page, &audit, FixedPrompt(None));

            assert!(service.load_topics().await.is_empty());
            let outcome = service.run_cycle().await.unwrap();
            assert_eq!(outcome, CycleOutcome::Aborted(AbortReason::NoEnabledTopics));
        })
        .await;
}

#[tokio::test]
async fn test_topic_edits_apply_next_cycle() {
    LocalSet::new()
        .run_until(async {
            let store = store_with_key().await;
            let classifier = Arc::new(feed_classifier());
            let audit = Arc::new(AuditLog::new());
            let page = page(&[tweet("12345", ELECTION)]);
            let mut service = service(&store, &classifier, &page, &audit, FixedPrompt(None));

            TopicRegistry::new(store.clone(), default_topics())
                .set_threshold("politics", 0.99)
                .await
                .unwrap();

            service.run_cycle().await.unwrap();
            service.wait_idle().await;
            assert!(!page.state("12345").unwrap().hidden);
        })
        .await;
}

#[tokio::test]
async fn test_cancel_and_panic_isolation() {
    LocalSet::new()
        .run_until(async {
            let store = store_with_key().await;
            let classifier = Arc::new(feed_classifier());
            let audit = Arc::new(AuditLog::new());
            let page = page(&[
                tweet("1", "hang"),
                tweet("2", "panic"),
                tweet("3", CAT),
            ]);
            let mut service = service(&store, &classifier, &page, &audit, FixedPrompt(None));

            service.run_cycle().await.unwrap();
            assert_eq!(service.in_flight(), 3);
            assert!(service.cancel("1"));
            assert!(!service.cancel("1"));

            let finished = service.wait_idle().await;
            assert_eq!(finished, vec![("3".to_string(), Verdict::Passed)]);
            assert!(page.state("1").unwrap().analyzing);
            assert_eq!(service.in_flight(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_run_until_trigger_closes() {
    LocalSet::new()
        .run_until(async {
            let store = store_with_key().await;
            let classifier = Arc::new(feed_classifier());
            let audit = Arc::new(AuditLog::new());
            let page = page(&[tweet("12345", ELECTION)]);
            let mut service = service(&store, &classifier, &page, &audit, FixedPrompt(None));

            let (handle, debouncer) = ChangeTrigger::new(Duration::from_millis(300));
            let feed = page.clone();
            tokio::task::spawn_local(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                feed.replace_html(format!(
                    "<html><body>{}{}</body></html>",
                    tweet("12345", ELECTION),
                    tweet("67890", CAT)
                ));
                handle.signal(PageSignal::Mutation { added_nodes: 1 });
            });

            service.run(debouncer).await.unwrap();

            assert!(page.state("12345").unwrap().hidden);
            assert_eq!(page.state("67890").unwrap().label(), "visible");
            assert_eq!(classifier.calls().len(), 2);
        })
        .await;
}
