use std::sync::{Arc, Mutex, MutexGuard};

use super::enhancer::ResilientEnhancer;
use super::ollama::OllamaClient;
use super::types::{GenerationClient, ReportBundle, Sleeper, TokioSleeper};
use super::EnhanceError;
use crate::cache::{CacheKey, CacheStore};
use crate::config::AppConfig;
use crate::report::{AnalysisRequest, InputReport, ReportSource, ReportSourceError};

/// Cache store shared between the orchestrator and whoever owns its lifecycle.
pub type SharedCache = Arc<Mutex<CacheStore>>;

/// Entry point for callers: serves cached bundles and enhances on a miss.
///
/// The cache lock is only taken for synchronous store operations and is
/// always released before the enhancer suspends.
pub struct EnhancementOrchestrator<C, S = TokioSleeper> {
    enhancer: ResilientEnhancer<C, S>,
    cache: SharedCache,
}

impl EnhancementOrchestrator<OllamaClient> {
    /// Orchestrator backed by Ollama and a fresh cache, both built from `config`.
    pub fn from_config(config: &AppConfig) -> Result<Self, EnhanceError> {
        let client = OllamaClient::from_config(&config.enhancer)?;
        let enhancer = ResilientEnhancer::new(client, config.enhancer.clone());
        let cache = Arc::new(Mutex::new(CacheStore::new(config.cache)));
        Ok(Self::new(enhancer, cache))
    }
}

impl<C: GenerationClient, S: Sleeper> EnhancementOrchestrator<C, S> {
    pub fn new(enhancer: ResilientEnhancer<C, S>, cache: SharedCache) -> Self {
        Self { enhancer, cache }
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn enhancer(&self) -> &ResilientEnhancer<C, S> {
        &self.enhancer
    }

    /// Return the cached bundle for `key` when allowed, otherwise enhance
    /// `report` and cache the result unless it carries an error.
    #[tracing::instrument(skip_all, fields(key = %key, use_cache))]
    pub async fn process(&self, report: InputReport, key: &CacheKey, use_cache: bool) -> ReportBundle {
        if use_cache {
            if let Some(hit) = self.cached(key) {
                tracing::debug!("Cache hit");
                return hit;
            }
            tracing::debug!("Cache miss");
        }

        let bundle = self.enhancer.enhance(report).await;
        self.store(key, &bundle);
        bundle
    }

    /// Full request flow: cache check before the (expensive) analysis, then
    /// analysis, enhancement and cache write.
    ///
    /// The analysis is blocking work and runs on the blocking pool. Only a
    /// failing `source` is reported as an error; enhancement failures come
    /// back inside the bundle.
    pub async fn analyze<R>(
        &self,
        request: &AnalysisRequest,
        source: Arc<R>,
    ) -> Result<ReportBundle, ReportSourceError>
    where
        R: ReportSource + ?Sized + 'static,
    {
        let key = request.cache_key();
        if request.use_cache {
            if let Some(hit) = self.cached(&key) {
                tracing::debug!(key = %key, "Cache hit, skipping analysis");
                return Ok(hit);
            }
        }

        let owned = request.clone();
        let report = tokio::task::spawn_blocking(move || source.analyze(&owned))
            .await
            .map_err(|e| ReportSourceError::Analysis(format!("Analysis task failed: {e}")))??;
        let bundle = self.enhancer.enhance(report).await;
        self.store(&key, &bundle);
        Ok(bundle)
    }

    /// Live cached bundle for `key`, if any.
    pub fn cached(&self, key: &CacheKey) -> Option<ReportBundle> {
        self.lock_cache().get(key).map(|entry| entry.value().clone())
    }

    /// Drop every cached result for `source` (keys prefixed `source:`).
    pub fn invalidate(&self, source: &str) -> usize {
        let removed = self.lock_cache().clear_source(source);
        tracing::info!(source, removed, "Invalidated cached analyses");
        removed
    }

    /// Drop every cached result.
    pub fn invalidate_all(&self) -> usize {
        let removed = self.lock_cache().clear_all();
        tracing::info!(removed, "Cleared analysis cache");
        removed
    }

    fn store(&self, key: &CacheKey, bundle: &ReportBundle) {
        if bundle.is_error() {
            tracing::debug!(key = %key, "Not caching failed enhancement");
            return;
        }
        self.lock_cache().set(key.clone(), bundle.clone());
    }

    // Every store operation completes inside one acquisition, so a poisoned
    // lock still guards a consistent map.
    fn lock_cache(&self) -> MutexGuard<'_, CacheStore> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::super::enhancer::test_support::{RecordingSleeper, ScriptedClient, Step};
    use super::super::EnhancedSummary;
    use super::*;
    use crate::config::{CacheConfig, EnhancerConfig};

    type TestOrchestrator = EnhancementOrchestrator<Arc<ScriptedClient>, RecordingSleeper>;

    fn orchestrator(client: ScriptedClient, max_entries: usize) -> (TestOrchestrator, Arc<ScriptedClient>) {
        let client = Arc::new(client);
        let enhancer = ResilientEnhancer::with_sleeper(
            Arc::clone(&client),
            RecordingSleeper::default(),
            EnhancerConfig {
                retries: 2,
                backoff_multiplier: 1.0,
                ..EnhancerConfig::default()
            },
        );
        let cache = Arc::new(Mutex::new(CacheStore::new(CacheConfig {
            ttl: Duration::from_secs(3600),
            max_entries,
        })));
        (EnhancementOrchestrator::new(enhancer, cache), client)
    }

    fn report() -> InputReport {
        InputReport::new("# Project", "tree", "details")
    }

    fn key(source: &str) -> CacheKey {
        CacheKey::new(source, "main", 1000)
    }

    struct CountingSource {
        calls: AtomicUsize,
        fail: bool,
        delay: Duration,
    }

    impl CountingSource {
        fn new(fail: bool) -> Arc<Self> {
            Self::slow(fail, Duration::ZERO)
        }

        fn slow(fail: bool, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
                delay,
            })
        }
    }

    impl ReportSource for CountingSource {
        fn analyze(&self, request: &AnalysisRequest) -> Result<InputReport, ReportSourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(ReportSourceError::Acquisition(
                    request.repo_url.clone(),
                    "clone failed".into(),
                ));
            }
            Ok(InputReport::new(&request.repo_url, "tree", "details"))
        }
    }

    #[tokio::test]
    async fn second_cached_call_issues_no_remote_call() {
        let (orch, client) = orchestrator(ScriptedClient::always(Step::Reply(r#"{"a": 1}"#)), 10);

        let first = orch.process(report(), &key("repo"), true).await;
        let second = orch.process(report(), &key("repo"), true).await;

        assert_eq!(client.calls(), 1);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn use_cache_false_always_enhances_and_refreshes() {
        let script = ScriptedClient::new(vec![Step::Reply(r#"{"v": 1}"#), Step::Reply(r#"{"v": 2}"#)]);
        let (orch, client) = orchestrator(script, 10);

        orch.process(report(), &key("repo"), true).await;
        let fresh = orch.process(report(), &key("repo"), false).await;

        assert_eq!(client.calls(), 2);
        assert_eq!(fresh.enhanced_summary.as_structured().unwrap()["v"], 2);
        let cached = orch.cached(&key("repo")).unwrap();
        assert_eq!(cached.enhanced_summary.as_structured().unwrap()["v"], 2);
    }

    #[tokio::test]
    async fn failed_enhancement_is_not_cached() {
        let script = ScriptedClient::new(vec![
            Step::Fail(500),
            Step::Fail(500),
            Step::Fail(500),
            Step::Reply(r#"{"ok": true}"#),
        ]);
        let (orch, client) = orchestrator(script, 10);

        let failed = orch.process(report(), &key("repo"), true).await;
        assert!(failed.is_error());
        assert!(orch.cached(&key("repo")).is_none());

        let retried = orch.process(report(), &key("repo"), true).await;
        assert_eq!(client.calls(), 4);
        assert!(!retried.is_error());
        assert!(orch.cached(&key("repo")).is_some());
    }

    #[tokio::test]
    async fn raw_text_result_is_cached() {
        let (orch, client) = orchestrator(ScriptedClient::always(Step::Reply("just prose")), 10);

        orch.process(report(), &key("repo"), true).await;
        let hit = orch.process(report(), &key("repo"), true).await;

        assert_eq!(client.calls(), 1);
        assert_eq!(
            hit.enhanced_summary,
            EnhancedSummary::Raw {
                text: "just prose".into()
            }
        );
    }

    #[tokio::test]
    async fn invalidate_scopes_to_source_prefix() {
        let (orch, client) = orchestrator(ScriptedClient::always(Step::Reply(r#"{"a": 1}"#)), 10);
        orch.process(report(), &CacheKey::new("repo", "main", 1000), true).await;
        orch.process(report(), &CacheKey::new("repo", "dev", 1000), true).await;
        orch.process(report(), &CacheKey::new("other", "main", 1000), true).await;

        assert_eq!(orch.invalidate("repo"), 2);
        assert!(orch.cached(&CacheKey::new("other", "main", 1000)).is_some());

        orch.process(report(), &CacheKey::new("repo", "main", 1000), true).await;
        assert_eq!(client.calls(), 4, "Invalidated key must be recomputed");
    }

    #[tokio::test]
    async fn invalidate_all_empties_cache() {
        let (orch, _client) = orchestrator(ScriptedClient::always(Step::Reply(r#"{"a": 1}"#)), 10);
        orch.process(report(), &key("a"), true).await;
        orch.process(report(), &key("b"), true).await;

        assert_eq!(orch.invalidate_all(), 2);
        assert_eq!(orch.invalidate_all(), 0);
        assert!(orch.cache().lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cache_capacity_is_respected() {
        let (orch, _client) = orchestrator(ScriptedClient::always(Step::Reply(r#"{"a": 1}"#)), 2);
        for source in ["a", "b", "c", "d"] {
            orch.process(report(), &key(source), true).await;
        }
        assert_eq!(orch.cache().lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn analyze_hit_skips_analysis_and_enhancement() {
        let (orch, client) = orchestrator(ScriptedClient::always(Step::Reply(r#"{"a": 1}"#)), 10);
        let source = CountingSource::new(false);
        let request = AnalysisRequest::new("https://github.com/a/b");

        let first = orch.analyze(&request, Arc::clone(&source)).await.unwrap();
        let second = orch.analyze(&request, Arc::clone(&source)).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
        assert_eq!(client.calls(), 1);
        assert_eq!(first, second);
        assert_eq!(first.report_tree.heading, "https://github.com/a/b");
        assert!(orch.cached(&request.cache_key()).is_some());
    }

    #[tokio::test]
    async fn analyze_without_cache_reruns_source() {
        let (orch, client) = orchestrator(ScriptedClient::always(Step::Reply(r#"{"a": 1}"#)), 10);
        let source = CountingSource::new(false);
        let mut request = AnalysisRequest::new("repo");
        request.use_cache = false;

        orch.analyze(&request, Arc::clone(&source)).await.unwrap();
        orch.analyze(&request, Arc::clone(&source)).await.unwrap();

        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
        assert_eq!(client.calls(), 2);
    }

    #[tokio::test]
    async fn analyze_propagates_source_failure_without_remote_call() {
        let (orch, client) = orchestrator(ScriptedClient::always(Step::Reply(r#"{"a": 1}"#)), 10);
        let source = CountingSource::new(true);

        let err = orch
            .analyze(&AnalysisRequest::new("repo"), Arc::clone(&source))
            .await
            .unwrap_err();

        assert!(matches!(err, ReportSourceError::Acquisition(ref url, _) if url == "repo"));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn slow_analysis_does_not_stall_other_tasks() {
        let (orch, _client) = orchestrator(ScriptedClient::always(Step::Reply(r#"{"a": 1}"#)), 10);
        let source = CountingSource::slow(false, Duration::from_millis(500));

        let start = Instant::now();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            start.elapsed()
        });

        let bundle = orch
            .analyze(&AnalysisRequest::new("repo"), Arc::clone(&source))
            .await
            .unwrap();
        let timer_fired_after = timer.await.unwrap();

        assert!(!bundle.is_error());
        assert!(
            timer_fired_after < Duration::from_millis(250),
            "Timer delayed to {timer_fired_after:?} by the analysis"
        );
        assert!(start.elapsed() >= Duration::from_millis(500));
    }

    #[tokio::test]
    async fn panicking_analysis_is_reported_as_analysis_error() {
        struct PanickingSource;

        impl ReportSource for PanickingSource {
            fn analyze(&self, _request: &AnalysisRequest) -> Result<InputReport, ReportSourceError> {
                panic!("walker crashed");
            }
        }

        let (orch, client) = orchestrator(ScriptedClient::always(Step::Reply(r#"{"a": 1}"#)), 10);

        let err = orch
            .analyze(&AnalysisRequest::new("repo"), Arc::new(PanickingSource))
            .await
            .unwrap_err();

        assert!(matches!(err, ReportSourceError::Analysis(_)), "got: {err}");
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn from_config_builds_ollama_orchestrator() {
        let orch = EnhancementOrchestrator::from_config(&AppConfig::default()).unwrap();
        assert_eq!(orch.enhancer().client().base_url(), "http://localhost:11434");
        assert_eq!(orch.cache().lock().unwrap().capacity(), 500);
    }
}
