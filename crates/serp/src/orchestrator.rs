// ABOUTME: Concurrent multi-query orchestration with a per-query timeout and isolated outcomes.
// ABOUTME: Composes fetch, parse, extract, sanitize and the meaningful-content check per query.

//! Query orchestration.
//!
//! [`run`] drives one future per task concurrently, races each against the
//! batch timeout and collects outcomes in input order. A failing, empty or
//! slow query never affects its siblings. [`run_batch`] wires a
//! [`DocumentProvider`] and a [`PageSchema`] into that loop.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use futures::FutureExt;
use tokio::time::{timeout, Instant};

use crate::error::SerpError;
use crate::extractors::page::extract_page;
use crate::extractors::schema::PageSchema;
use crate::extractors::Record;
use crate::observer::BatchObserver;
use crate::provider::{DocumentProvider, RawDocument};
use crate::result::{BatchEntry, BatchResult, QueryOutcome, QueryTask};
use crate::sanitize::{has_meaningful_content, sanitize, NO_CONTENT_MESSAGE};

/// Default per-query bound.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(40);

/// What happens to a query's work when its timer wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeoutPolicy {
    /// Drop the in-flight future, aborting its request.
    #[default]
    Cancel,
    /// Run each query on its own spawned task and abandon it on timeout.
    Detach,
}

/// Per-batch settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub timeout: Duration,
    pub policy: TimeoutPolicy,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            policy: TimeoutPolicy::Cancel,
        }
    }
}

impl BatchOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }

    pub fn policy(mut self, policy: TimeoutPolicy) -> Self {
        self.policy = policy;
        self
    }
}

/// Runs `process` for every task concurrently, each bounded by `options.timeout`.
///
/// `process` yields the page record, or an error. A `Blocked` error settles
/// as a soft failure; any other error as a hard failure.
pub async fn run<F, Fut>(
    tasks: Vec<QueryTask>,
    options: &BatchOptions,
    observer: &dyn BatchObserver,
    process: F,
) -> BatchResult
where
    F: Fn(QueryTask) -> Fut,
    Fut: Future<Output = Result<Record, SerpError>> + Send + 'static,
{
    let batch_started = Instant::now();
    observer.on_batch_start(tasks.len(), options.timeout);

    let runs = tasks.into_iter().map(|task| {
        let work = process(task.clone());
        async move {
            observer.on_query_start(&task);
            let started = Instant::now();
            let outcome = race(&task, work, options).await;
            observer.on_query_settled(&task, &outcome, started.elapsed());
            BatchEntry { task, outcome }
        }
    });

    let result = BatchResult {
        entries: join_all(runs).await,
    };
    observer.on_batch_end(&result, batch_started.elapsed());
    result
}

async fn race<Fut>(task: &QueryTask, work: Fut, options: &BatchOptions) -> QueryOutcome
where
    Fut: Future<Output = Result<Record, SerpError>> + Send + 'static,
{
    let bound = options.timeout;
    match options.policy {
        TimeoutPolicy::Cancel => {
            // A panic settles as this query's hard failure
            match timeout(bound, AssertUnwindSafe(work).catch_unwind()).await {
                Ok(Ok(settled)) => settle(settled),
                Ok(Err(panic)) => QueryOutcome::HardFailure(SerpError::extract(
                    task.query.as_str(),
                    "Run",
                    Some(anyhow::anyhow!("query task panicked: {}", panic_message(&*panic))),
                )),
                Err(_) => QueryOutcome::Timeout(bound),
            }
        }
        TimeoutPolicy::Detach => {
            let handle = tokio::spawn(work);
            match timeout(bound, handle).await {
                Ok(Ok(settled)) => settle(settled),
                Ok(Err(join_err)) => QueryOutcome::HardFailure(SerpError::extract(
                    task.query.as_str(),
                    "Run",
                    Some(anyhow::anyhow!("query task failed: {}", join_err)),
                )),
                // Dropping the handle detaches the task; its result is discarded
                Err(_) => QueryOutcome::Timeout(bound),
            }
        }
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

fn settle(settled: Result<Record, SerpError>) -> QueryOutcome {
    match settled {
        Ok(record) => QueryOutcome::Success(record),
        Err(e) if e.is_blocked() => QueryOutcome::SoftFailure(e.message()),
        Err(e) => QueryOutcome::HardFailure(e),
    }
}

/// Extracts, sanitizes and checks one fetched document.
pub fn process_document(
    task: &QueryTask,
    document: &RawDocument,
    schema: &PageSchema,
) -> Result<Record, SerpError> {
    let record = sanitize(extract_page(
        &document.raw_html,
        schema,
        document.base_url.as_ref(),
    ));
    if has_meaningful_content(&record, &schema.primary_keys()) {
        Ok(record)
    } else {
        Err(SerpError::blocked(
            task.query.as_str(),
            "Extract",
            Some(anyhow::anyhow!(NO_CONTENT_MESSAGE)),
        ))
    }
}

/// Fetches and extracts every task with `provider` and `schema`.
pub async fn run_batch<P>(
    tasks: Vec<QueryTask>,
    schema: Arc<PageSchema>,
    provider: Arc<P>,
    options: &BatchOptions,
    observer: &dyn BatchObserver,
) -> BatchResult
where
    P: DocumentProvider + ?Sized + 'static,
{
    run(tasks, options, observer, move |task| {
        let schema = Arc::clone(&schema);
        let provider = Arc::clone(&provider);
        async move {
            let document = provider.fetch(&task).await?;
            process_document(&task, &document, &schema)
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoOpObserver;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn record(v: serde_json::Value) -> Record {
        serde_json::from_value(v).unwrap()
    }

    #[derive(Default)]
    struct CollectingObserver {
        events: Mutex<Vec<String>>,
    }

    impl BatchObserver for CollectingObserver {
        fn on_batch_start(&self, size: usize, _timeout: Duration) {
            self.events.lock().unwrap().push(format!("start:{}", size));
        }

        fn on_query_settled(&self, task: &QueryTask, outcome: &QueryOutcome, _elapsed: Duration) {
            self.events
                .lock()
                .unwrap()
                .push(format!("{}:{}", task.query, outcome.kind()));
        }

        fn on_batch_end(&self, result: &BatchResult, _elapsed: Duration) {
            self.events
                .lock()
                .unwrap()
                .push(format!("end:{}", result.success_count()));
        }
    }

    fn delayed(ms: Option<u64>) -> impl Future<Output = Result<Record, SerpError>> + Send + 'static {
        async move {
            match ms {
                Some(ms) => {
                    tokio::time::sleep(Duration::from_millis(ms)).await;
                    Ok(record(json!({"results": [{"delay": ms}]})))
                }
                None => std::future::pending().await,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_bounds_slow_queries() {
        let tasks = vec![QueryTask::new("fast"), QueryTask::new("never")];
        let options = BatchOptions::with_timeout(Duration::from_millis(50));
        let started = Instant::now();
        let result = run(tasks, &options, &NoOpObserver, |task| {
            delayed(if task.query == "fast" { Some(10) } else { None })
        })
        .await;
        let elapsed = started.elapsed();

        assert_eq!(result.kinds(), vec!["success", "timeout"]);
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(60));
        match result.entries[1].outcome {
            QueryOutcome::Timeout(bound) => assert_eq!(bound, Duration::from_millis(50)),
            ref other => panic!("expected timeout, got {:?}", other),
        }
    }

    fn counting(
        ms: Option<u64>,
        finished: Arc<AtomicUsize>,
    ) -> impl Future<Output = Result<Record, SerpError>> + Send + 'static {
        async move {
            let settled = delayed(ms).await;
            finished.fetch_add(1, Ordering::SeqCst);
            settled
        }
    }

    async fn finished_after_timeout(policy: TimeoutPolicy) -> (BatchResult, usize) {
        let finished = Arc::new(AtomicUsize::new(0));
        let options = BatchOptions::with_timeout(Duration::from_millis(50)).policy(policy);
        let counter = Arc::clone(&finished);
        let result = run(vec![QueryTask::new("slow")], &options, &NoOpObserver, move |_task| {
            counting(Some(200), Arc::clone(&counter))
        })
        .await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        (result, finished.load(Ordering::SeqCst))
    }

    #[tokio::test(start_paused = true)]
    async fn detached_query_keeps_running_after_timeout() {
        let (result, finished) = finished_after_timeout(TimeoutPolicy::Detach).await;
        assert_eq!(result.kinds(), vec!["timeout"]);
        assert_eq!(finished, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_query_is_dropped_at_timeout() {
        let (result, finished) = finished_after_timeout(TimeoutPolicy::Cancel).await;
        assert_eq!(result.kinds(), vec!["timeout"]);
        assert_eq!(finished, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn detach_policy_times_out_the_same_way() {
        let tasks = vec![QueryTask::new("fast"), QueryTask::new("never")];
        let options =
            BatchOptions::with_timeout(Duration::from_millis(50)).policy(TimeoutPolicy::Detach);
        let result = run(tasks, &options, &NoOpObserver, |task| {
            delayed(if task.query == "fast" { Some(10) } else { None })
        })
        .await;
        assert_eq!(result.kinds(), vec!["success", "timeout"]);
    }

    #[tokio::test(start_paused = true)]
    async fn outcomes_keep_input_order() {
        let tasks: Vec<QueryTask> = (1..=4)
            .map(|i| QueryTask::new(format!("q{}", i)).with_id(i.to_string()))
            .collect();
        let result = run(tasks, &BatchOptions::default(), &NoOpObserver, |task| {
            let n: u64 = task.query[1..].parse().unwrap();
            delayed(Some(100 - n * 20))
        })
        .await;
        let queries: Vec<&str> = result.iter().map(|e| e.task.query.as_str()).collect();
        assert_eq!(queries, vec!["q1", "q2", "q3", "q4"]);
        let ids: Vec<Option<&str>> = result.iter().map(|e| e.task.query_id.as_deref()).collect();
        assert_eq!(ids, vec![Some("1"), Some("2"), Some("3"), Some("4")]);
        assert_eq!(result.success_count(), 4);
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let observer = CollectingObserver::default();
        let tasks = vec![
            QueryTask::new("ok"),
            QueryTask::new("blocked"),
            QueryTask::new("down"),
        ];
        let result = run(tasks, &BatchOptions::default(), &observer, |task| async move {
            match task.query.as_str() {
                "ok" => Ok(record(json!({"results": [1]}))),
                "blocked" => Err(SerpError::blocked(
                    "blocked",
                    "Extract",
                    Some(anyhow::anyhow!(NO_CONTENT_MESSAGE)),
                )),
                _ => Err(SerpError::fetch(
                    "down",
                    "Fetch",
                    Some(anyhow::anyhow!("HTTP error! status: 503")),
                )),
            }
        })
        .await;

        assert_eq!(result.kinds(), vec!["success", "soft_failure", "hard_failure"]);
        assert_eq!(
            result.entries[1].outcome.error_message().as_deref(),
            Some(NO_CONTENT_MESSAGE)
        );
        let events = observer.events.lock().unwrap().clone();
        assert_eq!(events.first().map(String::as_str), Some("start:3"));
        assert_eq!(events.last().map(String::as_str), Some("end:1"));
        assert!(events.contains(&"down:hard_failure".to_string()));
    }

    #[tokio::test]
    async fn panicking_detached_query_is_a_hard_failure() {
        let options = BatchOptions::default().policy(TimeoutPolicy::Detach);
        let result = run(
            vec![QueryTask::new("boom"), QueryTask::new("fine")],
            &options,
            &NoOpObserver,
            |task| async move {
                if task.query == "boom" {
                    panic!("provider exploded");
                }
                Ok(record(json!({"results": [1]})))
            },
        )
        .await;
        assert_eq!(result.kinds(), vec!["hard_failure", "success"]);
    }

    #[tokio::test]
    async fn panicking_query_is_a_hard_failure_by_default() {
        let result = run(
            vec![QueryTask::new("boom"), QueryTask::new("fine")],
            &BatchOptions::default(),
            &NoOpObserver,
            |task| async move {
                if task.query == "boom" {
                    panic!("provider exploded");
                }
                Ok(record(json!({"results": [1]})))
            },
        )
        .await;
        assert_eq!(result.kinds(), vec!["hard_failure", "success"]);
        let message = result.entries[0].outcome.error_message().unwrap_or_default();
        assert!(message.contains("provider exploded"), "{}", message);
    }

    #[tokio::test]
    async fn empty_batch() {
        let result = run(Vec::new(), &BatchOptions::default(), &NoOpObserver, |_task| {
            delayed(Some(1))
        })
        .await;
        assert!(result.is_empty());
    }

    #[test]
    fn process_document_soft_fails_without_content() {
        let schema: PageSchema = serde_json::from_value(json!({
            "container": "li.b_algo",
            "fields": {"title": {"selector": "h2"}}
        }))
        .unwrap();
        let task = QueryTask::new("rust");

        let ok = process_document(
            &task,
            &RawDocument::new(r#"<li class="b_algo"><h2>Rust</h2></li>"#),
            &schema,
        )
        .unwrap();
        assert_eq!(ok["results"], json!([{"title": "Rust", "position": 1}]));

        let err = process_document(&task, &RawDocument::new("<p>captcha</p>"), &schema).unwrap_err();
        assert!(err.is_blocked());
        assert_eq!(err.message(), NO_CONTENT_MESSAGE);
    }
}
