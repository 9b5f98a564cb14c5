// TestDependencies - mock implementations for testing
//
// Provides mock collaborators that can be injected into ServerDeps for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::deps::ServerDeps;
use super::traits::{
    BaseGraphGenerator, BaseUrlScraper, GraphWatch, Invocation, UrlPreview, WatchUpdate,
};
use crate::common::{ProcessorError, Result};
use crate::domains::graph_searches::{GraphResult, InMemoryGraphSearchStore};
use crate::domains::processors::InMemoryProcessorStore;

/// Build a result with `nodes` nodes and `edges` edges.
pub fn graph_result(nodes: usize, edges: usize) -> GraphResult {
    GraphResult {
        nodes: (0..nodes).map(|i| json!({ "id": format!("n{i}") })).collect(),
        edges: (0..edges)
            .map(|i| json!({ "source": format!("n{i}"), "target": format!("n{}", i + 1) }))
            .collect(),
        metadata: json!({ "generator": "mock" }),
    }
}

// =============================================================================
// Mock Graph Generator
// =============================================================================

/// One scripted step of a watched invocation.
pub enum WatchStep {
    Update(WatchUpdate),
    TransientError(String),
    Failure(String),
}

/// Scripted outcome of one `invoke` call.
pub enum MockInvocation {
    Completed(GraphResult),
    Failed(String),
    /// Steps are replayed in order, then `Pending` forever.
    Watched(Vec<WatchStep>),
    /// Never returns; pair with a tool timeout.
    Hang,
}

/// Arguments captured from an invoke call
#[derive(Debug, Clone)]
pub struct InvokeCallArgs {
    pub name: String,
    pub options: Value,
}

pub struct MockGraphGenerator {
    responses: Arc<Mutex<VecDeque<MockInvocation>>>,
    calls: Arc<Mutex<Vec<InvokeCallArgs>>>,
    released: Arc<AtomicUsize>,
}

impl MockGraphGenerator {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(Mutex::new(VecDeque::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            released: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn push(self, response: MockInvocation) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    pub fn with_result(self, result: GraphResult) -> Self {
        self.push(MockInvocation::Completed(result))
    }

    pub fn with_failure(self, message: &str) -> Self {
        self.push(MockInvocation::Failed(message.to_string()))
    }

    pub fn with_watch(self, steps: Vec<WatchStep>) -> Self {
        self.push(MockInvocation::Watched(steps))
    }

    pub fn hanging(self) -> Self {
        self.push(MockInvocation::Hang)
    }

    pub fn calls(&self) -> Vec<InvokeCallArgs> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of watch handles released so far.
    pub fn released_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Default for MockGraphGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseGraphGenerator for MockGraphGenerator {
    async fn invoke(&self, name: &str, options: &Value) -> Result<Invocation> {
        self.calls.lock().unwrap().push(InvokeCallArgs {
            name: name.to_string(),
            options: options.clone(),
        });

        let response = self.responses.lock().unwrap().pop_front();
        match response {
            None => Ok(Invocation::Completed(GraphResult::default())),
            Some(MockInvocation::Completed(result)) => Ok(Invocation::Completed(result)),
            Some(MockInvocation::Failed(message)) => Err(ProcessorError::ExternalTool(message)),
            Some(MockInvocation::Watched(steps)) => Ok(Invocation::Watched(Box::new(MockGraphWatch {
                steps: steps.into(),
                released: self.released.clone(),
            }))),
            Some(MockInvocation::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Invocation::Completed(GraphResult::default()))
            }
        }
    }

    fn version(&self) -> String {
        "0.0.0-mock".to_string()
    }

    fn provider(&self) -> &str {
        "mock-graph-generator"
    }
}

struct MockGraphWatch {
    steps: VecDeque<WatchStep>,
    released: Arc<AtomicUsize>,
}

#[async_trait]
impl GraphWatch for MockGraphWatch {
    async fn poll(&mut self) -> Result<WatchUpdate> {
        match self.steps.pop_front() {
            None => Ok(WatchUpdate::Pending),
            Some(WatchStep::Update(update)) => Ok(update),
            Some(WatchStep::TransientError(message)) => Err(ProcessorError::TransientRead(message)),
            Some(WatchStep::Failure(message)) => Err(ProcessorError::ExternalTool(message)),
        }
    }

    async fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Mock URL Scraper
// =============================================================================

pub struct MockUrlScraper {
    content_type: Arc<Mutex<String>>,
    preview: Arc<Mutex<Option<UrlPreview>>>,
    fail_preview: Arc<Mutex<bool>>,
    resolve_calls: Arc<Mutex<Vec<String>>>,
    preview_calls: Arc<Mutex<Vec<String>>>,
}

impl MockUrlScraper {
    pub fn new() -> Self {
        Self {
            content_type: Arc::new(Mutex::new(String::new())),
            preview: Arc::new(Mutex::new(None)),
            fail_preview: Arc::new(Mutex::new(false)),
            resolve_calls: Arc::new(Mutex::new(Vec::new())),
            preview_calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_content_type(self, content_type: &str) -> Self {
        *self.content_type.lock().unwrap() = content_type.to_string();
        self
    }

    pub fn with_preview(self, preview: UrlPreview) -> Self {
        *self.preview.lock().unwrap() = Some(preview);
        self
    }

    pub fn failing_preview(self) -> Self {
        *self.fail_preview.lock().unwrap() = true;
        self
    }

    pub fn resolve_calls(&self) -> Vec<String> {
        self.resolve_calls.lock().unwrap().clone()
    }

    pub fn preview_calls(&self) -> Vec<String> {
        self.preview_calls.lock().unwrap().clone()
    }
}

impl Default for MockUrlScraper {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseUrlScraper for MockUrlScraper {
    async fn resolve_type(&self, url: &str) -> Result<String> {
        self.resolve_calls.lock().unwrap().push(url.to_string());
        Ok(self.content_type.lock().unwrap().clone())
    }

    async fn fetch_preview(&self, url: &str) -> Result<UrlPreview> {
        self.preview_calls.lock().unwrap().push(url.to_string());

        if *self.fail_preview.lock().unwrap() {
            return Err(ProcessorError::UrlScraper(anyhow!("preview unavailable for {url}")));
        }

        let preview = self.preview.lock().unwrap().clone();
        Ok(preview.unwrap_or_else(|| UrlPreview {
            url: url.to_string(),
            title: Some("Mock page".to_string()),
            description: None,
            site: None,
            image: None,
            scraped_at: Utc::now(),
        }))
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// In-memory stores plus mocks, with handles kept for assertions.
#[derive(Clone)]
pub struct TestDependencies {
    pub graph_generator: Arc<MockGraphGenerator>,
    pub url_scraper: Arc<MockUrlScraper>,
    pub graph_searches: Arc<InMemoryGraphSearchStore>,
    pub processors: Arc<InMemoryProcessorStore>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            graph_generator: Arc::new(MockGraphGenerator::new()),
            url_scraper: Arc::new(MockUrlScraper::new()),
            graph_searches: Arc::new(InMemoryGraphSearchStore::new()),
            processors: Arc::new(InMemoryProcessorStore::new()),
        }
    }

    pub fn with_graph_generator(mut self, generator: MockGraphGenerator) -> Self {
        self.graph_generator = Arc::new(generator);
        self
    }

    pub fn with_url_scraper(mut self, scraper: MockUrlScraper) -> Self {
        self.url_scraper = Arc::new(scraper);
        self
    }

    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps {
            db_pool: None,
            graph_searches: self.graph_searches.clone(),
            processors: self.processors.clone(),
            graph_generator: self.graph_generator.clone(),
            url_scraper: self.url_scraper.clone(),
        }
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}
