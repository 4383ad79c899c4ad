/*!
 * Common test utilities for the docflow test suite
 */

use std::sync::Arc;

use docflow::app_config::Config;
use docflow::app_controller::{Controller, Services};
use docflow::bootstrap::{MemoryFunctionConfigStore, MemoryPolicyStore};
use docflow::memory::InMemoryIndex;
use docflow::providers::mock::{MockEmbeddings, MockGeneration, MockMailer};
use docflow::storage::MemoryBlobStore;
use docflow::workflow::MemoryRunStore;

pub const DOCS_BUCKET: &str = "docs";

/// Mock collaborators kept around so tests can inspect them after a run
#[derive(Debug, Clone)]
pub struct MockServices {
    pub store: MemoryBlobStore,
    pub generator: MockGeneration,
    pub mailer: MockMailer,
    pub index: InMemoryIndex,
    pub policies: MemoryPolicyStore,
    pub functions: MemoryFunctionConfigStore,
    pub runs: MemoryRunStore,
}

/// Route workflow logs to the test harness; set RUST_LOG to see them
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

impl MockServices {
    pub fn new(generator: MockGeneration) -> Self {
        init_logging();
        Self {
            store: MemoryBlobStore::new(),
            generator,
            mailer: MockMailer::working(),
            index: InMemoryIndex::new(),
            policies: MemoryPolicyStore::new(),
            functions: MemoryFunctionConfigStore::new(),
            runs: MemoryRunStore::new(),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            store: Arc::new(self.store.clone()),
            embedder: Arc::new(MockEmbeddings::working()),
            generator: Arc::new(self.generator.clone()),
            mailer: Arc::new(self.mailer.clone()),
            index: Arc::new(self.index.clone()),
            policies: Arc::new(self.policies.clone()),
            functions: Arc::new(self.functions.clone()),
            runs: Arc::new(self.runs.clone()),
        }
    }

    pub fn controller(&self, config: Config) -> Controller {
        Controller::with_services(config, self.services())
    }
}

/// Configuration with small sections and notifications to a fixed reader
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.storage.documents_bucket = DOCS_BUCKET.to_string();
    config.workflow.max_section_chars = 10;
    config.workflow.max_concurrency = 3;
    config.notifications.enabled = true;
    config.notifications.sender_email = Some("noreply@example.com".to_string());
    config.notifications.default_recipient = Some("reader@example.com".to_string());
    config
}

/// Body with `count` one-paragraph sections under a 10 character limit
pub fn section_body(count: usize) -> String {
    (1..=count).map(|i| format!("Part {}", i)).collect::<Vec<_>>().join("\n\n")
}
