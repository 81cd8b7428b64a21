//! Evidence source adapter over the local index and web search backends.
//!
//! Lookups never touch pipeline state; the orchestrator decides what to do
//! with the passages returned here.

use crate::collaborators::{LocalIndex, WebSearchBackend};
use crate::state::EvidencePassage;
use chrono::NaiveDate;
use cityhub_core::AppResult;
use std::sync::Arc;

pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_WEB_RESULTS: usize = 3;

/// Source of "today" for temporal query augmentation.
pub type Clock = Arc<dyn Fn() -> NaiveDate + Send + Sync>;

#[derive(Clone)]
pub struct EvidenceSources {
    local: Arc<dyn LocalIndex>,
    web: Arc<dyn WebSearchBackend>,
    top_k: usize,
    web_results: usize,
    clock: Clock,
}

impl EvidenceSources {
    pub fn new(local: Arc<dyn LocalIndex>, web: Arc<dyn WebSearchBackend>) -> Self {
        Self {
            local,
            web,
            top_k: DEFAULT_TOP_K,
            web_results: DEFAULT_WEB_RESULTS,
            clock: Arc::new(|| chrono::Local::now().date_naive()),
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_web_results(mut self, count: usize) -> Self {
        self.web_results = count;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Up to top-K local passages in similarity order. Empty is not an error.
    pub async fn retrieve_local(&self, question: &str) -> AppResult<Vec<EvidencePassage>> {
        let passages = self.local.lookup(question, self.top_k).await?;
        Ok(passages
            .into_iter()
            .take(self.top_k)
            .map(EvidencePassage::local)
            .collect())
    }

    /// Search the web and fold the snippets into one passage.
    pub async fn search_web(&self, question: &str) -> AppResult<EvidencePassage> {
        let query = self.web_query(question);
        tracing::debug!(query = %query, "Web search query");

        let snippets = self.web.search(&query, self.web_results).await?;
        Ok(EvidencePassage::web(
            snippets
                .into_iter()
                .take(self.web_results)
                .collect::<Vec<_>>()
                .join("\n"),
        ))
    }

    /// The query text actually sent to the web backend.
    pub fn web_query(&self, question: &str) -> String {
        if has_temporal_marker(question) {
            augment_query(question, (self.clock)())
        } else {
            question.to_string()
        }
    }
}

/// Whether the question asks about the present ("now", "right now").
pub fn has_temporal_marker(question: &str) -> bool {
    question
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("now"))
}

/// Pin a present-tense question to a calendar date.
pub fn augment_query(question: &str, today: NaiveDate) -> String {
    format!("{} around {}", question.trim_end(), today.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedIndex(Vec<&'static str>);

    #[async_trait]
    impl LocalIndex for FixedIndex {
        async fn lookup(&self, _query: &str, _k: usize) -> AppResult<Vec<String>> {
            Ok(self.0.iter().map(|s| s.to_string()).collect())
        }
    }

    #[derive(Default)]
    struct RecordingSearch {
        queries: Mutex<Vec<(String, usize)>>,
    }

    #[async_trait]
    impl WebSearchBackend for RecordingSearch {
        async fn search(&self, query: &str, count: usize) -> AppResult<Vec<String>> {
            self.queries
                .lock()
                .unwrap()
                .push((query.to_string(), count));
            Ok(vec!["first".to_string(), "second".to_string()])
        }
    }

    fn fixed_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
    }

    fn sources(search: Arc<RecordingSearch>) -> EvidenceSources {
        EvidenceSources::new(
            Arc::new(FixedIndex(vec!["a", "b", "c", "d"])),
            search,
        )
        .with_clock(Arc::new(fixed_date))
    }

    #[test]
    fn test_temporal_marker_is_whole_word() {
        assert!(has_temporal_marker("What events are happening right now?"));
        assert!(has_temporal_marker("Now, what is open?"));
        assert!(has_temporal_marker("is the DMV open NOW"));
        assert!(has_temporal_marker("which pools are open now"));
        assert!(!has_temporal_marker("where is the closest library branch downtown"));
        assert!(!has_temporal_marker("I know the snowplow route"));
        assert!(!has_temporal_marker("How do I apply for a permit?"));
    }

    #[test]
    fn test_trailing_now_augments_web_query() {
        let sources = sources(Arc::new(RecordingSearch::default()));
        assert_eq!(
            sources.web_query("which pools are open now"),
            "which pools are open now around 2024-06-01"
        );
        assert_eq!(sources.web_query("which pools are open"), "which pools are open");
    }

    #[test]
    fn test_augment_query() {
        assert_eq!(
            augment_query("What is happening right now? ", fixed_date()),
            "What is happening right now? around 2024-06-01"
        );
    }

    #[tokio::test]
    async fn test_retrieve_local_caps_at_top_k() {
        let sources = sources(Arc::new(RecordingSearch::default())).with_top_k(2);
        let passages = sources.retrieve_local("permits").await.unwrap();

        assert_eq!(
            passages,
            vec![EvidencePassage::local("a"), EvidencePassage::local("b")]
        );
    }

    #[tokio::test]
    async fn test_search_web_joins_snippets_into_one_passage() {
        let search = Arc::new(RecordingSearch::default());
        let passage = sources(search.clone())
            .search_web("Who won the game?")
            .await
            .unwrap();

        assert_eq!(passage, EvidencePassage::web("first\nsecond"));
        let queries = search.queries.lock().unwrap();
        assert_eq!(queries[0], ("Who won the game?".to_string(), 3));
    }

    #[tokio::test]
    async fn test_search_web_augments_temporal_query() {
        let search = Arc::new(RecordingSearch::default());
        sources(search.clone())
            .search_web("What events are happening right now?")
            .await
            .unwrap();

        let queries = search.queries.lock().unwrap();
        assert!(queries[0].0.contains("2024-06-01"));
    }
}
