//! Local index backed by a CityHub knowledge base.

use crate::collaborators::LocalIndex;
use async_trait::async_trait;
use cityhub_core::AppResult;
use cityhub_knowledge::QueryOptions;
use std::path::PathBuf;

pub struct KnowledgeIndex {
    workspace: PathBuf,
    base_name: String,
}

impl KnowledgeIndex {
    pub fn new(workspace: impl Into<PathBuf>, base_name: impl Into<String>) -> Self {
        Self {
            workspace: workspace.into(),
            base_name: base_name.into(),
        }
    }
}

#[async_trait]
impl LocalIndex for KnowledgeIndex {
    async fn lookup(&self, query: &str, k: usize) -> AppResult<Vec<String>> {
        let options = QueryOptions {
            base_name: self.base_name.clone(),
            query: query.to_string(),
            top_k: u32::try_from(k).unwrap_or(u32::MAX),
        };

        let result = cityhub_knowledge::query(&self.workspace, options).await?;
        Ok(result.chunks.into_iter().map(|chunk| chunk.text).collect())
    }
}
