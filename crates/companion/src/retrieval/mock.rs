use anyhow::Result;
use async_trait::async_trait;

use super::embedding::Embedder;

const DEFAULT_TERMS: &[&str] = &[
    "circle", "square", "keyboard", "canvas", "color", "text", "mouse",
];

/// A mock embedder for testing: one dimension per configured term, set when the text
/// mentions it, plus a constant dimension so no vector is zero
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    terms: Vec<String>,
}

impl MockEmbedder {
    pub fn new<S: AsRef<str>>(terms: &[S]) -> Self {
        Self {
            terms: terms
                .iter()
                .map(|term| term.as_ref().to_lowercase())
                .collect(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.terms.len() + 1
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_TERMS)
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                self.terms
                    .iter()
                    .map(|term| if text.contains(term.as_str()) { 1.0 } else { 0.0 })
                    .chain([1.0])
                    .collect()
            })
            .collect())
    }
}
