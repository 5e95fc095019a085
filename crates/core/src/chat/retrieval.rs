use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("knowledge file: {0}")]
    Io(#[from] std::io::Error),
    #[error("knowledge file is not a JSON array of strings: {0}")]
    Format(#[from] serde_json::Error),
}

/// Supplies knowledge snippets relevant to a question.
#[async_trait::async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<String>, RetrievalError>;
}

/// Retriever with no knowledge base; always returns nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRetrieval;

#[async_trait::async_trait]
impl ContextRetriever for NoRetrieval {
    async fn retrieve(&self, _query: &str, _limit: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(Vec::new())
    }
}

/// Words shorter than this are ignored when scoring.
const MIN_WORD_LEN: usize = 3;

/// In-memory snippets ranked by how many query words they share.
#[derive(Debug, Default)]
pub struct KeywordRetriever {
    snippets: Vec<(String, HashSet<String>)>,
}

impl KeywordRetriever {
    pub fn new(snippets: Vec<String>) -> Self {
        let snippets = snippets
            .into_iter()
            .map(|s| {
                let words = words(&s);
                (s, words)
            })
            .collect();
        Self { snippets }
    }

    /// Load a JSON array of strings.
    pub fn from_file(path: &Path) -> Result<Self, RetrievalError> {
        let raw = std::fs::read(path)?;
        let snippets: Vec<String> = serde_json::from_slice(&raw)?;
        Ok(Self::new(snippets))
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }

    fn rank(&self, query: &str, limit: usize) -> Vec<String> {
        let query_words = words(query);
        if query_words.is_empty() {
            return Vec::new();
        }
        let mut scored: Vec<(usize, &str)> = self
            .snippets
            .iter()
            .map(|(text, w)| (w.intersection(&query_words).count(), text.as_str()))
            .filter(|(hits, _)| *hits > 0)
            .collect();
        // stable: equal scores keep file order
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        scored.into_iter().take(limit).map(|(_, t)| t.to_string()).collect()
    }
}

#[async_trait::async_trait]
impl ContextRetriever for KeywordRetriever {
    async fn retrieve(&self, query: &str, limit: usize) -> Result<Vec<String>, RetrievalError> {
        Ok(self.rank(query, limit))
    }
}

fn words(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= MIN_WORD_LEN)
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn retriever() -> KeywordRetriever {
        KeywordRetriever::new(vec![
            "Przysiady: 3 serie po 12 powtórzeń, plecy proste.".into(),
            "Pompki klasyczne angażują klatkę piersiową i triceps.".into(),
            "Przysiady z wyskokiem to ćwiczenie plyometryczne, przysiady bułgarskie też.".into(),
            "Rozciąganie po treningu zmniejsza napięcie mięśni.".into(),
        ])
    }

    #[tokio::test]
    async fn ranks_by_shared_words() {
        let hits = retriever().retrieve("Jak robić przysiady z wyskokiem?", 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].starts_with("Przysiady z wyskokiem"));
        assert!(hits[1].starts_with("Przysiady: 3 serie"));
    }

    #[tokio::test]
    async fn ties_keep_source_order_and_limit_applies() {
        let r = KeywordRetriever::new(vec!["alpha beta".into(), "beta gamma".into(), "beta delta".into()]);
        let hits = r.retrieve("beta", 2).await.unwrap();
        assert_eq!(hits, vec!["alpha beta".to_string(), "beta gamma".to_string()]);
    }

    #[tokio::test]
    async fn short_words_and_misses_yield_nothing() {
        assert!(retriever().retrieve("i a o z", 5).await.unwrap().is_empty());
        assert!(retriever().retrieve("kettlebell", 5).await.unwrap().is_empty());
        assert!(NoRetrieval.retrieve("przysiady", 5).await.unwrap().is_empty());
    }

    #[test]
    fn loads_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("knowledge.json");
        std::fs::write(&path, r#"["Pompki na poręczach", "Martwy ciąg"]"#).unwrap();
        assert_eq!(KeywordRetriever::from_file(&path).unwrap().len(), 2);

        std::fs::write(&path, r#"{"not": "an array"}"#).unwrap();
        assert!(matches!(KeywordRetriever::from_file(&path), Err(RetrievalError::Format(_))));
    }
}
