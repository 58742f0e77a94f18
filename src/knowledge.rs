//! Keyword search over the configured knowledge base.

use crate::models::KnowledgeItem;

pub const DEFAULT_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct SearchFilter {
    pub category: Option<String>,
    pub limit: usize,
}

impl Default for SearchFilter {
    fn default() -> Self {
        Self {
            category: None,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl SearchFilter {
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Scores items by how many query terms occur in their title or content.
///
/// `relevance_score` is the matched fraction of query terms. Items without any
/// match are dropped; ties keep knowledge-base order.
pub fn search(items: &[KnowledgeItem], query: &str, filter: &SearchFilter) -> Vec<KnowledgeItem> {
    let lowered = query.to_lowercase();
    let terms: Vec<&str> = lowered.split_whitespace().collect();
    if terms.is_empty() {
        return Vec::new();
    }

    let mut results: Vec<KnowledgeItem> = items
        .iter()
        .filter(|item| {
            filter
                .category
                .as_deref()
                .map_or(true, |c| item.category == c)
        })
        .filter_map(|item| {
            let text = format!("{} {}", item.title, item.content).to_lowercase();
            let score = terms.iter().filter(|t| text.contains(*t)).count();
            (score > 0).then(|| KnowledgeItem {
                relevance_score: Some(score as f64 / terms.len() as f64),
                ..item.clone()
            })
        })
        .collect();

    results.sort_by(|a, b| {
        b.relevance_score
            .unwrap_or_default()
            .total_cmp(&a.relevance_score.unwrap_or_default())
    });
    results.truncate(filter.limit);
    results
}

/// Renders search hits as a context block for the assistant prompt.
pub fn format_context(items: &[KnowledgeItem]) -> String {
    items
        .iter()
        .map(|item| format!("- {}: {}", item.title, item.content))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, title: &str, content: &str, category: &str) -> KnowledgeItem {
        KnowledgeItem {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            category: category.to_string(),
            relevance_score: None,
            tags: None,
        }
    }

    fn knowledge_base() -> Vec<KnowledgeItem> {
        vec![
            item(
                "kb-001",
                "How do I reset my device?",
                "Tap the node with a wand.",
                "troubleshooting",
            ),
            item("kb-003", "What is your return policy?", "Returns need a sigil.", "policy"),
            item(
                "kb-005",
                "Loud beeping noise",
                "Reset the suppressor if the device beeps.",
                "troubleshooting",
            ),
            item("kb-006", "Replacement batteries", "Power modules are available.", "parts"),
        ]
    }

    #[test]
    fn test_scores_and_orders_by_relevance() {
        let results = search(&knowledge_base(), "reset device beeping", &SearchFilter::default());
        let ids: Vec<_> = results.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["kb-005", "kb-001"]);
        assert_eq!(results[0].relevance_score, Some(1.0));
        assert_eq!(results[1].relevance_score, Some(2.0 / 3.0));
    }

    #[test]
    fn test_category_filter() {
        let filter = SearchFilter::default().with_category("policy");
        let results = search(&knowledge_base(), "reset return", &filter);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "kb-003");
    }

    #[test]
    fn test_limit_and_empty_query() {
        let filter = SearchFilter::default().with_limit(1);
        assert_eq!(search(&knowledge_base(), "reset", &filter).len(), 1);
        assert!(search(&knowledge_base(), "   ", &SearchFilter::default()).is_empty());
        assert!(search(&knowledge_base(), "warranty", &SearchFilter::default()).is_empty());
    }

    #[test]
    fn test_format_context() {
        let context = format_context(&knowledge_base()[..2]);
        assert_eq!(
            context,
            "- How do I reset my device?: Tap the node with a wand.\n\
             - What is your return policy?: Returns need a sigil."
        );
    }
}
