//! Tool search strategies.
//!
//! The manager reindexes on every registry change and delegates
//! queries to the configured strategy. The default is BM25 over each
//! spec's name, description, argument names and argument descriptions.

use super::spec::ToolSpec;
use crate::schema::property_texts;
use ahash::AHashMap;

/// A ranked search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub spec: ToolSpec,
    pub score: f64,
}

/// Swappable ranking strategy.
///
/// `index` is called with the full spec set whenever the registry
/// changes; `search` never observes a stale index.
pub trait SearchStrategy: Send + Sync {
    fn index(&mut self, specs: &[ToolSpec]);
    fn search(&self, query: &str, limit: usize) -> Vec<SearchHit>;
}

/// Concatenates the searchable fields of a spec.
#[must_use]
pub fn searchable_text(spec: &ToolSpec) -> String {
    let mut parts = vec![spec.name.clone(), spec.description.clone()];
    for (arg_name, description) in property_texts(&spec.input_schema) {
        parts.push(arg_name);
        if let Some(description) = description {
            parts.push(description);
        }
    }
    parts.join(" ")
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect()
}

/// BM25 ranking with the standard parameters.
///
/// Document frequency and average document length are recomputed on
/// every `index` call; zero-contribution documents are omitted from
/// results.
pub struct Bm25Search {
    k1: f64,
    b: f64,
    docs: Vec<IndexedDoc>,
    doc_freqs: AHashMap<String, usize>,
    avg_doc_len: f64,
}

struct IndexedDoc {
    spec: ToolSpec,
    term_freqs: AHashMap<String, usize>,
    len: usize,
}

impl Bm25Search {
    #[must_use]
    pub fn new() -> Self {
        Self::with_params(1.5, 0.75)
    }

    #[must_use]
    pub fn with_params(k1: f64, b: f64) -> Self {
        Self {
            k1,
            b,
            docs: Vec::new(),
            doc_freqs: AHashMap::new(),
            avg_doc_len: 0.0,
        }
    }
}

impl Default for Bm25Search {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchStrategy for Bm25Search {
    fn index(&mut self, specs: &[ToolSpec]) {
        self.docs.clear();
        self.doc_freqs.clear();
        self.avg_doc_len = 0.0;

        if specs.is_empty() {
            return;
        }

        let mut total_len = 0usize;
        for spec in specs {
            let tokens = tokenize(&searchable_text(spec));
            let mut term_freqs: AHashMap<String, usize> = AHashMap::new();
            for token in &tokens {
                *term_freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in term_freqs.keys() {
                *self.doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            total_len += tokens.len();
            self.docs.push(IndexedDoc {
                spec: spec.clone(),
                len: tokens.len(),
                term_freqs,
            });
        }
        self.avg_doc_len = total_len as f64 / self.docs.len() as f64;
    }

    fn search(&self, query: &str, limit: usize) -> Vec<SearchHit> {
        let query_tokens = tokenize(query);
        if query_tokens.is_empty() || self.docs.is_empty() {
            return Vec::new();
        }

        let n_docs = self.docs.len() as f64;
        let mut hits: Vec<SearchHit> = Vec::new();

        for doc in &self.docs {
            let mut score = 0.0;
            for term in &query_tokens {
                let Some(&tf) = doc.term_freqs.get(term) else {
                    continue;
                };
                let df = self.doc_freqs.get(term).copied().unwrap_or(0) as f64;
                let idf = ((n_docs - df + 0.5) / (df + 0.5) + 1.0).ln();
                let tf = tf as f64;
                let norm = tf * (self.k1 + 1.0)
                    / (tf
                        + self.k1
                            * (1.0 - self.b + self.b * doc.len as f64 / self.avg_doc_len));
                score += idf * norm;
            }
            if score > 0.0 {
                hits.push(SearchHit {
                    spec: doc.spec.clone(),
                    score,
                });
            }
        }

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(limit);
        hits
    }
}

/// Debug strategy: every indexed spec, neutral score, up to the limit.
#[derive(Default)]
pub struct AllToolsSearch {
    specs: Vec<ToolSpec>,
}

impl AllToolsSearch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SearchStrategy for AllToolsSearch {
    fn index(&mut self, specs: &[ToolSpec]) {
        self.specs = specs.to_vec();
    }

    fn search(&self, _query: &str, limit: usize) -> Vec<SearchHit> {
        self.specs
            .iter()
            .take(limit)
            .map(|spec| SearchHit {
                spec: spec.clone(),
                score: 1.0,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn spec(name: &str, description: &str, args: &[(&str, &str)]) -> ToolSpec {
        let properties: serde_json::Map<String, serde_json::Value> = args
            .iter()
            .map(|(arg, desc)| {
                (
                    (*arg).to_string(),
                    json!({"type": "string", "description": desc}),
                )
            })
            .collect();
        ToolSpec {
            name: name.to_string(),
            description: description.to_string(),
            input_schema: json!({"type": "object", "properties": properties}),
            output_schema: None,
        }
    }

    fn sample_specs() -> Vec<ToolSpec> {
        vec![
            spec(
                "mcp_search_appliance",
                "Search appliances in the network inventory",
                &[("name", "Appliance name filter")],
            ),
            spec(
                "send_email",
                "Send an email to a recipient",
                &[("recipient", "Email address"), ("body", "Message body")],
            ),
            spec(
                "get_status",
                "Get device status",
                &[("device", "Device identifier")],
            ),
        ]
    }

    #[test]
    fn test_empty_query_yields_nothing() {
        let mut search = Bm25Search::new();
        search.index(&sample_specs());
        assert!(search.search("", 5).is_empty());
        assert!(search.search("   ", 5).is_empty());
    }

    #[test]
    fn test_arg_name_and_description_term_rank_first() {
        let mut search = Bm25Search::new();
        search.index(&sample_specs());
        // "recipient" is an argument name, "email" a description term
        let hits = search.search("recipient email", 5);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].spec.name, "send_email");
    }

    #[test]
    fn test_unrelated_terms_omitted() {
        let mut search = Bm25Search::new();
        search.index(&sample_specs());
        let hits = search.search("appliance", 5);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].spec.name, "mcp_search_appliance");
    }

    #[test]
    fn test_reindex_replaces_previous_index() {
        let mut search = Bm25Search::new();
        search.index(&sample_specs());
        assert!(!search.search("email", 5).is_empty());

        search.index(&[spec("only_tool", "Nothing else remains", &[])]);
        assert!(search.search("email", 5).is_empty());
        assert_eq!(search.search("remains", 5).len(), 1);
    }

    #[test]
    fn test_scores_descend() {
        let mut search = Bm25Search::new();
        search.index(&sample_specs());
        let hits = search.search("search appliance network", 5);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
    }

    #[test]
    fn test_all_tools_strategy() {
        let mut search = AllToolsSearch::new();
        search.index(&sample_specs());
        let hits = search.search("ignored", 2);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| (h.score - 1.0).abs() < f64::EPSILON));
    }
}
