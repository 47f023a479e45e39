//! Agentic search: a seed-and-refine loop driven by the model.
//!
//! Seed a hybrid search with the question, then repeatedly ask the model to
//! either terminate or issue the next query. Decisions are line-oriented:
//! `TERMINATE`, or `NEXT_QUERY: <query>` optionally followed by a JSON
//! filter object and a `##MEMORY##` block.

use std::collections::HashMap;

use openai_protocol::chat::{ChatCompletionRequest, ChatMessage};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::{filters::Filter, ToolContext};
use crate::error::{GatewayError, GatewayResult};
use crate::services::SearchHit;

const DEFAULT_MAX_ITERATIONS: u32 = 5;
const DEFAULT_MAX_RESULTS: usize = 10;
const MEMORY_MARKER: &str = "##MEMORY##";

const NO_SEED_RESULTS: &str = "No initial results found.";

const DECISION_SYSTEM_PROMPT: &str = "You steer an iterative document search. \
Respond with exactly one decision per turn:\n\
TERMINATE\n\
  when the gathered chunks answer the question, or\n\
NEXT_QUERY: <query> [{<json filter>}] [##MEMORY## <notes worth keeping>]\n\
  to run another search. The optional filter is a JSON object; the optional \
memory block records knowledge acquired so far.";

#[derive(Debug, Deserialize)]
struct AgenticSearchArgs {
    question: String,
    #[serde(default)]
    max_iterations: Option<u32>,
    #[serde(default)]
    max_results: Option<usize>,
}

/// One audited step of the loop.
#[derive(Debug, Clone, Serialize)]
pub struct SearchIteration {
    pub query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    pub result_count: usize,
}

/// Parsed model decision.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Terminate,
    Next {
        query: String,
        filter: Option<Filter>,
        memory: Option<String>,
    },
}

/// Parse a decision per the grammar. `TERMINATE` is case-insensitive;
/// `NEXT_QUERY:` is followed by free text, an optional `{…}` filter, and an
/// optional `##MEMORY##` block. Anything else is unparseable.
pub fn parse_decision(text: &str) -> Option<Decision> {
    let trimmed = text.trim();
    if trimmed.to_ascii_lowercase().starts_with("terminate") {
        return Some(Decision::Terminate);
    }

    let lower = trimmed.to_ascii_lowercase();
    let marker_pos = lower.find("next_query:")?;
    let rest = &trimmed[marker_pos + "next_query:".len()..];

    let (rest, memory) = match rest.find(MEMORY_MARKER) {
        Some(pos) => {
            let memory = rest[pos + MEMORY_MARKER.len()..].trim();
            (
                &rest[..pos],
                (!memory.is_empty()).then(|| memory.to_string()),
            )
        }
        None => (rest, None),
    };

    let (query, filter) = match rest.find('{') {
        Some(pos) => {
            let candidate = rest[pos..].trim();
            match serde_json::from_str::<Filter>(candidate) {
                Ok(filter) => (rest[..pos].trim(), Some(filter)),
                Err(_) => (rest.trim(), None),
            }
        }
        None => (rest.trim(), None),
    };

    if query.is_empty() {
        return None;
    }

    Some(Decision::Next {
        query: query.to_string(),
        filter,
        memory,
    })
}

pub async fn run(args: Value, ctx: &ToolContext<'_>) -> GatewayResult<String> {
    let args: AgenticSearchArgs = serde_json::from_value(args)
        .map_err(|e| GatewayError::invalid_request(format!("agentic_search arguments: {}", e)))?;

    let max_iterations = args.max_iterations.unwrap_or(DEFAULT_MAX_ITERATIONS);
    let max_results = args.max_results.unwrap_or(DEFAULT_MAX_RESULTS);

    let config = ctx.tool_configs.get("agentic_search");
    let store_ids: Vec<String> = config
        .and_then(|c| c.vector_store_ids.clone())
        .unwrap_or_default();
    // The caller's filter from the tool config is mandatory on every search.
    let security_filter: Option<Filter> = config
        .and_then(|c| c.filters.clone())
        .and_then(|v| serde_json::from_value(v).ok());

    let mut buffer: HashMap<String, SearchHit> = HashMap::new();
    let mut search_iterations: Vec<SearchIteration> = Vec::new();
    let mut knowledge_acquired = String::new();

    // Iteration 0: seed with the question itself.
    let seed = ctx
        .vector_store
        .hybrid_search(
            &args.question,
            &store_ids,
            max_results,
            security_filter.as_ref(),
        )
        .await?;
    if seed.is_empty() {
        return Ok(NO_SEED_RESULTS.to_string());
    }
    search_iterations.push(SearchIteration {
        query: args.question.clone(),
        filter: None,
        result_count: seed.len(),
    });
    merge(&mut buffer, seed);

    let mut iteration = 1u32;
    while iteration < max_iterations {
        if ctx.cancel.is_cancelled() {
            break;
        }

        let decision_text =
            ask_for_decision(ctx, &args.question, &buffer, &knowledge_acquired).await?;
        let decision = match parse_decision(&decision_text) {
            Some(d) => d,
            None => {
                tracing::warn!("Unparseable search decision, terminating: {}", decision_text);
                break;
            }
        };

        match decision {
            Decision::Terminate => break,
            Decision::Next {
                query,
                filter,
                memory,
            } => {
                if let Some(memory) = memory {
                    if !knowledge_acquired.is_empty() {
                        knowledge_acquired.push('\n');
                    }
                    knowledge_acquired.push_str(&memory);
                }

                let filter_json = filter.as_ref().and_then(|f| serde_json::to_value(f).ok());
                let combined = Filter::and_compose(filter, security_filter.clone());
                let hits = ctx
                    .vector_store
                    .hybrid_search(&query, &store_ids, max_results, combined.as_ref())
                    .await?;
                search_iterations.push(SearchIteration {
                    query,
                    filter: filter_json,
                    result_count: hits.len(),
                });
                merge(&mut buffer, hits);
                iteration += 1;
            }
        }
    }

    let mut data: Vec<SearchHit> = buffer.into_values().collect();
    data.sort_by(|a, b| b.score.total_cmp(&a.score));
    data.truncate(max_results);

    Ok(json!({
        "data": data,
        "search_iterations": search_iterations,
        "knowledge_acquired": knowledge_acquired,
    })
    .to_string())
}

/// Merge hits into the buffer, deduping by chunk id and keeping the higher
/// score.
fn merge(buffer: &mut HashMap<String, SearchHit>, hits: Vec<SearchHit>) {
    for hit in hits {
        buffer
            .entry(hit.chunk_id.clone())
            .and_modify(|existing| {
                if hit.score > existing.score {
                    *existing = hit.clone();
                }
            })
            .or_insert(hit);
    }
}

async fn ask_for_decision(
    ctx: &ToolContext<'_>,
    question: &str,
    buffer: &HashMap<String, SearchHit>,
    knowledge: &str,
) -> GatewayResult<String> {
    let mut snippets: Vec<&SearchHit> = buffer.values().collect();
    snippets.sort_by(|a, b| b.score.total_cmp(&a.score));
    let context: String = snippets
        .iter()
        .take(8)
        .map(|h| format!("[{} score={:.2}] {}", h.filename, h.score, h.content))
        .collect::<Vec<_>>()
        .join("\n");

    let user = format!(
        "Question: {}\n\nChunks gathered so far:\n{}\n\nKnowledge acquired:\n{}\n\nDecide.",
        question,
        context,
        if knowledge.is_empty() { "(none)" } else { knowledge },
    );

    let mut request = ChatCompletionRequest::new(
        ctx.target.model.clone(),
        vec![
            ChatMessage::text("system", DECISION_SYSTEM_PROMPT),
            ChatMessage::text("user", user),
        ],
    );
    request.temperature = Some(0.0);

    let response = ctx
        .provider
        .complete(&ctx.target, &request, ctx.bearer.as_deref())
        .await?;
    Ok(response
        .choices
        .first()
        .map(|c| c.message.content_text())
        .unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn terminate_is_case_insensitive() {
        assert_eq!(parse_decision("TERMINATE"), Some(Decision::Terminate));
        assert_eq!(parse_decision("terminate"), Some(Decision::Terminate));
        assert_eq!(parse_decision("  Terminate."), Some(Decision::Terminate));
    }

    #[test]
    fn next_query_with_bare_text() {
        match parse_decision("NEXT_QUERY: rollout schedule 2025").unwrap() {
            Decision::Next {
                query,
                filter,
                memory,
            } => {
                assert_eq!(query, "rollout schedule 2025");
                assert!(filter.is_none());
                assert!(memory.is_none());
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn next_query_with_filter_and_memory() {
        let text = r#"NEXT_QUERY: billing outage {"type":"eq","key":"team","value":"payments"} ##MEMORY## outages cluster on Fridays"#;
        match parse_decision(text).unwrap() {
            Decision::Next {
                query,
                filter,
                memory,
            } => {
                assert_eq!(query, "billing outage");
                assert!(filter.unwrap().matches(&json!({"team": "payments"})));
                assert_eq!(memory.as_deref(), Some("outages cluster on Fridays"));
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn malformed_filter_falls_back_to_query_text() {
        let text = "NEXT_QUERY: find the {unfinished";
        match parse_decision(text).unwrap() {
            Decision::Next { query, filter, .. } => {
                assert_eq!(query, "find the {unfinished");
                assert!(filter.is_none());
            }
            other => panic!("unexpected decision {:?}", other),
        }
    }

    #[test]
    fn garbage_is_unparseable() {
        assert!(parse_decision("I think we should search more").is_none());
        assert!(parse_decision("NEXT_QUERY:").is_none());
    }

    #[test]
    fn merge_dedupes_by_chunk_id_keeping_max_score() {
        let mut buffer = HashMap::new();
        let hit = |id: &str, score: f64| SearchHit {
            file_id: "f".to_string(),
            chunk_id: id.to_string(),
            filename: "f.md".to_string(),
            score,
            content: String::new(),
            attributes: Value::Null,
        };
        merge(&mut buffer, vec![hit("a", 0.4), hit("b", 0.6)]);
        merge(&mut buffer, vec![hit("a", 0.9), hit("c", 0.1)]);

        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer["a"].score, 0.9);
        assert_eq!(buffer["b"].score, 0.6);
    }
}
