//! Source selection: merge the reranker's verdicts with vector order and
//! project the winners into client-facing citations.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::models::{RankedDocument, RerankEntry, RetrievedDocument, SourceItem, SourceTiming};

const ELLIPSIS: char = '…';
const UNTITLED_SEGMENT: &str = "未命名视频片段";

/// Readable text, else raw text, else empty.
pub fn document_content(payload: &Map<String, Value>) -> String {
    payload_str(payload, "text_readable")
        .or_else(|| payload_str(payload, "text"))
        .unwrap_or_default()
        .to_string()
}

/// Pick at most `limit` documents.
///
/// Rerank entries are taken best-first, skipping out-of-range and repeated
/// indices. Any shortfall is backfilled from unused candidates in vector
/// order. Without rerank entries the vector order is used as is.
pub fn select_top_documents(
    candidates: &[RetrievedDocument],
    rerank_entries: &[RerankEntry],
    limit: usize,
) -> Vec<RankedDocument> {
    if candidates.is_empty() || limit == 0 {
        return Vec::new();
    }

    if rerank_entries.is_empty() {
        return candidates
            .iter()
            .take(limit)
            .map(|doc| RankedDocument {
                document: doc.clone(),
                relevance_score: doc.similarity_score.unwrap_or(-1.0),
            })
            .collect();
    }

    let mut ordered = rerank_entries.to_vec();
    // Stable: ties keep the reranker's own order.
    ordered.sort_by(|a, b| {
        b.score
            .unwrap_or(0.0)
            .partial_cmp(&a.score.unwrap_or(0.0))
            .unwrap_or(Ordering::Equal)
    });

    let mut seen = HashSet::new();
    let mut ranked = Vec::with_capacity(limit.min(candidates.len()));

    for entry in ordered {
        if entry.index >= candidates.len() || !seen.insert(entry.index) {
            continue;
        }
        ranked.push(RankedDocument {
            document: candidates[entry.index].clone(),
            relevance_score: entry.score.unwrap_or(entry.index as f32 * -0.01),
        });
        if ranked.len() == limit {
            return ranked;
        }
    }

    for (idx, doc) in candidates.iter().enumerate() {
        if ranked.len() >= limit {
            break;
        }
        if seen.contains(&idx) {
            continue;
        }
        ranked.push(RankedDocument {
            document: doc.clone(),
            relevance_score: doc.similarity_score.unwrap_or(-1.0),
        });
    }

    ranked
}

/// Trim, then cut to `limit` characters with a trailing ellipsis.
pub fn truncate_text(text: &str, limit: usize) -> String {
    let normalized = text.trim();
    match normalized.char_indices().nth(limit) {
        Some((cut, _)) => {
            let mut out = normalized[..cut].to_string();
            out.push(ELLIPSIS);
            out
        }
        None => normalized.to_string(),
    }
}

/// Numbered-ready snippets for the prompt: blank documents are skipped.
pub fn context_snippets(ranked: &[RankedDocument], limit: usize) -> Vec<String> {
    ranked
        .iter()
        .map(|r| r.document.content.as_str())
        .filter(|content| !content.trim().is_empty())
        .map(|content| truncate_text(content, limit))
        .collect()
}

pub fn build_source_item(ranked: &RankedDocument, transcript_limit: usize) -> SourceItem {
    let doc = &ranked.document;
    let payload = &doc.payload;

    let transcript = payload_str(payload, "text_readable")
        .or_else(|| payload_str(payload, "text"))
        .unwrap_or(doc.content.as_str());

    let id = payload_str(payload, "segment_id")
        .map(str::to_string)
        .or_else(|| (!doc.id.is_empty()).then(|| doc.id.clone()))
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    SourceItem {
        id,
        title: payload_str(payload, "video_title")
            .unwrap_or(UNTITLED_SEGMENT)
            .to_string(),
        summary: payload_str(payload, "topic_title")
            .unwrap_or_default()
            .to_string(),
        url: payload_str(payload, "source_url")
            .unwrap_or_default()
            .to_string(),
        transcript: truncate_text(transcript, transcript_limit),
        score: ranked.relevance_score,
        metadata: SourceTiming {
            start_time: payload_number(payload, "start_time_seconds").unwrap_or(0.0),
            end_time: payload_number(payload, "end_time_seconds").unwrap_or(0.0),
        },
    }
}

fn payload_str<'a>(payload: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Numbers, or strings that parse as finite numbers.
fn payload_number(payload: &Map<String, Value>, key: &str) -> Option<f64> {
    match payload.get(key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, score: Option<f32>) -> RetrievedDocument {
        RetrievedDocument {
            id: id.to_string(),
            content: format!("content of {id}"),
            payload: Map::new(),
            similarity_score: score,
        }
    }

    fn candidates(n: usize) -> Vec<RetrievedDocument> {
        (0..n)
            .map(|i| doc(&format!("doc{i}"), Some(0.9 - i as f32 * 0.1)))
            .collect()
    }

    fn entry(index: usize, score: Option<f32>) -> RerankEntry {
        RerankEntry { index, score }
    }

    fn ids(ranked: &[RankedDocument]) -> Vec<&str> {
        ranked.iter().map(|r| r.document.id.as_str()).collect()
    }

    // ─── Merge ───────────────────────────────────────────

    #[test]
    fn test_no_rerank_uses_vector_order() {
        let cands = vec![doc("a", Some(0.8)), doc("b", None), doc("c", Some(0.5))];
        let ranked = select_top_documents(&cands, &[], 2);
        assert_eq!(ids(&ranked), vec!["a", "b"]);
        assert_eq!(ranked[0].relevance_score, 0.8);
        assert_eq!(ranked[1].relevance_score, -1.0);
    }

    #[test]
    fn test_rerank_entries_sorted_by_score() {
        let ranked = select_top_documents(
            &candidates(4),
            &[entry(1, Some(0.2)), entry(3, Some(0.95)), entry(0, Some(0.5))],
            3,
        );
        assert_eq!(ids(&ranked), vec!["doc3", "doc0", "doc1"]);
        assert_eq!(ranked[0].relevance_score, 0.95);
    }

    #[test]
    fn test_partial_rerank_backfilled_in_vector_order() {
        let ranked = select_top_documents(
            &candidates(3),
            &[entry(2, Some(0.9)), entry(0, Some(0.7))],
            5,
        );
        assert_eq!(ids(&ranked), vec!["doc2", "doc0", "doc1"]);
        // Backfilled entry keeps its similarity score
        assert!((ranked[2].relevance_score - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_merge_completeness_min_of_n_and_k() {
        let cands = candidates(8);
        let rerank = [entry(5, Some(0.9)), entry(2, Some(0.3))];
        let ranked = select_top_documents(&cands, &rerank, 5);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ids(&ranked)[..2], ["doc5", "doc2"]);
        let unique: HashSet<&str> = ids(&ranked).into_iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn test_out_of_range_and_duplicate_indices_skipped() {
        let cands = candidates(3);
        let rerank = [
            entry(3, Some(0.99)),
            entry(1, Some(0.8)),
            entry(1, Some(0.7)),
        ];
        let ranked = select_top_documents(&cands, &rerank, 3);
        assert_eq!(ids(&ranked), vec!["doc1", "doc0", "doc2"]);
    }

    #[test]
    fn test_missing_rerank_score_gets_rank_only_value() {
        let ranked = select_top_documents(&candidates(5), &[entry(4, None)], 1);
        assert_eq!(ids(&ranked), vec!["doc4"]);
        assert!((ranked[0].relevance_score - (-0.04)).abs() < 1e-6);
    }

    #[test]
    fn test_missing_score_sorts_as_zero() {
        let ranked = select_top_documents(
            &candidates(3),
            &[entry(0, None), entry(2, Some(-0.5)), entry(1, Some(0.1))],
            3,
        );
        assert_eq!(ids(&ranked), vec!["doc1", "doc0", "doc2"]);
    }

    #[test]
    fn test_stops_once_limit_reached_from_rerank() {
        let ranked = select_top_documents(
            &candidates(5),
            &[entry(4, Some(0.9)), entry(3, Some(0.8)), entry(2, Some(0.7))],
            2,
        );
        assert_eq!(ids(&ranked), vec!["doc4", "doc3"]);
    }

    #[test]
    fn test_empty_candidates_or_zero_limit() {
        assert!(select_top_documents(&[], &[entry(0, Some(1.0))], 5).is_empty());
        assert!(select_top_documents(&candidates(3), &[], 0).is_empty());
    }

    // ─── Truncation ──────────────────────────────────────

    #[test]
    fn test_truncate_long_text() {
        let text = "念".repeat(710);
        let out = truncate_text(&text, 700);
        assert_eq!(out.chars().count(), 701);
        assert!(out.ends_with('…'));
        assert_eq!(out.chars().filter(|c| *c == '…').count(), 1);
    }

    #[test]
    fn test_truncate_exact_limit_unchanged() {
        let text = "a".repeat(400);
        assert_eq!(truncate_text(&text, 400), text);
    }

    #[test]
    fn test_truncate_trims_first() {
        assert_eq!(truncate_text("  hello  ", 5), "hello");
    }

    // ─── Projection ──────────────────────────────────────

    #[test]
    fn test_document_content_precedence() {
        let both = json!({ "text_readable": "readable", "text": "raw" });
        assert_eq!(document_content(both.as_object().unwrap()), "readable");
        let raw = json!({ "text": "raw" });
        assert_eq!(document_content(raw.as_object().unwrap()), "raw");
        let none = json!({ "text": 5 });
        assert_eq!(document_content(none.as_object().unwrap()), "");
    }

    #[test]
    fn test_source_item_from_full_payload() {
        let payload = json!({
            "segment_id": "seg-7",
            "video_title": "如何生活在当下",
            "topic_title": "觉知",
            "source_url": "https://example.com/v/7",
            "text_readable": "  看见念头生起  ",
            "start_time_seconds": 61.5,
            "end_time_seconds": "95",
        });
        let ranked = RankedDocument {
            document: RetrievedDocument {
                id: "101".into(),
                content: "看见念头生起".into(),
                payload: payload.as_object().unwrap().clone(),
                similarity_score: Some(0.7),
            },
            relevance_score: 0.92,
        };
        let item = build_source_item(&ranked, 400);
        assert_eq!(item.id, "seg-7");
        assert_eq!(item.title, "如何生活在当下");
        assert_eq!(item.summary, "觉知");
        assert_eq!(item.url, "https://example.com/v/7");
        assert_eq!(item.transcript, "看见念头生起");
        assert_eq!(item.score, 0.92);
        assert_eq!(item.metadata.start_time, 61.5);
        assert_eq!(item.metadata.end_time, 95.0);
    }

    #[test]
    fn test_source_item_defaults() {
        let ranked = RankedDocument {
            document: doc("55", Some(0.3)),
            relevance_score: -1.0,
        };
        let item = build_source_item(&ranked, 400);
        assert_eq!(item.id, "55");
        assert_eq!(item.title, UNTITLED_SEGMENT);
        assert_eq!(item.summary, "");
        assert_eq!(item.transcript, "content of 55");
        assert_eq!(item.metadata.start_time, 0.0);
    }

    #[test]
    fn test_source_item_generates_id_when_missing() {
        let ranked = RankedDocument {
            document: doc("", None),
            relevance_score: -1.0,
        };
        assert!(!build_source_item(&ranked, 400).id.is_empty());
    }

    #[test]
    fn test_context_snippets_skip_blank() {
        let mut blank = doc("b", None);
        blank.content = "   ".into();
        let ranked = vec![
            RankedDocument {
                document: doc("a", None),
                relevance_score: 0.5,
            },
            RankedDocument {
                document: blank,
                relevance_score: 0.4,
            },
        ];
        assert_eq!(context_snippets(&ranked, 700), vec!["content of a".to_string()]);
    }
}
