use std::sync::Arc;

use serde::Deserialize;

use super::ChatModel;
use crate::models::{ConversationTurn, Role, RewriteOutcome};

const REWRITE_PROMPT: &str = "你是一个隆波帕默尊者佛法问答系统的智能助手。\n\
你的任务有两个：\n\
1. 判断用户的输入是否与佛法、修行、禅修或心灵成长相关。\n\
2. 提取用于检索佛法数据库的核心问题：去除寒暄语（如“你好”、“师兄”）和无关的背景描述，\
将问题转化为一个清晰、独立、适合检索的查询语句。\n\
不要回答用户的问题，不要增加任何解释性文字。\n\
只输出一个 JSON 对象，且只包含两个字段：\n\
{\"isRelevant\": true 或 false, \"query\": \"改写后的查询语句\"}";

/// Classifies the latest user question and rewrites it for retrieval.
///
/// Never fails: any provider or parse problem yields the permissive
/// pass-through outcome so retrieval is only skipped on an explicit
/// off-topic verdict.
pub struct QueryRewriter {
    model: Arc<dyn ChatModel>,
}

impl QueryRewriter {
    pub fn new(model: Arc<dyn ChatModel>) -> Self {
        Self { model }
    }

    pub async fn rewrite(&self, user_text: &str) -> RewriteOutcome {
        let original = user_text.trim();
        if original.is_empty() {
            return RewriteOutcome {
                is_relevant: false,
                query: String::new(),
            };
        }

        let turns = vec![
            ConversationTurn::new(Role::System, REWRITE_PROMPT),
            ConversationTurn::user(original),
        ];

        match self.model.complete(turns).await {
            Ok(response) => {
                let outcome = parse_rewrite_response(&response, original);
                tracing::debug!(
                    is_relevant = outcome.is_relevant,
                    query = %outcome.query,
                    "Query rewritten"
                );
                outcome
            }
            Err(e) => {
                tracing::warn!("Query rewrite failed, falling back to original text: {e:#}");
                RewriteOutcome::passthrough(original)
            }
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRewrite {
    is_relevant: bool,
    query: String,
}

/// Parse the first `{` .. last `}` span of a model response. Anything that
/// does not yield both fields falls back to the original text.
fn parse_rewrite_response(content: &str, original: &str) -> RewriteOutcome {
    let json_str = match (content.find('{'), content.rfind('}')) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => {
            tracing::warn!("Rewrite response has no JSON object. Raw: {content}");
            return RewriteOutcome::passthrough(original);
        }
    };

    match serde_json::from_str::<RawRewrite>(json_str) {
        Ok(raw) => {
            let query = raw.query.trim();
            RewriteOutcome {
                is_relevant: raw.is_relevant,
                query: if query.is_empty() {
                    original.to_string()
                } else {
                    query.to_string()
                },
            }
        }
        Err(e) => {
            tracing::warn!("Failed to parse rewrite response: {e}. Raw: {content}");
            RewriteOutcome::passthrough(original)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ChatStream;
    use anyhow::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CannedModel {
        reply: Option<String>,
        calls: AtomicUsize,
    }

    impl CannedModel {
        fn replying(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Some(text.to_string()),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl ChatModel for CannedModel {
        async fn complete(&self, _turns: Vec<ConversationTurn>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .clone()
                .ok_or_else(|| anyhow::anyhow!("connection refused"))
        }

        async fn stream(&self, _turns: Vec<ConversationTurn>) -> Result<ChatStream> {
            anyhow::bail!("not used")
        }
    }

    // ─── Parsing ─────────────────────────────────────────

    #[test]
    fn test_parse_clean_json() {
        let out = parse_rewrite_response(r#"{"isRelevant": true, "query": "什么是正念"}"#, "正念是什么?");
        assert!(out.is_relevant);
        assert_eq!(out.query, "什么是正念");
    }

    #[test]
    fn test_parse_json_surrounded_by_commentary() {
        let input = "好的，结果如下：\n```json\n{\"isRelevant\": false, \"query\": \"天气\"}\n```\n希望有帮助";
        let out = parse_rewrite_response(input, "今天天气怎么样");
        assert!(!out.is_relevant);
        assert_eq!(out.query, "天气");
    }

    #[test]
    fn test_parse_garbage_fails_open() {
        let out = parse_rewrite_response("我不明白这个问题", "如何观呼吸");
        assert_eq!(out, RewriteOutcome::passthrough("如何观呼吸"));
    }

    #[test]
    fn test_parse_missing_field_fails_open() {
        let out = parse_rewrite_response(r#"{"isRelevant": false}"#, "如何观呼吸");
        assert_eq!(out, RewriteOutcome::passthrough("如何观呼吸"));
    }

    #[test]
    fn test_parse_wrong_type_fails_open() {
        let out = parse_rewrite_response(r#"{"isRelevant": "no", "query": "x"}"#, "q");
        assert_eq!(out, RewriteOutcome::passthrough("q"));
    }

    #[test]
    fn test_parse_reversed_braces_fails_open() {
        let out = parse_rewrite_response("} nothing {", "q");
        assert_eq!(out, RewriteOutcome::passthrough("q"));
    }

    #[test]
    fn test_parse_blank_query_uses_original() {
        let out = parse_rewrite_response(r#"{"isRelevant": true, "query": "  "}"#, "原问题");
        assert_eq!(out.query, "原问题");
    }

    // ─── Rewriter ────────────────────────────────────────

    #[tokio::test]
    async fn test_empty_input_skips_provider() {
        let model = CannedModel::replying(r#"{"isRelevant": true, "query": "x"}"#);
        let rewriter = QueryRewriter::new(model.clone());
        let out = rewriter.rewrite("   ").await;
        assert!(!out.is_relevant);
        assert!(out.query.is_empty());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unreachable_provider_fails_open_with_trimmed_text() {
        let rewriter = QueryRewriter::new(CannedModel::failing());
        let out = rewriter.rewrite("  正念是什么?  ").await;
        assert!(out.is_relevant);
        assert_eq!(out.query, "正念是什么?");
    }

    #[tokio::test]
    async fn test_off_topic_verdict_respected() {
        let rewriter =
            QueryRewriter::new(CannedModel::replying(r#"{"isRelevant": false, "query": "股票"}"#));
        let out = rewriter.rewrite("推荐一只股票").await;
        assert!(!out.is_relevant);
        assert_eq!(out.query, "股票");
    }
}
