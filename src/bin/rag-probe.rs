//! Retrieval probe: runs one question through rewrite, embedding, Qdrant and
//! rerank with the server's own clients, and prints what each stage returned.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use dharma_rag::config::Config;
use dharma_rag::llm::chat_stream::DashScopeChat;
use dharma_rag::llm::dashscope::DashScopeClient;
use dharma_rag::llm::embeddings::DashScopeEmbedder;
use dharma_rag::llm::query_rewrite::QueryRewriter;
use dharma_rag::llm::rerank::DashScopeReranker;
use dharma_rag::llm::{Embedder, Reranker};
use dharma_rag::models::{RerankEntry, RetrievedDocument};
use dharma_rag::search::qdrant::QdrantStore;
use dharma_rag::search::selection::truncate_text;
use dharma_rag::search::VectorStore;

/// Query the transcript collection the way the chat endpoint does.
///
/// Connection settings come from the same environment variables as the
/// server; the flags below override the retrieval knobs.
#[derive(Parser)]
#[command(name = "rag-probe", version)]
struct Cli {
    /// The user question.
    #[arg(long)]
    query: String,

    /// Qdrant collection (defaults to `QDRANT_COLLECTION`).
    #[arg(long)]
    collection: Option<String>,

    /// Named vector, if the collection uses named vectors.
    #[arg(long)]
    vector_name: Option<String>,

    /// Rewrite the question before embedding it.
    #[arg(long)]
    rewrite: bool,

    /// Number of Qdrant hits to fetch.
    #[arg(long, default_value_t = 20)]
    top_k: usize,

    /// Rerank top-n. `0` skips reranking.
    #[arg(long, default_value_t = 5)]
    rerank_top: usize,

    /// Preview length in characters.
    #[arg(long, default_value_t = 500)]
    max_chars: usize,

    /// Also write a Markdown report to this path.
    #[arg(long)]
    output_md: Option<PathBuf>,
}

struct Report {
    question: String,
    search_query: String,
    collection: String,
    vector_name: Option<String>,
    embedding_model: String,
    rerank_model: Option<String>,
    rewrite: Option<String>,
    hits: Vec<String>,
    reranked: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if cli.collection.is_some() {
        config.qdrant.collection = cli.collection.clone();
    }
    if cli.vector_name.is_some() {
        config.qdrant.vector_name = cli.vector_name.clone();
    }

    let client = Arc::new(DashScopeClient::with_default_http(config.dashscope.clone())?);

    // ── Step 1: Optional rewrite ──────────────────────────
    let mut search_query = cli.query.trim().to_string();
    let mut rewrite_status = None;
    if cli.rewrite {
        let model = DashScopeChat::new(client.clone(), config.dashscope.rewrite_model.clone());
        let status_model = model.model().to_string();
        let outcome = QueryRewriter::new(Arc::new(model)).rewrite(&cli.query).await;
        println!(
            "[INFO] Rewritten query: {} (relevant: {})",
            outcome.query, outcome.is_relevant
        );
        if !outcome.query.trim().is_empty() {
            search_query = outcome.query.trim().to_string();
        }
        rewrite_status = Some(format!(
            "{status_model}, relevant: {}",
            if outcome.is_relevant { "yes" } else { "no" }
        ));
    }

    // ── Step 2: Embed + search ────────────────────────────
    let embedder = DashScopeEmbedder::new(client.clone());
    let vector = embedder.embed(&search_query).await?;
    println!("[INFO] Query embedding dim={} (text=`{search_query}`)", vector.len());

    let store = QdrantStore::new(config.qdrant.clone());
    let hits = store.search(&vector, cli.top_k).await?;

    let mut report = Report {
        question: cli.query.clone(),
        search_query,
        collection: config.qdrant.collection.clone().unwrap_or_default(),
        vector_name: config.qdrant.vector_name.clone(),
        embedding_model: config.dashscope.embedding_model.clone(),
        rerank_model: (cli.rerank_top > 0).then(|| config.dashscope.rerank_model.clone()),
        rewrite: rewrite_status,
        hits: Vec::new(),
        reranked: Vec::new(),
    };

    if hits.is_empty() {
        println!("[INFO] Qdrant returned no hits.");
    } else {
        println!("\n[Qdrant Top-K]");
        for (idx, doc) in hits.iter().enumerate() {
            let line = hit_line(idx, doc, cli.max_chars);
            println!("{line}");
            report.hits.push(line);
        }
    }

    // ── Step 3: Optional rerank against the raw question ──
    if cli.rerank_top > 0 && !hits.is_empty() {
        let texts: Vec<String> = hits.iter().map(|d| d.content.clone()).collect();
        let reranker = DashScopeReranker::new(client);
        let entries = reranker
            .rerank(&cli.query, &texts, cli.rerank_top.min(texts.len()))
            .await?;

        println!("\n[Rerank Results]");
        for entry in &entries {
            let line = rerank_line(entry, &hits[entry.index], cli.max_chars);
            println!("{line}");
            report.reranked.push(line);
        }
    }

    if let Some(path) = &cli.output_md {
        std::fs::write(path, render_report(&report))
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        println!("\n[INFO] Markdown report written to {}", path.display());
    }

    Ok(())
}

fn preview(doc: &RetrievedDocument, limit: usize) -> String {
    let topic = doc
        .payload
        .get("topic_title")
        .and_then(|v| v.as_str())
        .filter(|t| !t.is_empty());
    let combined = match topic {
        Some(topic) => format!("[{topic}] {}", doc.content.trim()),
        None => doc.content.trim().to_string(),
    };
    truncate_text(&combined, limit)
}

fn segment_id(doc: &RetrievedDocument) -> &str {
    doc.payload
        .get("segment_id")
        .and_then(|v| v.as_str())
        .unwrap_or(doc.id.as_str())
}

fn hit_line(idx: usize, doc: &RetrievedDocument, limit: usize) -> String {
    format!(
        "{:>2}. score={:.4} segment_id={} -> {}",
        idx + 1,
        doc.similarity_score.unwrap_or_default(),
        segment_id(doc),
        preview(doc, limit)
    )
}

fn rerank_line(entry: &RerankEntry, doc: &RetrievedDocument, limit: usize) -> String {
    let score = entry
        .score
        .map(|s| format!("{s:.4}"))
        .unwrap_or_else(|| "n/a".to_string());
    format!(
        "- rerank_score={score} (orig#{}) segment_id={} -> {}",
        entry.index + 1,
        segment_id(doc),
        preview(doc, limit)
    )
}

fn render_report(report: &Report) -> String {
    let mut lines = vec![
        "# Query Debug Report".to_string(),
        String::new(),
        format!("- **Question:** {}", report.question),
        format!("- **Search Query:** {}", report.search_query),
        format!("- **Collection:** {}", report.collection),
        format!(
            "- **Vector name:** {}",
            report.vector_name.as_deref().unwrap_or("(default)")
        ),
        format!("- **Embedding model:** {}", report.embedding_model),
        format!(
            "- **Rerank model:** {}",
            report.rerank_model.as_deref().unwrap_or("N/A")
        ),
        format!(
            "- **Query rewrite:** {}",
            report.rewrite.as_deref().unwrap_or("disabled")
        ),
        String::new(),
        "## Qdrant Top-K".to_string(),
    ];

    if report.hits.is_empty() {
        lines.push("_No hits returned._".to_string());
    } else {
        lines.extend(report.hits.iter().cloned());
    }

    lines.push(String::new());
    lines.push("## Rerank Results".to_string());
    if report.reranked.is_empty() {
        lines.push("_Rerank disabled or no results._".to_string());
    } else {
        lines.extend(report.reranked.iter().cloned());
    }

    lines.join("\n") + "\n"
}
