//! Subcommand handlers.

use recall_memory_hybrid::MemoryEngine;
use recall_protocols::{MemoryRecord, MemoryStats, NewMemory, SearchResult};
use serde_json::json;

use crate::cli::{Commands, SearchMode};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub(crate) async fn run(engine: &MemoryEngine, command: Commands, json: bool) -> CmdResult {
    match command {
        Commands::Add {
            content,
            importance,
            memory_type,
            source,
        } => {
            let mut memory = NewMemory::new(content)
                .with_importance(importance)
                .with_type(memory_type);
            if let Some(source) = source {
                memory = memory.with_source(source);
            }
            let id = engine.add(memory).await?;
            emit(json, json!({ "id": id }), || format!("Stored memory #{}", id))
        }

        Commands::Get { id } => match engine.get(id).await? {
            Some(record) => emit(json, serde_json::to_value(&record)?, || {
                format_record_detail(&record)
            }),
            None => Err(format!("Memory #{} not found", id).into()),
        },

        Commands::Delete { id } => {
            let deleted = engine.delete(id).await?;
            emit(json, json!({ "id": id, "deleted": deleted }), || {
                if deleted {
                    format!("Deleted memory #{}", id)
                } else {
                    format!("Memory #{} not found", id)
                }
            })
        }

        Commands::Recent { limit } => {
            let records = engine.recent(limit).await?;
            emit(json, serde_json::to_value(&records)?, || {
                records.iter().map(format_record).collect::<Vec<_>>().join("\n")
            })
        }

        Commands::Prune {
            older_than_days,
            importance_below,
        } => {
            let options = engine.options();
            let removed = engine
                .prune(
                    older_than_days.unwrap_or(options.prune_older_than_days),
                    importance_below.unwrap_or(options.prune_importance_below),
                )
                .await?;
            emit(json, json!({ "removed": removed }), || {
                format!("Pruned {} memories", removed)
            })
        }

        Commands::Search {
            query,
            mode,
            limit,
            vector_weight,
        } => {
            let limit = limit.unwrap_or(engine.options().default_limit);
            let results = search(engine, &query, mode, limit, vector_weight).await?;
            emit(json, serde_json::to_value(&results)?, || {
                results.iter().map(format_result).collect::<Vec<_>>().join("\n")
            })
        }

        Commands::Stats => {
            let stats = engine.stats().await?;
            emit(json, serde_json::to_value(&stats)?, || format_stats(&stats))
        }

        Commands::Backfill { batch_size } => {
            let embedded = engine.backfill_embeddings(batch_size).await?;
            emit(json, json!({ "embedded": embedded }), || {
                format!("Embedded {} memories", embedded)
            })
        }
    }
}

async fn search(
    engine: &MemoryEngine,
    query: &str,
    mode: SearchMode,
    limit: usize,
    vector_weight: Option<f64>,
) -> Result<Vec<SearchResult>, Box<dyn std::error::Error>> {
    let results = match mode {
        SearchMode::Lexical => engine.search_lexical(query, limit).await?,
        SearchMode::Vector => {
            let embedding = engine
                .query_embedding(query)
                .await
                .ok_or("Vector search needs an available embedding provider")?;
            engine.search_vector(&embedding, limit).await?
        }
        SearchMode::Hybrid => match vector_weight {
            Some(weight) => {
                let embedding = engine.query_embedding(query).await;
                engine
                    .search_hybrid(query, embedding.as_deref(), limit, weight)
                    .await?
            }
            None => engine.search(query, limit).await?,
        },
    };
    Ok(results)
}

fn emit(json: bool, value: serde_json::Value, text: impl FnOnce() -> String) -> CmdResult {
    if json {
        println!("{}", serde_json::to_string_pretty(&value)?);
    } else {
        let text = text();
        if !text.is_empty() {
            println!("{}", text);
        }
    }
    Ok(())
}

fn format_record(record: &MemoryRecord) -> String {
    format!(
        "#{} [{}] ({:.2}) {}",
        record.id, record.memory_type, record.importance, record.content
    )
}

fn format_record_detail(record: &MemoryRecord) -> String {
    let mut lines = vec![
        format_record(record),
        format!("  created:  {}", record.created_at.to_rfc3339()),
        format!("  accessed: {} time(s)", record.access_count),
    ];
    if let Some(source) = &record.source {
        lines.push(format!("  source:   {}", source));
    }
    lines.join("\n")
}

fn format_result(result: &SearchResult) -> String {
    format!(
        "{:>9.6} {:<7} {}",
        result.score,
        result.match_type,
        format_record(&result.record)
    )
}

fn format_stats(stats: &MemoryStats) -> String {
    let mut types: Vec<_> = stats.by_type.iter().collect();
    types.sort();

    let mut lines = vec![
        format!("memories:        {}", stats.total),
        format!("with embeddings: {}", stats.with_embeddings),
        format!("avg importance:  {:.2}", stats.avg_importance),
    ];
    for (memory_type, count) in types {
        lines.push(format!("  {:<14} {}", memory_type, count));
    }
    lines.join("\n")
}
