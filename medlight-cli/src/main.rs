//! `medlight`: search, ask and evaluate against an ingested medical corpus.
//!
//! Log verbosity follows `RUST_LOG` (default `info`); logs go to stderr so
//! JSON output on stdout stays machine-readable.

mod settings;
mod wiring;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use medlight_rag::{AnswerReport, ContextAssembler, EvalDataset, EvalReport, Evaluator, LlmJudge};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

#[derive(Parser)]
#[command(name = "medlight", version, about = "MedLight retrieval tool")]
struct Cli {
    /// Settings file.
    #[arg(short, long, default_value = "medlight.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Retrieve evidence for a question and print the retrieval report as JSON.
    Search {
        /// The question.
        query: String,
    },
    /// Answer a question from retrieved evidence.
    Ask {
        /// The question.
        query: String,
        /// Answering model; defaults to `providers.chat_model`.
        #[arg(short, long)]
        model: Option<String>,
    },
    /// Score retrieval against a labelled dataset.
    Eval {
        /// Dataset JSON with `queries`, `corpus` and `relevant_docs`.
        dataset: PathBuf,
        /// Report path; defaults to a timestamped file in the working directory.
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Also answer every question and have the chat model judge the
        /// answers' faithfulness and relevancy.
        #[arg(long)]
        judge: bool,
    },
    /// List known models with their evidence budgets.
    Models,
}

#[derive(Serialize)]
struct EvalRun<'a> {
    timestamp: String,
    dataset: &'a std::path::Path,
    report: EvalReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    answers: Option<AnswerReport>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(&cli.config)?;

    match cli.command {
        Command::Search { query } => {
            let pipeline = wiring::build_pipeline(&settings).await?;
            let report = pipeline.retrieve(&query).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Ask { query, model } => {
            let pipeline = wiring::build_pipeline(&settings).await?;
            let model = model.unwrap_or_else(|| settings.providers.chat_model.clone());
            let answer = pipeline.answer(&query, &model).await?;
            println!("{}\n", answer.text);
            for (n, evidence) in answer.report.evidence.iter().enumerate() {
                let source = &evidence.source;
                println!(
                    "[{}] {} p.{} ({:.2}) {}",
                    n + 1,
                    source.citation_name(),
                    source.page,
                    evidence.score,
                    source.doi
                );
            }
        }
        Command::Eval { dataset, output, judge } => {
            let data = EvalDataset::from_json_file(&dataset)
                .with_context(|| format!("failed to read dataset {}", dataset.display()))?;
            let pipeline = Arc::new(wiring::build_pipeline(&settings).await?);
            let evaluator = Evaluator::new(pipeline);
            let report = evaluator.evaluate(&data).await?;
            let answers = if judge {
                let judge = LlmJudge::new(wiring::chat_model(&settings.providers)?);
                let model = &settings.providers.chat_model;
                Some(evaluator.evaluate_answers(&data, model, &judge).await?)
            } else {
                None
            };

            let now = chrono::Utc::now();
            let output = output.unwrap_or_else(|| {
                PathBuf::from(format!("retriever_eval_{}.json", now.format("%Y%m%dT%H%M%SZ")))
            });
            let summary = report.summary.clone();
            let answer_summary = answers.as_ref().map(|a| a.summary.clone());
            let run = EvalRun { timestamp: now.to_rfc3339(), dataset: &dataset, report, answers };
            std::fs::write(&output, serde_json::to_string_pretty(&run)?)
                .with_context(|| format!("failed to write {}", output.display()))?;

            println!("{}", serde_json::to_string_pretty(&summary)?);
            if let Some(answer_summary) = answer_summary {
                println!("{}", serde_json::to_string_pretty(&answer_summary)?);
            }
            tracing::info!(path = %output.display(), "wrote evaluation report");
        }
        Command::Models => {
            let assembler = ContextAssembler::from_config(&settings.pipeline.context);
            println!("{:<28} {:>10} {:>12}", "MODEL", "CONTEXT", "EVIDENCE");
            for (name, length) in assembler.registry().models() {
                println!("{name:<28} {length:>10} {:>12}", assembler.char_budget(name));
            }
            let registry = assembler.registry();
            println!(
                "{:<28} {:>10} {:>12}",
                "(default)",
                registry.default_context_length(),
                assembler.char_budget("")
            );
        }
    }
    Ok(())
}
