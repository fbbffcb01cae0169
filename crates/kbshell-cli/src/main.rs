use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

mod demos;

use kbshell_core::Orchestrator;
use kbshell_gateway::{ollama, HttpReasoner, LlmTranslator, LlmVerbalizer, Reasoner};
use kbshell_memory::{OllamaEmbeddingProvider, QdrantIndex, SimilarityStore};
use kbshell_schema::ProcessEvent;

#[derive(Parser)]
#[command(name = "kbshell", version, about = "Interactive natural-language knowledge-base shell")]
struct Cli {
    #[arg(long, help = "Knowledge-base file loaded into the reasoner at startup")]
    kb_file: Option<PathBuf>,

    #[arg(
        long,
        default_value = "http://localhost:6333",
        help = "Qdrant REST endpoint"
    )]
    qdrant_url: String,

    #[arg(
        long,
        default_value = "http://localhost:11434",
        help = "Ollama endpoint, used for chat and embeddings"
    )]
    ollama_url: String,

    #[arg(
        long,
        default_value = "http://localhost:8008",
        help = "Symbolic reasoner service endpoint"
    )]
    reasoner_url: String,

    #[arg(
        long,
        default_value = "llama3.1",
        help = "Chat model for translation, verbalization, and the llm echo"
    )]
    chat_model: String,

    #[arg(long, default_value = "nomic-embed-text", help = "Embedding model")]
    embedding_model: String,
}

/// Base collection name: the KB file's stem with up to two extensions
/// stripped, suffixed `_pln` ("family.kb.metta" -> "family_pln").
fn collection_name(kb_file: Option<&Path>) -> String {
    let stem = kb_file
        .and_then(|path| path.file_name())
        .and_then(|name| name.to_str())
        .map(|name| {
            let once = name.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(name);
            let twice = once.rsplit_once('.').map(|(stem, _)| stem).unwrap_or(once);
            twice.to_string()
        })
        .unwrap_or_else(|| "default".to_string());
    format!("{stem}_pln")
}

fn read_kb(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .with_context(|| format!("failed to read knowledge base file {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let base_collection = collection_name(cli.kb_file.as_deref());
    let query_collection = format!("{base_collection}_query");
    tracing::debug!(base = %base_collection, query = %query_collection, "session collections");

    let index = Arc::new(QdrantIndex::new(&cli.qdrant_url));
    let embedder = Arc::new(
        OllamaEmbeddingProvider::with_model(&cli.embedding_model).with_base_url(&cli.ollama_url),
    );
    let base_store = Arc::new(
        SimilarityStore::open(index.clone(), embedder.clone(), &base_collection, false).await?,
    );
    // The query collection never outlives a session.
    let query_store = Arc::new(
        SimilarityStore::open(index, embedder, &query_collection, true).await?,
    );

    let provider = Arc::new(ollama(&cli.ollama_url));
    let translator = Arc::new(LlmTranslator::new(provider.clone(), &cli.chat_model));
    let verbalizer = Arc::new(LlmVerbalizer::new(provider.clone(), &cli.chat_model));
    let reasoner = Arc::new(HttpReasoner::new(&cli.reasoner_url));

    match &cli.kb_file {
        Some(path) => {
            reasoner.load_kb(&read_kb(path)?).await?;
            println!("Loaded knowledge base from {}", path.display());
        }
        None => println!("No knowledge base file specified, starting with empty KB"),
    }

    let mut orchestrator = Orchestrator::new(
        base_store,
        query_store,
        translator,
        reasoner,
        verbalizer,
        provider,
        &cli.chat_model,
    );

    run_repl(&mut orchestrator).await
}

async fn run_repl(orchestrator: &mut Orchestrator) -> Result<()> {
    println!("Welcome to the knowledge-base shell. Type 'help' to list commands.");

    let stdin = std::io::stdin();
    loop {
        print!("KB> ");
        std::io::stdout().flush()?;
        let mut input = String::new();
        if stdin.read_line(&mut input)? == 0 {
            break;
        }
        let input = input.trim();
        if input.is_empty() {
            continue;
        }

        match input {
            "exit" | "quit" => break,
            "help" | "?" => print_help(),
            "debug" => {
                let on = orchestrator.session_mut().toggle_debug();
                println!("Debug mode: {}", on_off(on));
            }
            "inference" => {
                let on = orchestrator.session_mut().toggle_inference();
                println!("Inference mode: {}", on_off(on));
            }
            "llm" => {
                let on = orchestrator.session_mut().toggle_llm_echo();
                println!("LLM mode: {}", on_off(on));
            }
            "demo1" => demos::surgeon_riddle(orchestrator).await,
            "demo2" => demos::family_relationships(orchestrator).await,
            _ => process_line(orchestrator, input).await,
        }
    }

    Ok(())
}

/// One input through the pipeline; errors are displayed, never fatal to the
/// shell itself.
pub(crate) async fn process_line(orchestrator: &mut Orchestrator, input: &str) {
    println!("\n=== System Response ===");
    match orchestrator.process_input(input).await {
        Ok(events) => render_events(&events),
        Err(err) => eprintln!("Error: {err:#}"),
    }
}

fn render_events(events: &[ProcessEvent]) {
    for event in events {
        match event {
            ProcessEvent::LlmReply { text } => {
                println!("\n=== LLM Response ===\n{text}");
            }
            ProcessEvent::Performative => {
                println!("This is a performative statement, not a query or statement.");
            }
            ProcessEvent::StatementAccepted { statement } => {
                println!("Got statement: {statement}");
            }
            ProcessEvent::Inference { fact, english } => {
                println!("- {fact} => {english}");
            }
            ProcessEvent::NoNewInferences => {
                println!("No new inferences made.");
            }
            ProcessEvent::Proof { atom, english } => {
                println!("- {atom} => {english}");
            }
            ProcessEvent::CannotProve => {
                println!("Can't prove the query.");
            }
        }
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn print_help() {
    println!("Commands:");
    println!("  debug      toggle debug output");
    println!("  inference  toggle verbalization of forward-chained inferences");
    println!("  llm        toggle the free-form LLM echo response");
    println!("  demo1      run the surgeon riddle example");
    println!("  demo2      run the family relationship proof example");
    println!("  exit       quit the shell");
    println!("Anything else is processed as a sentence or question.");
}
