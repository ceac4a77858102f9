use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use atty::Stream;
use clap::{Parser, Subcommand};
use serde_json::json;
use termimad::{FmtText, MadSkin, terminal_size};
use tokio::runtime::Builder;
use tracing_subscriber::EnvFilter;
use wordglow_rs::{
    EngineConfig, InteractionController, JsonFileStorage, Page, RewriteStats, StaticDictionary,
    WordRecord, WordStore, lookup_url, parse_definition,
};

#[derive(Parser, Debug)]
#[command(name = "wordglow-rs", about = "Track and highlight vocabulary", version)]
pub struct Cli {
    /// Emit JSON instead of human-readable tables.
    #[arg(long, global = true)]
    json: bool,

    /// JSON file holding the word list.
    #[arg(long, global = true, default_value = "wordglow-words.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Manage tracked words.
    #[command(subcommand)]
    Word(WordCommand),
    /// Work with HTML pages.
    #[command(subcommand)]
    Page(PageCommand),
    /// Dictionary helpers.
    #[command(subcommand)]
    Lookup(LookupCommand),
}

#[derive(Subcommand, Debug)]
enum WordCommand {
    /// Track one or more words, as if selected on a page.
    Add {
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// Stop highlighting one or more words.
    Delete {
        #[arg(required = true)]
        words: Vec<String>,
    },
    /// List tracked words.
    List {
        /// Include deleted words.
        #[arg(long)]
        all: bool,
    },
    /// Show the stored record for a word.
    Show { word: String },
}

#[derive(Subcommand, Debug)]
enum PageCommand {
    /// Wrap every tracked word in an HTML file with a marker.
    Highlight {
        file: PathBuf,
        /// Write the highlighted body here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand, Debug)]
enum LookupCommand {
    /// Extract the definition from a saved dictionary response.
    Parse { file: PathBuf },
    /// Print the dictionary URL for a word.
    Url { word: String },
}

pub fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_tracing();
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let store = WordStore::new(JsonFileStorage::new(&cli.store));
    runtime.block_on(async move {
        match cli.command {
            Command::Word(WordCommand::Add { words }) => handle_add(&store, words, cli.json).await,
            Command::Word(WordCommand::Delete { words }) => {
                handle_delete(&store, words, cli.json).await
            }
            Command::Word(WordCommand::List { all }) => handle_list(&store, all, cli.json).await,
            Command::Word(WordCommand::Show { word }) => handle_show(&store, word, cli.json).await,
            Command::Page(PageCommand::Highlight { file, output }) => {
                handle_highlight(&cli.store, file, output, cli.json).await
            }
            Command::Lookup(LookupCommand::Parse { file }) => handle_parse(file, cli.json),
            Command::Lookup(LookupCommand::Url { word }) => handle_url(word, cli.json),
        }
    })
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

type FileStore = WordStore<JsonFileStorage>;

async fn handle_add(
    store: &FileStore,
    words: Vec<String>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let mut rows = Vec::with_capacity(words.len());
    for word in words {
        if store.filter_word(&word).await {
            rows.push((word, None));
            continue;
        }
        let record = store.add_queried_word(&word).await?;
        rows.push((word, Some(record)));
    }

    if as_json {
        let payload: Vec<_> = rows
            .iter()
            .map(|(word, record)| json!({ "input": word, "added": record }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (word, record) in &rows {
            match record {
                Some(record) => println!("added {} (queries: {})", record.word, record.query_times),
                None => println!("skipped {word:?} (too short, not a word, or already tracked)"),
            }
        }
    }
    Ok(())
}

async fn handle_delete(
    store: &FileStore,
    words: Vec<String>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let mut rows = Vec::with_capacity(words.len());
    for word in words {
        let record = store.delete_word(&word).await?;
        rows.push((word, record));
    }

    if as_json {
        let payload: Vec<_> = rows
            .iter()
            .map(|(word, record)| json!({ "input": word, "deleted": record }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        for (word, record) in &rows {
            match record {
                Some(record) => println!("deleted {}", record.word),
                None => println!("{word:?} is not tracked"),
            }
        }
    }
    Ok(())
}

async fn handle_list(store: &FileStore, all: bool, as_json: bool) -> Result<(), Box<dyn Error>> {
    let records: Vec<WordRecord> = store
        .words()
        .await?
        .into_values()
        .filter(|record| all || record.is_active())
        .collect();

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
    } else {
        print_word_table(&records);
    }
    Ok(())
}

async fn handle_show(
    store: &FileStore,
    word: String,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let record = store
        .query_word(&word)
        .await?
        .ok_or_else(|| format!("No record found for word {word:?}"))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_record(&record);
    }
    Ok(())
}

async fn handle_highlight(
    store_path: &Path,
    file: PathBuf,
    output: Option<PathBuf>,
    as_json: bool,
) -> Result<(), Box<dyn Error>> {
    let html = fs::read_to_string(&file)
        .map_err(|err| format!("Failed to read {}: {err}", file.display()))?;
    let mut controller = InteractionController::new(
        EngineConfig::default(),
        Page::from_html(&html),
        JsonFileStorage::new(store_path),
        StaticDictionary::new(),
    );
    let stats = controller.start().await;
    controller.stop();
    let highlighted = controller.into_page().to_html();

    if let Some(path) = &output {
        fs::write(path, &highlighted)?;
    }
    if as_json {
        let html = output.is_none().then_some(&highlighted);
        let payload = json!({
            "file": file.display().to_string(),
            "output": output.as_ref().map(|path| path.display().to_string()),
            "stats": stats_to_json(&stats),
            "html": html,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if output.is_some() {
        println!(
            "Highlighted {} markers in {} of {} text nodes.",
            stats.markers, stats.rewritten, stats.scanned
        );
    } else {
        println!("{highlighted}");
    }
    Ok(())
}

fn handle_parse(file: PathBuf, as_json: bool) -> Result<(), Box<dyn Error>> {
    let html = fs::read_to_string(&file)
        .map_err(|err| format!("Failed to read {}: {err}", file.display()))?;
    let definition = parse_definition(&html);

    if as_json {
        let payload = json!({ "file": file.display().to_string(), "definition": definition });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }
    let definition =
        definition.ok_or_else(|| format!("No definition found in {}", file.display()))?;
    render_markdown_block("Definition", &definition);
    Ok(())
}

fn handle_url(word: String, as_json: bool) -> Result<(), Box<dyn Error>> {
    if word.trim().is_empty() {
        return Err("Word cannot be empty".into());
    }
    let url = lookup_url(&word);
    if as_json {
        println!("{}", serde_json::to_string_pretty(&json!({ "word": word, "url": url }))?);
    } else {
        println!("{url}");
    }
    Ok(())
}

fn stats_to_json(stats: &RewriteStats) -> serde_json::Value {
    json!({
        "scanned": stats.scanned,
        "rewritten": stats.rewritten,
        "markers": stats.markers,
        "failed": stats.failed,
    })
}

fn print_word_table(records: &[WordRecord]) {
    if records.is_empty() {
        println!("No words tracked.");
        return;
    }
    let width = records
        .iter()
        .map(|record| record.word.len())
        .max()
        .unwrap_or(4)
        .max("WORD".len());
    println!("{:<width$}  {:>7}  {:>7}  {}", "WORD", "QUERIES", "DELETES", "STATUS", width = width);
    println!("{:-<width$}  {:->7}  {:->7}  {}", "", "", "", "-------", width = width);
    for record in records {
        let status = if record.is_deleted { "deleted" } else { "active" };
        println!(
            "{:<width$}  {:>7}  {:>7}  {}",
            record.word,
            record.query_times,
            record.delete_times,
            status,
            width = width
        );
    }
}

fn print_record(record: &WordRecord) {
    println!("Word: {}", record.word);
    println!("Queries: {}", record.query_times);
    println!("Deletes: {}", record.delete_times);
    println!("Status: {}", if record.is_deleted { "deleted" } else { "active" });
    if let Some(definition) = &record.definition {
        render_markdown_block("Definition", definition);
    }
    if let Some(example) = &record.example {
        render_markdown_block("Example", example);
    }
}

fn stdout_is_tty() -> bool {
    atty::is(Stream::Stdout)
}

fn markdown_width() -> usize {
    let (width, _) = terminal_size();
    width.max(60) as usize
}

fn render_markdown_block(title: &str, body: &str) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return;
    }
    println!("\n{title}:");
    if stdout_is_tty() {
        let skin = MadSkin::default();
        // Markdown collapses single newlines; keep one part of speech per line.
        let body = trimmed.replace('\n', "  \n");
        let formatted = FmtText::from(&skin, &body, Some(markdown_width()));
        println!("{formatted}");
    } else {
        println!("{trimmed}");
    }
}
