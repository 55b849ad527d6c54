use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use nsql::agent::{AgentResponse, NsqlAgent};
use nsql::catalog::SchemaCatalog;
use nsql::config::{AgentConfig, RetrieverConfig, Settings};
use nsql::db::{init_pool, introspect_catalog, PgExecutor};
use nsql::llm::LlmClient;
use nsql::schema_rag::{ContextRetriever, SchemaEmbedder};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";

#[derive(Parser)]
#[command(name = "nsql")]
#[command(about = "Natural Language to SQL Converter")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Configure database and table descriptions
    Config {
        /// Database URL to set
        #[arg(long)]
        db_url: Option<String>,
        /// Path to JSON file containing custom table descriptions
        #[arg(long)]
        table_descriptions: Option<String>,
        /// Chat model to use for generation
        #[arg(long)]
        model: Option<String>,
        /// Show current configuration
        #[arg(long)]
        show: bool,
        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },
    /// Run a natural language query
    Query {
        /// Natural language query to convert to SQL
        #[arg(long)]
        query: String,
        #[command(flatten)]
        session: SessionArgs,
    },
    /// Run in interactive mode
    Interactive {
        #[command(flatten)]
        session: SessionArgs,
    },
}

#[derive(Args)]
struct SessionArgs {
    /// Database URL (overrides config)
    #[arg(long)]
    db_url: Option<String>,
    /// Path to JSON file containing custom table descriptions (overrides config)
    #[arg(long)]
    table_descriptions: Option<PathBuf>,
    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,
    /// Number of tables retrieved as generation context
    #[arg(long, default_value_t = 3)]
    top_k: usize,
    /// Generation retries permitted after a rejection
    #[arg(long, default_value_t = 2)]
    retries: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = settings_path();

    match cli.command {
        Command::Config {
            db_url,
            table_descriptions,
            model,
            show,
            reset,
        } => handle_config(&config_path, db_url, table_descriptions, model, show, reset),
        Command::Query { query, session } => {
            let agent = build_agent(&config_path, &session).await?;
            let response = agent
                .process_query(&query)
                .await
                .with_context(|| format!("query failed: {}", query))?;
            print_response(&response);
            Ok(())
        }
        Command::Interactive { session } => {
            let agent = build_agent(&config_path, &session).await?;
            run_interactive(&agent).await
        }
    }
}

fn settings_path() -> PathBuf {
    let home = std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));
    home.join(".nsql").join("config.json")
}

fn handle_config(
    path: &PathBuf,
    db_url: Option<String>,
    table_descriptions: Option<String>,
    model: Option<String>,
    show: bool,
    reset: bool,
) -> Result<()> {
    if show {
        let settings = Settings::load(path)?;
        println!("Current Configuration:");
        println!("  Database URL: {}", or_not_set(&settings.db_url));
        println!(
            "  Table Descriptions File: {}",
            or_not_set(&settings.table_descriptions_file)
        );
        println!("  Model: {}", or_not_set(&settings.model));
        return Ok(());
    }

    if reset {
        Settings::default().save(path)?;
        println!("Configuration reset to defaults");
        return Ok(());
    }

    let mut settings = Settings::load(path)?;
    let mut changed = false;
    if let Some(db_url) = db_url {
        println!("Database URL set to: {}", db_url);
        settings.db_url = db_url;
        changed = true;
    }
    if let Some(file) = table_descriptions {
        println!("Table descriptions file set to: {}", file);
        settings.table_descriptions_file = file;
        changed = true;
    }
    if let Some(model) = model {
        println!("Model set to: {}", model);
        settings.model = model;
        changed = true;
    }

    if changed {
        settings.save(path)?;
        println!("Configuration saved to {}", path.display());
    }
    Ok(())
}

fn or_not_set(value: &str) -> &str {
    if value.is_empty() {
        "Not set"
    } else {
        value
    }
}

async fn build_agent(config_path: &PathBuf, args: &SessionArgs) -> Result<NsqlAgent> {
    let settings = Settings::load(config_path)?;

    let db_url = args
        .db_url
        .clone()
        .or_else(|| (!settings.db_url.is_empty()).then(|| settings.db_url.clone()));
    let Some(db_url) = db_url else {
        bail!("Database URL not provided and not configured. Use 'nsql config --db-url <url>' to set it.");
    };

    let pool = init_pool(&db_url).await?;

    let descriptor_file = args.table_descriptions.clone().or_else(|| {
        (!settings.table_descriptions_file.is_empty())
            .then(|| PathBuf::from(&settings.table_descriptions_file))
    });
    let catalog = match descriptor_file {
        Some(path) => {
            let json = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let catalog = SchemaCatalog::from_descriptor_json(&json)?;
            println!(
                "Loaded {} table descriptions from {}",
                catalog.len(),
                path.display()
            );
            catalog
        }
        None => introspect_catalog(&pool).await?,
    };

    let api_key = args
        .api_key
        .clone()
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_else(|| {
            warn!("no API key configured, running with the offline dummy generator");
            "dummy-api-key".to_string()
        });

    let retriever = if api_key == "dummy-api-key" {
        ContextRetriever::new(RetrieverConfig::default())
    } else {
        ContextRetriever::with_embedder(
            RetrieverConfig::default(),
            SchemaEmbedder::new(
                api_key.clone(),
                OPENAI_BASE_URL.to_string(),
                EMBEDDING_MODEL.to_string(),
            ),
        )
    };

    let model = if settings.model.is_empty() {
        DEFAULT_CHAT_MODEL.to_string()
    } else {
        settings.model.clone()
    };
    let generator = Arc::new(LlmClient::new(api_key, model));
    let executor = Arc::new(PgExecutor::new(pool));

    let config = AgentConfig {
        top_k: args.top_k,
        retry_budget: args.retries,
        ..AgentConfig::default()
    };

    Ok(NsqlAgent::new(
        Arc::new(catalog),
        retriever,
        generator,
        executor,
        config,
    ))
}

fn print_response(response: &AgentResponse) {
    println!("Generated SQL: {}", response.sql);
    println!();

    if response.result.rows.is_empty() {
        println!("No results found.");
        return;
    }

    println!("Columns: {}", response.result.columns.join(", "));
    println!("{}", "-".repeat(50));
    for row in &response.result.rows {
        let rendered: Vec<String> = row
            .iter()
            .map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Null => "NULL".to_string(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", rendered.join(" | "));
    }
    println!("({} rows)", response.result.row_count());
}

async fn run_interactive(agent: &NsqlAgent) -> Result<()> {
    println!("Natural Language to SQL Converter - Interactive Mode");
    println!("Enter your natural language queries (type 'exit' to quit):");

    let stdin = std::io::stdin();
    loop {
        print!("\n> ");
        std::io::stdout().flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!("\nGoodbye!");
            return Ok(());
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input.to_lowercase().as_str(), "exit" | "quit" | "q") {
            println!("Goodbye!");
            return Ok(());
        }

        match agent.process_query(input).await {
            Ok(response) => print_response(&response),
            Err(e) => eprintln!("Error: {}", e),
        }
    }
}
