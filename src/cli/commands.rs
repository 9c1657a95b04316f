//! CLI command definitions and handlers

use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::chat::{AskOptions, Assistant, PromptStyle};
use crate::core::config::AppConfig;
use crate::core::cost::CostCalculator;
use crate::core::models::{language_name, UploadFile, UsageRecord, SUPPORTED_LANGUAGES};

/// Commands for docchat
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a text file, or every .txt file in a directory
    Upload {
        /// File or directory to upload
        path: PathBuf,

        /// Descend into subdirectories
        #[arg(short, long)]
        recursive: bool,
    },

    /// List documents in the container
    List,

    /// Print one document
    Read {
        /// Blob name
        name: String,
    },

    /// Ask a question grounded in the uploaded documents
    Chat {
        /// The question
        input: String,

        /// Deployment to use (default: OPENAI_DEPLOYMENT)
        #[arg(short, long)]
        deployment: Option<String>,

        /// Sampling temperature, 0.1 to 1.0
        #[arg(long, default_value_t = 0.7)]
        temperature: f32,

        /// Maximum tokens to generate
        #[arg(long, default_value_t = 1000)]
        max_tokens: u32,

        /// Wrap the documents in an answer-only-from-this preamble
        #[arg(long)]
        instructed: bool,

        /// Read the preamble from a file instead (implies --instructed)
        #[arg(long)]
        preamble: Option<PathBuf>,

        /// Also translate the reply into this language
        #[arg(short, long)]
        translate_to: Option<String>,
    },

    /// Translate English text
    Translate {
        /// Text to translate
        text: String,

        /// Target language code
        #[arg(short, long, default_value = "fr")]
        to: String,
    },

    /// Price a completion from its token counts
    Cost {
        /// Tokens in the prompt
        #[arg(long)]
        prompt_tokens: u64,

        /// Tokens generated
        #[arg(long)]
        completion_tokens: u64,

        /// Reported total (default: prompt + completion)
        #[arg(long)]
        total_tokens: Option<u64>,

        /// Deployment whose rate applies
        #[arg(short, long)]
        deployment: Option<String>,
    },

    /// Show the languages replies can be translated into
    Languages,

    /// Start HTTP API server
    Server {
        /// Bind address (default: 0.0.0.0)
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Listen port (default: 8000)
        #[arg(short, long, default_value_t = 8000)]
        port: u16,
    },
}

/// Files an upload command covers
pub fn collect_upload_files(path: &Path, recursive: bool) -> anyhow::Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("{} does not exist", path.display());
    }

    let max_depth = if recursive { usize::MAX } else { 1 };
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(path)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| {
            p.extension()
                .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case("txt"))
                .unwrap_or(false)
        })
        .collect();
    files.sort();

    Ok(files)
}

/// Handle upload command
pub async fn handle_upload(config: &AppConfig, path: PathBuf, recursive: bool) -> anyhow::Result<()> {
    use indicatif::{ProgressBar, ProgressStyle};
    use tracing::info;

    let assistant = Assistant::new(config)?;
    let files = collect_upload_files(&path, recursive)?;

    if files.is_empty() {
        anyhow::bail!("No .txt files found in {}", path.display());
    }

    info!("Uploading {} files to {}", files.len(), config.storage.container);

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
        .progress_chars("=>-"));

    let mut uploaded = 0;
    let mut failed = 0;

    for file_path in files {
        pb.set_message(format!("{}", file_path.display()));

        let result = match UploadFile::from_path(&file_path).await {
            Ok(file) => assistant.upload(file).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(name) => {
                uploaded += 1;
                pb.println(format!("✅ '{}' uploaded to '{}/{}'", name, config.storage.container, name));
            }
            Err(e) => {
                failed += 1;
                pb.println(format!("❌ {}: {}", file_path.display(), e));
            }
        }
        pb.inc(1);
    }

    pb.finish_with_message("Completed");

    println!("\n   Uploaded: {}", uploaded);
    println!("   Failed: {}", failed);

    println!("\nDocuments in {}:", config.storage.container);
    for name in assistant.list_documents().await? {
        println!("   {}", name);
    }

    Ok(())
}

/// Handle list command
pub async fn handle_list(config: &AppConfig) -> anyhow::Result<()> {
    let assistant = Assistant::new(config)?;
    let names = assistant.list_documents().await?;

    if names.is_empty() {
        println!("No documents in {}", config.storage.container);
        return Ok(());
    }

    for name in names {
        println!("{}", name);
    }
    Ok(())
}

/// Handle read command
pub async fn handle_read(config: &AppConfig, name: String) -> anyhow::Result<()> {
    let assistant = Assistant::new(config)?;
    print!("{}", assistant.read_document(&name).await?);
    Ok(())
}

/// Options of the chat command, gathered from its flags
#[derive(Debug)]
pub struct ChatArgs {
    pub input: String,
    pub deployment: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
    pub instructed: bool,
    pub preamble: Option<PathBuf>,
    pub translate_to: Option<String>,
}

/// Handle chat command
pub async fn handle_chat(config: &AppConfig, args: ChatArgs) -> anyhow::Result<()> {
    let assistant = Assistant::new(config)?;

    let style = match (&args.preamble, args.instructed) {
        (Some(path), _) => PromptStyle::Instructed(Some(std::fs::read_to_string(path)?)),
        (None, true) => PromptStyle::Instructed(None),
        (None, false) => PromptStyle::Chat,
    };
    let options = AskOptions {
        deployment: args.deployment,
        temperature: args.temperature,
        max_tokens: args.max_tokens,
        style,
    };

    let turn = match &args.translate_to {
        Some(lang) => assistant.ask_and_translate(&args.input, &options, lang).await?,
        None => assistant.ask(&args.input, &options).await?,
    };

    println!("{}\n", turn.reply);

    if let Some(translation) = &turn.translation {
        let label = language_name(&translation.target_lang).unwrap_or(translation.target_lang.as_str());
        println!("[{}] {}\n", label, translation.translation);
    }

    println!("Deployment: {}", turn.deployment);
    print_cost_table(&turn.cost);
    if !turn.cost_estimated {
        println!("(no token usage reported; cost not estimated)");
    }

    Ok(())
}

/// Handle translate command
pub async fn handle_translate(config: &AppConfig, text: String, to: String) -> anyhow::Result<()> {
    let translator = crate::core::translator::Translator::new(config.translator.clone())?;
    println!("{}", translator.translate_text(&text, &to).await?);
    Ok(())
}

/// Handle cost command. Works without a full configuration, at built-in rates.
pub fn handle_cost(
    config: Option<&AppConfig>,
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: Option<u64>,
    deployment: Option<String>,
) -> anyhow::Result<()> {
    let calculator = config
        .map(|c| CostCalculator::new(c.completion.deployments.clone()))
        .unwrap_or_default();
    let deployment = deployment
        .or_else(|| config.map(|c| c.completion.default_deployment.clone()))
        .unwrap_or_default();

    let usage = UsageRecord {
        prompt_tokens,
        completion_tokens,
        total_tokens: total_tokens.unwrap_or_else(|| prompt_tokens.saturating_add(completion_tokens)),
    };
    let cost = calculator.compute(&deployment, Some(&usage))?;

    println!("Rate: {} per token", calculator.rate_for(&deployment));
    print_cost_table(&cost);
    Ok(())
}

/// Handle languages command
pub fn handle_languages() {
    for (code, name) in SUPPORTED_LANGUAGES {
        println!("{:<4} {}", code, name);
    }
}

/// Handle server command
pub async fn handle_server(config: AppConfig, host: String, port: u16) -> anyhow::Result<()> {
    use crate::server::api::run_server;
    use tracing::info;

    info!("Starting HTTP server on {}:{}", host, port);
    println!("🚀 Server starting on http://{}:{}", host, port);

    run_server(config, host, port).await?;

    Ok(())
}

fn print_cost_table(cost: &crate::core::models::CostBreakdown) {
    println!("{:<20} {}", "Measure", "Value");
    for (measure, value) in cost.rows() {
        println!("{:<20} {}", measure, value);
    }
    println!("All prices are in USD");
}
