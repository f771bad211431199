//! CLI for GenEdit - instruction-driven image editing.

use clap::{Args, Parser, Subcommand, ValueEnum};
use genedit::upload;
use genedit::{Config, GeminiEditor, GeminiModel, ImageEditor, Session, DEFAULT_DOWNLOAD_NAME};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "genedit")]
#[command(about = "Edit images with a text instruction via Gemini (default: remove the watermark)")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Model override (defaults to GEMINI_MODEL, then gemini-2.5-flash-image)
    #[arg(long, global = true, value_enum)]
    model: Option<ModelArg>,
}

#[derive(Subcommand)]
enum Commands {
    /// Edit an image with a text instruction
    Edit(EditArgs),

    /// Verify the API key and model are usable
    Check,
}

#[derive(Args)]
struct EditArgs {
    /// Image to edit (png, jpg, jpeg or webp)
    input: PathBuf,

    /// Editing instruction
    #[arg(short, long)]
    prompt: Option<String>,

    /// Output file path
    #[arg(short, long, default_value = DEFAULT_DOWNLOAD_NAME)]
    output: PathBuf,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    #[value(name = "gemini-2.5-flash-image")]
    NanoBanana,
    #[value(name = "nano-banana-pro-preview")]
    NanoBananaPro,
}

impl From<ModelArg> for GeminiModel {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::NanoBanana => GeminiModel::NanoBanana,
            ModelArg::NanoBananaPro => GeminiModel::NanoBananaPro,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if let Some(model) = cli.model {
        config.model = model.into();
    }
    let editor = GeminiEditor::from_config(&config, reqwest::Client::new())?;

    match cli.command {
        Commands::Edit(args) => {
            edit_image(editor, args, cli.json).await?;
        }
        Commands::Check => {
            check(editor, cli.json).await?;
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("genedit=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn edit_image(editor: GeminiEditor, args: EditArgs, json_output: bool) -> anyhow::Result<()> {
    let model = editor.model();
    let session = Session::new(Arc::new(editor));

    let selection = [args.input];
    let input = upload::select_single(&selection)?;
    session.upload_image(input).await?;

    if let Some(prompt) = args.prompt {
        session.set_prompt(prompt);
    }

    let start = std::time::Instant::now();
    let edited = session.submit_edit().await?;
    let duration_ms = start.elapsed().as_millis() as u64;

    session.download(&args.output).await?;

    if json_output {
        let snapshot = session.snapshot();
        let result = serde_json::json!({
            "success": true,
            "state": snapshot.state,
            "input": input.display().to_string(),
            "output": args.output.display().to_string(),
            "prompt": snapshot.prompt,
            "mime_type": edited.mime_type,
            "size_bytes": edited.size(),
            "editor": session.editor_name(),
            "model": model.as_str(),
            "duration_ms": duration_ms,
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!(
            "Edited image: {} ({} bytes, {}) via {}",
            args.output.display(),
            edited.size(),
            edited.mime_type,
            session.editor_name()
        );
        println!("Duration: {}ms", duration_ms);
    }

    Ok(())
}

async fn check(editor: GeminiEditor, json_output: bool) -> anyhow::Result<()> {
    let model = editor.model();
    editor.health_check().await?;

    if json_output {
        let result = serde_json::json!({
            "success": true,
            "editor": editor.name(),
            "model": model.as_str(),
        });
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("{} is reachable ({})", editor.name(), model.as_str());
    }

    Ok(())
}
