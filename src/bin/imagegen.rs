//! CLI for imagegen - image generation, editing and composition with Gemini.

use clap::{Args, Parser, Subcommand, ValueEnum};
use imagegen::chat::{Dispatcher, LineEvent, LineSource};
use imagegen::{
    AspectRatio, AttachPolicy, GeminiProvider, GeminiProviderBuilder, GenerationConfig, Model,
    OperationOutcome, Resolution, Session,
};
use rustyline::error::ReadlineError;
use std::io::{self, Write};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "imagegen")]
#[command(about = "Generate, edit and compose images with Gemini")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log requests and responses to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an image from a text prompt
    Generate(GenerateArgs),

    /// Edit an existing image
    Edit(EditArgs),

    /// Compose a new image from several reference images
    Compose(ComposeArgs),

    /// Interactive multi-turn image generation and refinement
    Chat(ChatArgs),

    /// List available models
    Models,
}

#[derive(Args)]
struct GenerateArgs {
    /// Text prompt describing the image
    prompt: String,

    /// Output file path (e.g., output.png)
    output: PathBuf,

    #[command(flatten)]
    options: ImageOptions,
}

#[derive(Args)]
struct EditArgs {
    /// Input image path
    input: PathBuf,

    /// Edit instruction
    instruction: String,

    /// Output file path
    output: PathBuf,

    #[command(flatten)]
    options: ImageOptions,
}

#[derive(Args)]
struct ComposeArgs {
    /// Composition instruction
    instruction: String,

    /// Output file path
    output: PathBuf,

    /// Input images (up to 14)
    #[arg(required = true, num_args = 1..)]
    images: Vec<PathBuf>,

    /// Model to use (pro recommended for composition)
    #[arg(short, long, value_enum, default_value = "pro")]
    model: ModelArg,

    /// Output aspect ratio
    #[arg(short, long, value_enum)]
    aspect: Option<AspectRatioArg>,

    /// Output resolution (4K only available with the pro model)
    #[arg(short, long, value_enum)]
    size: Option<ResolutionArg>,
}

#[derive(Args)]
struct ImageOptions {
    /// Model to use
    #[arg(short, long, value_enum, default_value = "fast")]
    model: ModelArg,

    /// Output aspect ratio
    #[arg(short, long, value_enum)]
    aspect: Option<AspectRatioArg>,

    /// Output resolution (4K only available with the pro model)
    #[arg(short, long, value_enum)]
    size: Option<ResolutionArg>,
}

#[derive(Args)]
struct ChatArgs {
    /// Model to use
    #[arg(short, long, value_enum, default_value = "fast")]
    model: ModelArg,

    /// Directory to save images
    #[arg(short, long, default_value = ".")]
    output_dir: PathBuf,

    /// When to resend the current image with a message
    #[arg(long, value_enum, default_value = "first-turn")]
    attach: AttachArg,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModelArg {
    #[value(name = "fast", alias = "gemini-2.5-flash-image")]
    Fast,
    #[value(name = "pro", alias = "gemini-3-pro-image-preview")]
    Pro,
}

impl From<ModelArg> for Model {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::Fast => Model::Fast,
            ModelArg::Pro => Model::Pro,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AspectRatioArg {
    #[value(name = "1:1")]
    Square,
    #[value(name = "2:3")]
    Portrait2x3,
    #[value(name = "3:2")]
    Landscape3x2,
    #[value(name = "3:4")]
    Portrait3x4,
    #[value(name = "4:3")]
    Landscape4x3,
    #[value(name = "4:5")]
    Portrait4x5,
    #[value(name = "5:4")]
    Landscape5x4,
    #[value(name = "9:16")]
    Portrait9x16,
    #[value(name = "16:9")]
    Landscape16x9,
    #[value(name = "21:9")]
    Ultrawide,
}

impl From<AspectRatioArg> for AspectRatio {
    fn from(arg: AspectRatioArg) -> Self {
        match arg {
            AspectRatioArg::Square => AspectRatio::Square,
            AspectRatioArg::Portrait2x3 => AspectRatio::Portrait2x3,
            AspectRatioArg::Landscape3x2 => AspectRatio::Landscape3x2,
            AspectRatioArg::Portrait3x4 => AspectRatio::Portrait3x4,
            AspectRatioArg::Landscape4x3 => AspectRatio::Landscape4x3,
            AspectRatioArg::Portrait4x5 => AspectRatio::Portrait4x5,
            AspectRatioArg::Landscape5x4 => AspectRatio::Landscape5x4,
            AspectRatioArg::Portrait9x16 => AspectRatio::Portrait9x16,
            AspectRatioArg::Landscape16x9 => AspectRatio::Landscape16x9,
            AspectRatioArg::Ultrawide => AspectRatio::Ultrawide,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ResolutionArg {
    #[value(name = "1K")]
    OneK,
    #[value(name = "2K")]
    TwoK,
    #[value(name = "4K")]
    FourK,
}

impl From<ResolutionArg> for Resolution {
    fn from(arg: ResolutionArg) -> Self {
        match arg {
            ResolutionArg::OneK => Resolution::OneK,
            ResolutionArg::TwoK => Resolution::TwoK,
            ResolutionArg::FourK => Resolution::FourK,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AttachArg {
    FirstTurn,
    EveryTurn,
}

impl From<AttachArg> for AttachPolicy {
    fn from(arg: AttachArg) -> Self {
        match arg {
            AttachArg::FirstTurn => AttachPolicy::FirstTurn,
            AttachArg::EveryTurn => AttachPolicy::EveryTurn,
        }
    }
}

fn generation_config(
    model: ModelArg,
    aspect: Option<AspectRatioArg>,
    size: Option<ResolutionArg>,
) -> GenerationConfig {
    GenerationConfig {
        model: model.into(),
        aspect_ratio: aspect.map(Into::into),
        resolution: size.map(Into::into),
    }
}

impl ImageOptions {
    fn config(&self) -> GenerationConfig {
        generation_config(self.model, self.aspect, self.size)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "imagegen=debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Generate(args) => {
            let provider = GeminiProvider::builder().build()?;
            let outcome =
                imagegen::generate(&provider, &args.prompt, &args.output, args.options.config())
                    .await?;
            report(&mut io::stdout(), &outcome, "Image saved to", cli.json)
        }
        Commands::Edit(args) => {
            let provider = GeminiProvider::builder().build()?;
            let outcome = imagegen::edit(
                &provider,
                &args.input,
                &args.instruction,
                &args.output,
                args.options.config(),
            )
            .await?;
            report(&mut io::stdout(), &outcome, "Edited image saved to", cli.json)
        }
        Commands::Compose(args) => {
            let provider = GeminiProvider::builder().build()?;
            let config = generation_config(args.model, args.aspect, args.size);
            let outcome = imagegen::compose(
                &provider,
                &args.instruction,
                &args.output,
                &args.images,
                config,
            )
            .await?;
            report(&mut io::stdout(), &outcome, "Composed image saved to", cli.json)
        }
        Commands::Chat(args) => run_chat(args, GeminiProvider::builder()).await,
        Commands::Models => list_models(cli.json),
    }
}

/// Prints the outcome of a one-shot operation.
///
/// Fails when no image was saved, so the process exits non-zero.
fn report(
    out: &mut impl Write,
    outcome: &OperationOutcome,
    label: &str,
    json_output: bool,
) -> anyhow::Result<()> {
    if json_output {
        let result = serde_json::json!({
            "success": outcome.saved.is_some(),
            "output": outcome.saved.as_ref().map(|p| p.display().to_string()),
            "size_bytes": outcome.size_bytes,
            "format": outcome.format.map(|f| f.extension()),
            "text": outcome.text,
        });
        writeln!(out, "{}", serde_json::to_string_pretty(&result)?)?;
    } else {
        if let Some(ref path) = outcome.saved {
            writeln!(out, "{}: {}", label, path.display())?;
        }
        if let Some(ref text) = outcome.text {
            writeln!(out, "Model response: {}", text)?;
        }
    }

    if outcome.saved.is_none() {
        anyhow::bail!("the model returned no image");
    }
    Ok(())
}

/// Line input backed by rustyline, with history and Ctrl-C handling.
struct Readline {
    editor: rustyline::DefaultEditor,
}

impl LineSource for Readline {
    fn read_line(&mut self, prompt: &str) -> io::Result<LineEvent> {
        match self.editor.readline(&format!("\n{prompt}")) {
            Ok(line) => {
                if !line.trim().is_empty() {
                    if let Err(e) = self.editor.add_history_entry(line.as_str()) {
                        tracing::debug!(error = %e, "failed to record history entry");
                    }
                }
                Ok(LineEvent::Line(line))
            }
            Err(ReadlineError::Interrupted) => Ok(LineEvent::Interrupted),
            Err(ReadlineError::Eof) => Ok(LineEvent::Eof),
            Err(ReadlineError::Io(e)) => Err(e),
            Err(e) => Err(io::Error::other(e.to_string())),
        }
    }
}

async fn run_chat(args: ChatArgs, provider: GeminiProviderBuilder) -> anyhow::Result<()> {
    let provider = provider.build()?;
    std::fs::create_dir_all(&args.output_dir)?;

    let mut session = Session::new(GenerationConfig::new(args.model.into()))
        .with_attach_policy(args.attach.into());
    let mut input = Readline {
        editor: rustyline::DefaultEditor::new()?,
    };
    let mut dispatcher = Dispatcher::new(&args.output_dir, io::stdout());

    dispatcher.banner(&session)?;
    dispatcher.run(&mut session, &provider, &mut input).await?;
    Ok(())
}

fn list_models(json_output: bool) -> anyhow::Result<()> {
    #[derive(serde::Serialize)]
    struct ModelInfo {
        name: &'static str,
        id: &'static str,
        supports_4k: bool,
    }

    let models: Vec<ModelInfo> = Model::ALL
        .iter()
        .map(|m| ModelInfo {
            name: match m {
                Model::Fast => "fast",
                Model::Pro => "pro",
            },
            id: m.as_str(),
            supports_4k: m.supports(Resolution::FourK),
        })
        .collect();

    if json_output {
        println!("{}", serde_json::to_string_pretty(&models)?);
    } else {
        println!("Available models:\n");
        for m in &models {
            println!("  {} ({})", m.name, m.id);
            let sizes = if m.supports_4k { "1K, 2K, 4K" } else { "1K, 2K" };
            println!("    Resolutions: {}", sizes);
        }
        let ratios: Vec<&str> = AspectRatio::ALL.iter().map(|r| r.as_str()).collect();
        println!("\nAspect ratios: {}", ratios.join(", "));
        println!("API key: GEMINI_API_KEY (or GOOGLE_API_KEY)");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use imagegen::ImageFormat;

    fn saved(text: Option<&str>) -> OperationOutcome {
        OperationOutcome {
            saved: Some(PathBuf::from("out.png")),
            text: text.map(String::from),
            format: Some(ImageFormat::Png),
            size_bytes: 42,
        }
    }

    fn not_saved(text: Option<&str>) -> OperationOutcome {
        OperationOutcome {
            text: text.map(String::from),
            ..OperationOutcome::default()
        }
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_compose_requires_an_image() {
        assert!(Cli::try_parse_from(["imagegen", "compose", "merge", "out.png"]).is_err());
        assert!(Cli::try_parse_from(["imagegen", "compose", "merge", "out.png", "a.png"]).is_ok());
    }

    #[test]
    fn test_parse_generate_options() {
        let cli = Cli::try_parse_from([
            "imagegen", "generate", "a cat", "cat.png", "-m", "pro", "-a", "16:9", "-s", "4K",
        ])
        .unwrap();

        let Commands::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        let config = args.options.config();
        assert_eq!(config.model, Model::Pro);
        assert_eq!(config.aspect_ratio, Some(AspectRatio::Landscape16x9));
        assert_eq!(config.resolution, Some(Resolution::FourK));
    }

    #[test]
    fn test_report_image_without_text_prints_only_path() {
        let mut out = Vec::new();
        report(&mut out, &saved(None), "Image saved to", false).unwrap();

        assert_eq!(String::from_utf8(out).unwrap(), "Image saved to: out.png\n");
    }

    #[test]
    fn test_report_includes_model_text() {
        let mut out = Vec::new();
        report(&mut out, &saved(Some("A red circle.")), "Image saved to", false).unwrap();

        let printed = String::from_utf8(out).unwrap();
        assert!(printed.contains("Model response: A red circle."));
    }

    #[test]
    fn test_report_without_image_fails() {
        let mut out = Vec::new();
        let err = report(&mut out, &not_saved(Some("I can't draw that")), "Image saved to", false)
            .unwrap_err();

        assert!(err.to_string().contains("the model returned no image"));
        let printed = String::from_utf8(out).unwrap();
        assert!(!printed.contains("saved to"));
        assert!(printed.contains("I can't draw that"));
    }

    #[test]
    fn test_report_json_shape() {
        let mut out = Vec::new();
        report(&mut out, &saved(None), "Image saved to", true).unwrap();

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["output"], "out.png");
        assert_eq!(value["format"], "png");
        assert_eq!(value["size_bytes"], 42);
        assert!(value["text"].is_null());
    }

    #[test]
    fn test_report_json_without_image_fails() {
        let mut out = Vec::new();
        assert!(report(&mut out, &not_saved(None), "Image saved to", true).is_err());

        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["success"], false);
        assert!(value["output"].is_null());
    }

    #[tokio::test]
    async fn test_chat_without_key_creates_no_directory() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("images");
        let args = ChatArgs {
            model: ModelArg::Fast,
            output_dir: output_dir.clone(),
            attach: AttachArg::FirstTurn,
        };

        let err = run_chat(args, GeminiProvider::builder().api_key(" "))
            .await
            .unwrap_err();

        assert!(err.to_string().contains("configuration error"));
        assert!(!output_dir.exists());
    }
}
