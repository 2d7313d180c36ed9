//! CLI binary for lexigraph.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `GraphConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use lexigraph::prompts::EXAMPLE_LECTURE;
use lexigraph::{
    generate, generate_to_file, normalize, render_markup, validation_report, GraphConfig,
    GraphOutput, ImageFormat, PipelineProgressCallback, ProgressCallback, Stage,
};
use std::io::{self, IsTerminal, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a spinner showing the current stage, plus one
/// log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage, message: &str) {
        self.bar.set_prefix(format!("[{}/{}]", stage.step(), Stage::ALL.len()));
        self.bar.set_message(message.to_string());
    }

    fn on_stage_complete(&self, stage: Stage, elapsed_ms: u64) {
        self.bar.println(format!(
            "  {} {:<10}  {}",
            green("✓"),
            stage.to_string(),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
    }

    fn on_pipeline_complete(&self, total_ms: u64) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} Graph generated in {}",
            green("✔"),
            bold(&format!("{:.1}s", total_ms as f64 / 1000.0))
        );
    }

    fn on_pipeline_error(&self, stage: Stage, error: &str) {
        // Keep one line per failure.
        let msg = match error.char_indices().nth(100) {
            Some((cut, _)) => format!("{}\u{2026}", &error[..cut]),
            None => error.to_string(),
        };
        self.bar.println(format!("  {} {:<10}  {}", red("✗"), stage.to_string(), red(&msg)));
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Lecture notes to a PNG graph
  lexigraph lecture.txt -o graph.png

  # Read from stdin, print the DOT markup
  cat lecture.txt | lexigraph

  # Try it with the built-in sample lecture
  lexigraph --example -o sample.png

  # SVG through a specific provider and model
  lexigraph --provider anthropic --model claude-3-5-haiku-20241022 \
            --format svg lecture.txt -o graph.svg

  # Clean up DOT text you already have (no API key needed)
  lexigraph --normalize-only messy.dot

  # Render existing DOT without calling a model
  lexigraph --render-markup graph.dot -o graph.png

  # JSON output with summary, markup and stats
  lexigraph --json lecture.txt > result.json

  # HTTP API for the web front end
  lexigraph --serve --port 8000

SUPPORTED PROVIDERS & MODELS (per-request keys, --api-key / HTTP API):
  Provider     Default model                 Key prefix
  ─────────    ────────────────────────────  ──────────
  anthropic    claude-3-5-haiku-20241022     sk-ant-
  openai       gpt-4o                        sk-
  openrouter   anthropic/claude-3.5-haiku    sk-or-

  Without --api-key any provider edgequake-llm supports can be used; its
  key is read from the environment.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  OPENROUTER_API_KEY      OpenRouter API key
  LEXIGRAPH_PROVIDER      Override provider
  LEXIGRAPH_MODEL         Override model ID
  LEXIGRAPH_RENDER_URL    Graphviz render service base URL
  RUST_LOG                Log filter (overrides --verbose / --quiet)

  A .env file in the working directory is loaded first.
"#;

/// Turn lecture text into a rendered knowledge graph.
#[derive(Parser, Debug)]
#[command(
    name = "lexigraph",
    version,
    about = "Turn lecture text into a rendered knowledge graph",
    long_about = "Summarize lecture text into a topic hierarchy with an LLM, draw it as a \
Graphviz diagram, clean up the generated markup and render it to PNG or SVG through a hosted \
Graphviz service. Also serves the same pipeline as an HTTP API.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input text file ("-" or omitted: stdin).
    input: Option<PathBuf>,

    /// Write the image to this file instead of printing markup.
    #[arg(short, long, env = "LEXIGRAPH_OUTPUT")]
    output: Option<PathBuf>,

    /// LLM provider: openai, anthropic, openrouter, or any edgequake-llm provider.
    #[arg(long, env = "LEXIGRAPH_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID.
    #[arg(long, env = "LEXIGRAPH_MODEL")]
    model: Option<String>,

    /// API key used directly for this run (requires --provider).
    #[arg(long, env = "LEXIGRAPH_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Image format.
    #[arg(long, env = "LEXIGRAPH_FORMAT", value_enum, default_value = "png")]
    format: FormatArg,

    /// Base URL of the Graphviz render service.
    #[arg(long, env = "LEXIGRAPH_RENDER_URL")]
    render_url: Option<String>,

    /// LLM temperature.
    #[arg(long, env = "LEXIGRAPH_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Per-call LLM timeout in seconds.
    #[arg(long, env = "LEXIGRAPH_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Render service timeout in seconds.
    #[arg(long, env = "LEXIGRAPH_RENDER_TIMEOUT", default_value_t = 10)]
    render_timeout: u64,

    /// Minimum input length in characters.
    #[arg(long, env = "LEXIGRAPH_MIN_CHARS", default_value_t = 50)]
    min_chars: usize,

    /// Skip the educational-content classifier.
    #[arg(long, env = "LEXIGRAPH_SKIP_CLASSIFICATION")]
    skip_classification: bool,

    /// Skip the HEAD probe against the render service.
    #[arg(long)]
    no_probe: bool,

    /// Do not download the image (print the render URL only).
    #[arg(long)]
    no_fetch: bool,

    /// Treat the input as DOT markup: normalize, validate and print it.
    #[arg(long, conflicts_with_all = ["render_markup", "serve", "example"])]
    normalize_only: bool,

    /// Treat the input as DOT markup and render it without calling a model.
    #[arg(long, conflicts_with_all = ["serve", "example"])]
    render_markup: bool,

    /// Use the built-in sample lecture as input.
    #[arg(long)]
    example: bool,

    /// Output structured JSON (GraphOutput) instead of markup.
    #[arg(long, env = "LEXIGRAPH_JSON")]
    json: bool,

    /// Run the HTTP API instead of processing one input.
    #[arg(long)]
    serve: bool,

    /// Address for --serve.
    #[arg(long, env = "LEXIGRAPH_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port for --serve.
    #[arg(long, env = "LEXIGRAPH_PORT", default_value_t = 8000)]
    port: u16,

    /// Directory for images stored by --serve.
    #[arg(long, env = "LEXIGRAPH_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Delete stored images older than this many hours.
    #[arg(long, env = "LEXIGRAPH_MAX_AGE_HOURS", default_value_t = 24)]
    max_age_hours: u64,

    /// Disable progress spinner.
    #[arg(long, env = "LEXIGRAPH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "LEXIGRAPH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "LEXIGRAPH_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Png,
    Svg,
}

impl From<FormatArg> for ImageFormat {
    fn from(v: FormatArg) -> Self {
        match v {
            FormatArg::Png => ImageFormat::Png,
            FormatArg::Svg => ImageFormat::Svg,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Missing .env is fine.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the spinner is active;
    // the spinner provides all the feedback that matters to the user.
    // Only the model-backed path reports stages.
    let one_shot = !cli.serve && !cli.normalize_only && !cli.render_markup;
    let show_progress =
        one_shot && !cli.quiet && !cli.no_progress && !cli.json && io::stderr().is_terminal();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Normalize-only mode ──────────────────────────────────────────────
    if cli.normalize_only {
        let raw = read_input(&cli)?;
        let markup = normalize(&raw);
        let (ok, report) = validation_report(&markup);
        if cli.json {
            let json = serde_json::json!({ "valid": ok, "report": report, "markup": markup });
            println!(
                "{}",
                serde_json::to_string_pretty(&json).context("Failed to serialise output")?
            );
        } else {
            println!("{markup}");
        }
        if !ok {
            anyhow::bail!("{report}");
        }
        if !cli.quiet && !cli.json {
            eprintln!("{} {}", green("✔"), report);
        }
        return Ok(());
    }

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Server mode ──────────────────────────────────────────────────────
    if cli.serve {
        return run_server(&cli, config).await;
    }

    let input = if cli.example {
        EXAMPLE_LECTURE.to_string()
    } else {
        read_input(&cli)?
    };

    // ── Run pipeline ─────────────────────────────────────────────────────
    let output = if cli.render_markup {
        let output = render_markup(&input, &config)
            .await
            .context("Rendering failed")?;
        if let Some(ref path) = cli.output {
            write_image(&output, path).await?;
        }
        output
    } else if let Some(ref path) = cli.output {
        generate_to_file(&input, path, &config)
            .await
            .context("Graph generation failed")?
    } else {
        generate(&input, &config)
            .await
            .context("Graph generation failed")?
    };

    if cli.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if cli.output.is_none() {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        handle
            .write_all(output.markup.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.markup.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }
    }

    if !cli.quiet && !cli.json {
        print_summary(&output, cli.output.as_deref());
    }

    Ok(())
}

/// Map CLI args to `GraphConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<GraphConfig> {
    let mut builder = GraphConfig::builder()
        .temperature(cli.temperature)
        .api_timeout_secs(cli.api_timeout)
        .render_timeout_secs(cli.render_timeout)
        .image_format(cli.format.into())
        .min_input_chars(cli.min_chars)
        .skip_classification(cli.skip_classification)
        .probe_render(!cli.no_probe)
        .fetch_image(!cli.no_fetch)
        .output_dir(cli.output_dir.clone())
        .max_age_hours(cli.max_age_hours);

    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.trim().to_ascii_lowercase());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref url) = cli.render_url {
        builder = builder.render_base_url(url.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Input text from `--input`, or stdin when omitted or "-".
fn read_input(cli: &Cli) -> Result<String> {
    match cli.input.as_deref() {
        Some(path) if path != Path::new("-") => std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        _ => {
            let stdin = io::stdin();
            if stdin.is_terminal() {
                anyhow::bail!("No input: pass a file, pipe text on stdin, or use --example");
            }
            let mut text = String::new();
            stdin
                .lock()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

async fn write_image(output: &GraphOutput, path: &Path) -> Result<()> {
    let image = output
        .image
        .as_ref()
        .context("No image was fetched (drop --no-fetch to write a file)")?;
    lexigraph::storage::write_atomic(path, &image.bytes)
        .await
        .context("Failed to write image")?;
    Ok(())
}

fn print_summary(output: &GraphOutput, path: Option<&Path>) {
    let stats = &output.stats;
    if let Some(path) = path {
        eprintln!(
            "{}  {} bytes  {}ms  →  {}",
            green("✔"),
            stats.image_bytes,
            stats.total_duration_ms,
            bold(&path.display().to_string()),
        );
    }
    if stats.total_input_tokens > 0 || stats.total_output_tokens > 0 {
        eprintln!(
            "   {} tokens in  /  {} tokens out  via {}",
            dim(&stats.total_input_tokens.to_string()),
            dim(&stats.total_output_tokens.to_string()),
            stats.provider,
        );
    }
    eprintln!("   {} {}", cyan("render:"), dim(&output.render_url));
}

#[cfg(feature = "server")]
async fn run_server(cli: &Cli, config: GraphConfig) -> Result<()> {
    let addr: std::net::SocketAddr = format!("{}:{}", cli.host, cli.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", cli.host, cli.port))?;
    if !cli.quiet {
        eprintln!(
            "{} LexiGraph API on {}",
            cyan("◆"),
            bold(&format!("http://{addr}"))
        );
    }
    lexigraph::server::serve(addr, lexigraph::server::AppState::new(config))
        .await
        .context("HTTP server failed")
}

#[cfg(not(feature = "server"))]
async fn run_server(_cli: &Cli, _config: GraphConfig) -> Result<()> {
    anyhow::bail!("This build has no HTTP server; rebuild with --features server")
}
