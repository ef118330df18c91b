use clap::{Parser, Subcommand};
use quire::graph::Query;
use quire::pipeline::{self, BuildOptions};
use quire::typography::Rhythm;
use quire::{config, output};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Name of the graph dump written by `build`.
const GRAPH_FILENAME: &str = "graph.json";

/// Shared flags for commands that derive images.
#[derive(clap::Args, Clone)]
struct CacheArgs {
    /// Disable the derivative cache and re-encode every image
    #[arg(long)]
    no_cache: bool,
}

#[derive(Parser)]
#[command(name = "quire")]
#[command(about = "Build-time content graph compiler for static blogs")]
#[command(long_about = "\
Build-time content graph compiler for static blogs

Markdown posts, YAML/JSON record files and images go in; a queryable graph of
typed nodes and a directory of responsive image derivatives come out.

Project structure:

  project/
  ├── config.toml                  # Sources, image and markdown settings
  ├── content/
  │   └── blog/
  │       └── salty-egg/
  │           ├── index.md         # Document → `blog` collection
  │           ├── salty_egg.jpg    # Image → `images` collection
  │           └── slides.pdf       # Linked file → copied to static/
  └── data/
      └── talks.yaml               # Records → `talks` collection

Markdown bodies run through a fixed chain: images → embeds → highlight →
linked files → punctuation.

Run 'quire gen-config' to generate a documented config.toml.")]
#[command(version)]
struct Cli {
    /// Project root (the directory holding config.toml)
    #[arg(long, default_value = ".", global = true)]
    root: PathBuf,

    /// Output directory (overrides `output_dir` from config.toml)
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the graph, derive images and write graph.json
    Build(CacheArgs),
    /// Validate sources, front matter and records without deriving anything
    Check,
    /// Build, then run a JSON query shape and print the rows
    Query {
        /// File holding the query shape, e.g. {"collection": "talks", "fields": ["title"]}
        shape: PathBuf,
        #[command(flatten)]
        cache: CacheArgs,
    },
    /// Print the base typography CSS for the configured rhythm
    Css,
    /// Print a stock config.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing();

    match cli.command {
        Command::Build(cache_args) => {
            let config = config::load_config(&cli.root)?;
            init_thread_pool(&config.processing);
            let options = build_options(&cli.root, cli.output.as_deref(), &config, &cache_args);

            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_build_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let result = pipeline::build(&config, &options, Some(tx));
            printer.join().ok();
            let result = result?;

            let graph_path = options.output_dir.join(GRAPH_FILENAME);
            let json = serde_json::to_string_pretty(&result.graph)?;
            std::fs::write(&graph_path, json)?;

            println!();
            output::print_graph_summary(&result.graph);
            println!();
            output::print_build_report(&result.report);
            println!("==> Build complete: {}", graph_path.display());
        }
        Command::Check => {
            let config = config::load_config(&cli.root)?;
            init_thread_pool(&config.processing);
            let options = BuildOptions::new(&cli.root, &config);
            println!("==> Checking {}", cli.root.display());
            let report = pipeline::check(&config, &options)?;
            output::print_check_report(&report);
            if report.skipped.is_empty() {
                println!("==> Content is valid");
            } else {
                return Err(format!("{} files cannot be parsed", report.skipped.len()).into());
            }
        }
        Command::Query { shape, cache } => {
            let query: Query = serde_json::from_str(&std::fs::read_to_string(&shape)?)?;
            let config = config::load_config(&cli.root)?;
            init_thread_pool(&config.processing);
            let options = build_options(&cli.root, cli.output.as_deref(), &config, &cache);
            let result = pipeline::build(&config, &options, None)?;
            let rows = result.graph.query(&query)?;
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        Command::Css => {
            let config = config::load_config(&cli.root)?;
            print!("{}", Rhythm::new(config.typography)?.base_css());
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

/// Log to stderr so stdout stays clean for `query` output.
///
/// `RUST_LOG` overrides the default `info` level.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_options(
    root: &Path,
    output: Option<&Path>,
    config: &config::BuildConfig,
    cache_args: &CacheArgs,
) -> BuildOptions {
    let mut options = BuildOptions::new(root, config);
    if let Some(dir) = output {
        options.output_dir = dir.to_path_buf();
    }
    options.use_cache = !cache_args.no_cache;
    options
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores. Config can lower it, never raise it.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
