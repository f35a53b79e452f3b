//! ninja-convert - Ninja model conversion tool
//!
//! Reads a model document (JSON), re-encodes its attaches through the
//! bone-weighted representation and writes the result back out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ninja_model::{AttachFormat, ConvertOptions, Model, from_weighted, to_weighted};

#[derive(Parser)]
#[command(name = "ninja-convert")]
#[command(about = "Ninja model conversion tool")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-emit every attach of a model in another format
    Convert {
        /// Input model (.json)
        input: PathBuf,

        /// Target attach format (basic, chunk, gc or buffer)
        #[arg(short, long)]
        format: String,

        /// Output model (defaults to <input>.<format>.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Conversion options (.toml)
        #[arg(long)]
        options: Option<PathBuf>,
    },

    /// Print the weighted meshes a model converts to
    Inspect {
        /// Input model (.json)
        input: PathBuf,

        /// Conversion options (.toml)
        #[arg(long)]
        options: Option<PathBuf>,
    },

    /// Generate buffer meshes for every attach
    Buffer {
        /// Input model (.json)
        input: PathBuf,

        /// Output model (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_model(path: &Path) -> Result<Model> {
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Failed to parse model {}", path.display()))
}

fn save_model(model: &Model, path: &Path) -> Result<()> {
    let text = serde_json::to_string_pretty(model).context("Failed to serialize model")?;
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

fn load_options(path: Option<&Path>) -> Result<ConvertOptions> {
    let Some(path) = path else {
        return Ok(ConvertOptions::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    ConvertOptions::from_toml_str(&text).with_context(|| format!("Invalid options in {}", path.display()))
}

fn parse_format(name: &str) -> Result<AttachFormat> {
    AttachFormat::from_name(name)
        .with_context(|| format!("Unknown attach format {name:?} (use basic, chunk, gc or buffer)"))
}

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Convert {
            input,
            format,
            output,
            options,
        } => {
            let format = parse_format(&format)?;
            let options = load_options(options.as_deref())?;
            let output = output.unwrap_or_else(|| input.with_extension(format!("{format:?}.json").to_lowercase()));
            tracing::info!("Converting {:?} -> {:?} ({:?})", input, output, format);

            let mut model = load_model(&input)?;
            let meshes = to_weighted(&model, &options).context("Failed to lift attaches to weighted meshes")?;
            from_weighted(&mut model, &meshes, format, &options)
                .with_context(|| format!("Failed to emit {format:?} attaches"))?;
            save_model(&model, &output)?;
            tracing::info!("Done!");
        }

        Commands::Inspect { input, options } => {
            let options = load_options(options.as_deref())?;
            let model = load_model(&input)?;
            let meshes = to_weighted(&model, &options).context("Failed to lift attaches to weighted meshes")?;

            println!("{} weighted mesh(es) in {}", meshes.len(), input.display());
            for mesh in &meshes {
                println!(
                    "  {}: roots {:?}, depending {:?}, {} vertices, {} triangles{}",
                    mesh.label.as_deref().unwrap_or("<unnamed>"),
                    mesh.root_indices,
                    mesh.depending(),
                    mesh.vertices.len(),
                    mesh.triangle_count(),
                    if mesh.is_weighted() { ", weighted" } else { "" },
                );
            }
        }

        Commands::Buffer { input, output } => {
            let output = output.unwrap_or_else(|| input.clone());
            tracing::info!("Buffering {:?} -> {:?}", input, output);
            let mut model = load_model(&input)?;
            model.buffer_attaches();
            save_model(&model, &output)?;
            tracing::info!("Done!");
        }
    }

    Ok(())
}
