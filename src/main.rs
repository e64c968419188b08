use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use malaria_cam::diagnose::{diagnose, ExplainTarget};
use malaria_cam::network::spec::PRESETS;
use malaria_cam::preprocess::prepare;
use malaria_cam::visual::{ColorMapKind, EncodedImage, Interpolation};
use malaria_cam::{logging, Classifier, ExplainConfig, Network, NetworkSpec, Shape};

#[derive(Parser)]
#[command(name = "malaria-cam")]
#[command(author, version)]
#[command(about = "Classify blood-cell images and explain the decision with Grad-CAM")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an image and write original/heatmap/overlay PNGs
    Explain {
        /// Model file written by `init-model` or `Network::save_json`
        #[arg(short, long)]
        model: PathBuf,

        /// Image to classify (PNG, JPEG, BMP or GIF)
        #[arg(short, long)]
        image: PathBuf,

        /// Output directory for the PNG files
        #[arg(short, long, default_value = "explanation")]
        out: PathBuf,

        /// Class to explain instead of the predicted one
        #[arg(short, long)]
        target: Option<usize>,

        /// Heatmap weight in the overlay
        #[arg(short, long, default_value_t = malaria_cam::config::DEFAULT_ALPHA)]
        alpha: f64,

        /// Color ramp: jet or hot
        #[arg(long, default_value = "jet")]
        colormap: String,

        /// Use nearest-neighbour instead of bilinear map upsampling
        #[arg(long)]
        nearest: bool,
    },

    /// Write an untrained model built from a preset architecture
    InitModel {
        /// One of: features, residual, plain, dense
        #[arg(short, long, default_value = "features")]
        preset: String,

        #[arg(short, long)]
        out: PathBuf,

        /// Seed for weight initialization
        #[arg(short, long, default_value_t = 42)]
        seed: u64,

        /// Square input size in pixels
        #[arg(long, default_value_t = 224)]
        size: usize,

        #[arg(long, default_value_t = 2)]
        classes: usize,
    },
}

fn parse_colormap(name: &str) -> Result<ColorMapKind, String> {
    match name.to_ascii_lowercase().as_str() {
        "jet" => Ok(ColorMapKind::Jet),
        "hot" => Ok(ColorMapKind::Hot),
        other => Err(format!("unknown colormap '{}': expected jet or hot", other)),
    }
}

fn write_png(dir: &Path, name: &str, image: &EncodedImage) -> Result<(), String> {
    let bytes = image.png_bytes().map_err(|e| e.to_string())?;
    let path = dir.join(name);
    fs::write(&path, bytes).map_err(|e| format!("could not write {}: {}", path.display(), e))?;
    info!(path = %path.display(), "wrote image");
    Ok(())
}

fn run_explain(
    model: &Path,
    image: &Path,
    out: &Path,
    target: Option<usize>,
    alpha: f64,
    colormap: &str,
    nearest: bool,
) -> Result<(), String> {
    let config = ExplainConfig {
        alpha,
        colormap: parse_colormap(colormap)?,
        interpolation: if nearest { Interpolation::Nearest } else { Interpolation::Bilinear },
    };
    config.validate().map_err(|e| e.to_string())?;

    let network = Network::load_json(&model.to_string_lossy()).map_err(|e| e.to_string())?;
    let bytes = fs::read(image).map_err(|e| format!("could not read {}: {}", image.display(), e))?;
    let prepared = prepare(&bytes, network.input_shape(), &network.metadata.normalization())
        .map_err(|e| e.to_string())?;

    let target = target.map_or(ExplainTarget::Predicted, ExplainTarget::Class);
    let diagnosis = diagnose(&network, &prepared, &network.labels(), &config, target)
        .map_err(|e| e.to_string())?;

    fs::create_dir_all(out).map_err(|e| format!("could not create {}: {}", out.display(), e))?;
    let visualization = &diagnosis.visualization;
    write_png(out, "original.png", &visualization.original)?;
    if let Some(heatmap) = &visualization.heatmap {
        write_png(out, "heatmap.png", heatmap)?;
    }
    if let Some(overlay) = &visualization.overlay {
        write_png(out, "overlay.png", overlay)?;
    }

    let summary = serde_json::json!({
        "image": image.display().to_string(),
        "prediction": diagnosis.prediction.label,
        "class_id": diagnosis.prediction.class_id,
        "confidence": diagnosis.prediction.confidence,
        "probabilities": diagnosis.prediction.probabilities,
        "method": diagnosis.method,
        "explanation": diagnosis.explanation,
        "explanation_error": diagnosis.explanation_error,
        "output_dir": out.display().to_string(),
    });
    let text = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
    println!("{}", text);
    Ok(())
}

fn run_init_model(preset: &str, out: &Path, seed: u64, size: usize, classes: usize) -> Result<(), String> {
    let shape = Shape::new(3, size, size);
    let spec = NetworkSpec::preset(preset, shape, classes).ok_or_else(|| {
        format!("unknown preset '{}': expected one of {}", preset, PRESETS.join(", "))
    })?;
    let network = Network::from_spec(&spec, seed).map_err(|e| e.to_string())?;
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| format!("could not create {}: {}", parent.display(), e))?;
    }
    network.save_json(&out.to_string_lossy()).map_err(|e| e.to_string())?;
    println!("Wrote {} model ({} layers, input {}) to {}", preset, network.layers.len(), shape, out.display());
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Explain { model, image, out, target, alpha, colormap, nearest } => {
            run_explain(&model, &image, &out, target, alpha, &colormap, nearest)
        }
        Commands::InitModel { preset, out, seed, size, classes } => {
            run_init_model(&preset, &out, seed, size, classes)
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!(%message, "command failed");
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}
