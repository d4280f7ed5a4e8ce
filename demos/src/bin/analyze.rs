//! Diagnose CT/MRI slices with a trained DFDN checkpoint.
//!
//! For every input image a JSON report, a text report and a pathology
//! heat-map PNG are written to the output directory. With `--tsne` the
//! embeddings of all inputs are projected to 2-D as well.
//!
//! ```bash
//! cargo run --release --bin analyze -- --checkpoint-dir checkpoints --modality mri scan1.png scan2.png
//! ```

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use burn::tensor::Tensor;
use clap::Parser;
use dfdn_burn::{
    analysis::project_features,
    training::{image_tensor, load_image},
    DfdnConfig, DiagnosticReport, HeatmapConfig, Modality, TsneConfig,
};
use dfdn_demos::{
    create_device, get_backend_name, init_logging, write_json, SelectedBackend, SelectedDevice,
};
use image::GrayImage;

type Dfdn = dfdn_burn::Dfdn<SelectedBackend>;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Images to analyse
    #[arg(required = true)]
    images: Vec<PathBuf>,

    /// Directory holding the trained checkpoint
    #[arg(long, default_value = "checkpoints")]
    checkpoint_dir: PathBuf,

    /// Imaging modality (ct or mri)
    #[arg(long, default_value = "ct")]
    modality: String,

    /// Model configuration file (JSON)
    #[arg(long)]
    model_config: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "analysis")]
    output: PathBuf,

    /// Also project the embeddings of all inputs with t-SNE
    #[arg(long)]
    tsne: bool,
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let modality: Modality = args.modality.parse()?;
    let config = match &args.model_config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read model config: {}", path.display()))?;
            serde_json::from_str::<DfdnConfig>(&text)
                .with_context(|| format!("Failed to parse model config: {}", path.display()))?
        }
        None => DfdnConfig::new(),
    }
    .with_modality(modality.clone());

    let device = create_device();
    tracing::info!(backend = get_backend_name(), modality = modality.name(), "loading model");
    let model = Dfdn::load_for_modality(&config, &args.checkpoint_dir, &device)?;

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("Failed to create {}", args.output.display()))?;

    let mut batch = Vec::with_capacity(args.images.len());
    let mut predicted = Vec::with_capacity(args.images.len());
    for path in &args.images {
        let (tensor, report) = analyze_image(&model, path, &device)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("image");

        write_json(&args.output.join(format!("{stem}_report.json")), &report)?;
        std::fs::write(args.output.join(format!("{stem}_report.txt")), report.to_string())
            .context("Failed to write text report")?;
        save_heatmap(&report, &args.output.join(format!("{stem}_heatmap.png")))?;

        println!("{}: {} ({:.4})", path.display(), report.diagnosis.label(), report.diagnosis.confidence);
        predicted.push(report.diagnosis.class_index);
        batch.push(tensor);
    }

    if args.tsne {
        ensure!(batch.len() >= 2, "t-SNE needs at least two images");
        let (pathology, physiology) = model.extract_features(Tensor::cat(batch, 0))?;
        let projection =
            project_features(pathology, physiology, Some(&predicted), &TsneConfig::new())?;
        write_json(&args.output.join("tsne.json"), &projection)?;
    }

    Ok(())
}

fn analyze_image(
    model: &Dfdn,
    path: &Path,
    device: &SelectedDevice,
) -> Result<(Tensor<SelectedBackend, 4>, DiagnosticReport)> {
    let original = image::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let original_size = [original.height() as usize, original.width() as usize];

    let config = model.config();
    let [height, width] = config.input_size;
    let shape = [config.in_channels, height, width];
    let pixels = load_image(path, config)?;
    let images = image_tensor::<SelectedBackend>(pixels, shape, device);

    let report = model
        .diagnose(images.clone(), original_size, &HeatmapConfig::new())?
        .into_iter()
        .next()
        .context("Model returned no report")?;
    Ok((images, report))
}

fn save_heatmap(report: &DiagnosticReport, path: &Path) -> Result<()> {
    let [height, width] = report.heatmap_size;
    let pixels = report
        .heatmap
        .iter()
        .map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
        .collect();
    GrayImage::from_raw(width as u32, height as u32, pixels)
        .context("Heat-map size does not match its data")?
        .save(path)
        .with_context(|| format!("Failed to save {}", path.display()))
}
