use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use sfm::dataset::{count_images_per_camera, list_frames, read_cameras, read_images};
use sfm::{DatasetError, JsonFeatureExtractor, Reconstruction, ReconstructionConfig};

/// Incremental two-view reconstruction of a COLMAP image sequence.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// COLMAP `cameras.txt`.
    #[arg(long)]
    cameras: PathBuf,

    /// COLMAP `images.txt`.
    #[arg(long)]
    images: PathBuf,

    /// Directory holding the image sequence.
    #[arg(long)]
    image_dir: PathBuf,

    /// Directory holding one `<image name>.json` feature file per image.
    #[arg(long)]
    features_dir: PathBuf,

    /// JSON reconstruction config. Defaults are used if omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `camera_id` of the config.
    #[arg(long)]
    camera_id: Option<u32>,

    /// Where to write the point cloud, one `x y z` line per point.
    #[arg(long, default_value = "cloud.xyz")]
    output: PathBuf,

    /// Where to write the per-pair JSON report.
    #[arg(long)]
    report: Option<PathBuf>,

    /// RANSAC seed; overrides the config.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    pretty_env_logger::init_timed();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ReconstructionConfig::from_path(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ReconstructionConfig::default(),
    };
    if let Some(camera_id) = args.camera_id {
        config.camera_id = camera_id;
    }
    if let Some(seed) = args.seed {
        config.ransac.seed = Some(seed);
    }
    config.validate()?;

    let cameras = read_cameras(&args.cameras)?;
    let images = read_images(&args.images)?;
    for (camera_id, count) in count_images_per_camera(&images) {
        println!("camera {}: {} images", camera_id, count);
    }

    let camera = cameras
        .get(&config.camera_id)
        .ok_or(DatasetError::UnknownCamera(config.camera_id))?;
    info!(
        "camera {} ({} {}x{}): K =\n{}",
        camera.camera_id,
        camera.model,
        camera.width,
        camera.height,
        camera.intrinsics.matrix()
    );

    let frames = list_frames(&args.image_dir, &images, config.frame_range)?;
    info!("{} frames in sequence", frames.len());

    let rng = match config.ransac.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let extractor = JsonFeatureExtractor::new(&args.features_dir);
    let output = Reconstruction::new(extractor, camera.intrinsics, config, rng)
        .run(&frames)
        .context("reconstruction aborted")?;

    output
        .cloud
        .write_xyz(&args.output)
        .with_context(|| format!("writing {}", args.output.display()))?;
    info!("wrote {} points to {}", output.cloud.len(), args.output.display());

    if let Some(path) = &args.report {
        let file = File::create(path).with_context(|| format!("creating {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), &output.pairs)
            .with_context(|| format!("writing {}", path.display()))?;
    }

    Ok(())
}
