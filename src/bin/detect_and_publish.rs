//! detect_and_publish - replays images through the detection pipeline and prints one JSON line per result

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use anyhow::{anyhow, Context, Result};
use clap::Parser;

use duckie_detect::common::{Encoding, Header, InferenceDevice, ModelVersion};
use duckie_detect::data::DetectorSettings;
use duckie_detect::{init_detector, ChannelSink, ImageConverter, ImageMessage, PipelineController};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// TOML settings file. Flags given on the command line override it.
    #[arg(long)]
    config: Option<PathBuf>,
    /// ONNX model weights.
    #[arg(long)]
    weights: Option<String>,
    /// Path to the ONNX Runtime shared library.
    #[arg(long)]
    ort_lib: Option<String>,
    /// Class names, one per line.
    #[arg(long)]
    labels: Option<String>,
    /// YOLO output layout: v5, v6, v7, v8, v9 or v11.
    #[arg(long)]
    model_version: Option<String>,
    /// Model input size in pixels.
    #[arg(long)]
    img_size: Option<u32>,
    #[arg(long)]
    conf_thres: Option<f32>,
    #[arg(long)]
    iou_thres: Option<f32>,
    /// cpu, a CUDA device number, or name:id such as tensorrt:0.
    #[arg(long)]
    device: Option<String>,
    /// Keep only these class ids.
    #[arg(long, num_args = 1..)]
    classes: Vec<usize>,
    #[arg(long)]
    agnostic_nms: bool,
    /// Real-world width of the tracked object. Enables distance estimation with --focal-length.
    #[arg(long, requires = "focal_length")]
    known_width: Option<f32>,
    /// Focal length in pixels.
    #[arg(long, requires = "known_width")]
    focal_length: Option<f32>,
    /// Image file or directory of images to replay.
    #[arg(long)]
    source: PathBuf,
    /// Write annotated images here.
    #[arg(long)]
    save_dir: Option<PathBuf>,
    /// Log preprocess, inference and decode timings for every frame.
    #[arg(long)]
    profile: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let settings = build_settings(&args)?;
    let images = collect_images(&args.source)?;
    if images.is_empty() {
        return Err(anyhow!("no images found under {}", args.source.display()));
    }
    if let Some(dir) = &args.save_dir {
        fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    let yolo = init_detector(&settings.model, &settings.detect)?.with_profile(args.profile);
    let (sink, results) = ChannelSink::new(settings.pipeline.output_capacity);
    let mut controller = PipelineController::new(
        Box::new(yolo),
        Box::new(sink),
        settings.detect.clone(),
        settings.pipeline.clone(),
    )?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let ingest = controller.ingest();
    let feeder_shutdown = shutdown.clone();
    let feeder = thread::Builder::new().name("feeder".to_string()).spawn(move || {
        for (i, path) in images.iter().enumerate() {
            let image = match image::open(path) {
                Ok(image) => image.to_rgb8(),
                Err(e) => {
                    log::warn!("Skipping {}: {}", path.display(), e);
                    continue;
                }
            };
            let msg = ImageMessage::from_rgb(header_for(path, i), &image);
            if ingest.on_image(&msg).is_err() {
                continue;
            }
            // Replay at the pipeline's pace so no file is superseded.
            while !ingest.store().is_empty() {
                thread::sleep(Duration::from_millis(2));
            }
        }
        feeder_shutdown.store(true, Ordering::Release);
    })?;

    let worker = thread::Builder::new().name("pipeline".to_string()).spawn(move || {
        controller.run(&shutdown);
        controller.stats()
    })?;

    // Ends once the controller, and with it the sink, is dropped.
    for result in results.iter() {
        println!("{}", result.json);
        if let Some(dir) = &args.save_dir {
            let path = dir.join(format!("{}.png", result.detections.frame_id));
            if let Err(e) = save_annotated(&result.image, &path) {
                log::warn!("Failed to save {}: {:#}", path.display(), e);
            }
        }
    }

    feeder.join().map_err(|_| anyhow!("feeder thread panicked"))?;
    let stats = worker.join().map_err(|_| anyhow!("pipeline thread panicked"))?;
    log::info!("Done: {}", serde_json::to_string(&stats)?);
    Ok(())
}

fn build_settings(args: &Args) -> Result<DetectorSettings> {
    let mut settings = match &args.config {
        Some(path) => DetectorSettings::load(path)?,
        None => DetectorSettings::default(),
    };

    let model = &mut settings.model;
    if let Some(weights) = &args.weights {
        model.weights_path = weights.clone();
    }
    if let Some(ort_lib) = &args.ort_lib {
        model.ort_lib_path = ort_lib.clone();
    }
    if let Some(labels) = &args.labels {
        model.labels_path = labels.clone();
    }
    if let Some(version) = &args.model_version {
        model.model_version = ModelVersion::from_name(version)
            .ok_or_else(|| anyhow!("unknown model version '{}'", version))?;
    }
    if let Some(size) = args.img_size {
        model.input_size = size;
    }
    if let Some(device) = &args.device {
        let device = InferenceDevice::parse(device).ok_or_else(|| anyhow!("unknown device '{}'", device))?;
        model.set_device_type(device);
    }

    let mut detect = settings.detect.clone();
    if args.agnostic_nms {
        detect = detect.with_agnostic_nms(true);
    }
    if let Some(conf) = args.conf_thres {
        detect = detect.with_conf_threshold(conf);
    }
    if let Some(iou) = args.iou_thres {
        detect = detect.with_iou_threshold(iou);
    }
    if !args.classes.is_empty() {
        detect = detect.with_classes(&args.classes);
    }
    if let (Some(width), Some(focal)) = (args.known_width, args.focal_length) {
        detect = detect.with_distance(width, focal);
    }
    settings.detect = detect;

    settings.validate()?;
    Ok(settings)
}

fn collect_images(source: &Path) -> Result<Vec<PathBuf>> {
    if source.is_file() {
        return Ok(vec![source.to_path_buf()]);
    }
    let mut images = fs::read_dir(source)
        .with_context(|| format!("reading {}", source.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        })
        .collect::<Vec<_>>();
    images.sort();
    Ok(images)
}

fn header_for(path: &Path, index: usize) -> Header {
    let stamp_ns = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_default();
    let frame_id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("frame_{}", index));
    Header { stamp_ns, frame_id }
}

fn save_annotated(msg: &ImageMessage, path: &Path) -> Result<()> {
    let frame = ImageConverter::new().to_frame(msg, Encoding::Rgb8)?;
    let image = frame
        .to_rgb8()
        .ok_or_else(|| anyhow!("image buffer does not match {}x{}", msg.width, msg.height))?;
    image.save(path)?;
    Ok(())
}
