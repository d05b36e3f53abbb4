use cv_sift::{Detection, DetectionStats, MatcherParams, SiftDetector, SiftMatcher, SiftParams};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct MatchToolConfig {
    pub image_a: PathBuf,
    pub image_b: PathBuf,
    #[serde(default)]
    pub sift: SiftParams,
    #[serde(default)]
    pub matcher: MatcherParams,
    #[serde(default)]
    pub json_out: Option<PathBuf>,
}

pub fn load_config(path: &Path) -> Result<MatchToolConfig, String> {
    let data = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config {}: {e}", path.display()))?;
    serde_json::from_str(&data)
        .map_err(|e| format!("Failed to parse config {}: {e}", path.display()))
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let args: Vec<String> = env::args().skip(1).collect();
    let config = match args.as_slice() {
        [config_path] => load_config(Path::new(config_path))?,
        [image_a, image_b] => MatchToolConfig {
            image_a: image_a.into(),
            image_b: image_b.into(),
            sift: SiftParams::default(),
            matcher: MatcherParams::default(),
            json_out: None,
        },
        _ => return Err(usage()),
    };

    let detector = SiftDetector::new(config.sift.clone()).map_err(|e| e.to_string())?;
    let matcher = SiftMatcher::new(config.matcher.clone()).map_err(|e| e.to_string())?;

    let detection_a = detect(&detector, &config.image_a)?;
    let detection_b = detect(&detector, &config.image_b)?;

    let matches = matcher
        .match_descriptors(&detection_a.descriptors, &detection_b.descriptors)
        .map_err(|e| e.to_string())?;

    println!(
        "{}: {} keypoints, {} descriptors",
        config.image_a.display(),
        detection_a.keypoints.len(),
        detection_a.descriptors.len()
    );
    println!(
        "{}: {} keypoints, {} descriptors",
        config.image_b.display(),
        detection_b.keypoints.len(),
        detection_b.descriptors.len()
    );
    println!("{} matches", matches.len());

    if let Some(json_out) = &config.json_out {
        let report = MatchReport {
            image_a: ImageSummary::new(&config.image_a, &detection_a),
            image_b: ImageSummary::new(&config.image_b, &detection_b),
            sift: config.sift.clone(),
            matcher: config.matcher.clone(),
            match_count: matches.len(),
            matches: matches
                .iter()
                .map(|m| MatchEntry {
                    index_a: m.index_a,
                    index_b: m.index_b,
                    point_a: (m.a.x, m.a.y),
                    point_b: (m.b.x, m.b.y),
                    scale_ratio: m.b.scale / m.a.scale,
                    rotation: rotation_between(m.a.orientation, m.b.orientation),
                    distance: m.distance,
                })
                .collect(),
        };
        write_json_file(json_out, &report)?;
        println!("Saved match report to {}", json_out.display());
    }

    Ok(())
}

fn detect(detector: &SiftDetector, path: &Path) -> Result<Detection, String> {
    let image = image::open(path)
        .map_err(|e| format!("Failed to open image {}: {e}", path.display()))?
        .to_luma32f();
    detector
        .detect(&image)
        .map_err(|e| format!("{}: {e}", path.display()))
}

/// Orientation change from `a` to `b`, within `[0, 2π)`.
fn rotation_between(a: f32, b: f32) -> f32 {
    (b - a).rem_euclid(std::f32::consts::TAU)
}

fn write_json_file<T: Serialize>(path: &Path, value: &T) -> Result<(), String> {
    let data = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize {}: {e}", path.display()))?;
    fs::write(path, data).map_err(|e| format!("Failed to write {}: {e}", path.display()))
}

fn usage() -> String {
    "Usage: sift_match <config.json> | sift_match <image_a> <image_b>".to_string()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageSummary {
    path: PathBuf,
    keypoint_count: usize,
    descriptor_count: usize,
    stats: DetectionStats,
}

impl ImageSummary {
    fn new(path: &Path, detection: &Detection) -> Self {
        Self {
            path: path.to_path_buf(),
            keypoint_count: detection.keypoints.len(),
            descriptor_count: detection.descriptors.len(),
            stats: detection.stats,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchEntry {
    index_a: usize,
    index_b: usize,
    point_a: (f32, f32),
    point_b: (f32, f32),
    scale_ratio: f32,
    rotation: f32,
    distance: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MatchReport {
    image_a: ImageSummary,
    image_b: ImageSummary,
    sift: SiftParams,
    matcher: MatcherParams,
    match_count: usize,
    matches: Vec<MatchEntry>,
}
