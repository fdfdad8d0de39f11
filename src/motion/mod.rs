//! Motion & Scene Detector (spec.md §4.5): scene-change and text-change
//! frame detection over an animated image's frames.

use crate::decode::DecodedImage;

const HISTOGRAM_BINS: usize = 64;
const MAX_SAMPLED_FRAMES: usize = 50;
const DEDUP_THRESHOLD: f64 = 0.08;
const TEXT_SIMILARITY_DEFAULT: f64 = 0.85;
const TEXT_CHANGE_SENSITIVITY: f64 = 0.05;
const BOTTOM_REGION_FRACTION: f64 = 0.25;

/// A clamped pixel rectangle a text box lives in, in source-frame coordinates.
#[derive(Debug, Clone, Copy)]
pub struct TextBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Output of [`detect_scenes`] (spec.md §4.5, §3 `SceneResult`).
#[derive(Debug, Clone)]
pub struct SceneResult {
    pub total_frames: usize,
    pub scene_count: usize,
    pub scene_end_frame_indices: Vec<usize>,
    pub last_scene_frame_index: usize,
    pub scene_motion_scores: Vec<f64>,
    pub average_motion: f64,
    pub used_motion_detection: bool,
    pub text_change_frame_count: usize,
}

impl SceneResult {
    /// Escalate to Vision LLM when the animation is visually eventful.
    pub fn suggest_escalation(&self) -> bool {
        self.scene_count > 2 || self.average_motion > 0.1 || self.text_change_frame_count > 2
    }

    pub fn suggest_text_extraction(&self) -> bool {
        self.text_change_frame_count > 1
    }
}

/// A 3-channel, `HISTOGRAM_BINS`-bin-per-channel color histogram, normalized
/// to sum to 1.0 per channel.
#[derive(Debug, Clone)]
struct ColorHistogram {
    red: [f64; HISTOGRAM_BINS],
    green: [f64; HISTOGRAM_BINS],
    blue: [f64; HISTOGRAM_BINS],
}

impl ColorHistogram {
    fn from_rgba(rgba: &[u8]) -> Self {
        let mut red = [0f64; HISTOGRAM_BINS];
        let mut green = [0f64; HISTOGRAM_BINS];
        let mut blue = [0f64; HISTOGRAM_BINS];
        let mut count = 0u64;

        for pixel in rgba.chunks_exact(4) {
            red[bucket(pixel[0])] += 1.0;
            green[bucket(pixel[1])] += 1.0;
            blue[bucket(pixel[2])] += 1.0;
            count += 1;
        }

        let count = count.max(1) as f64;
        for bin in red.iter_mut().chain(green.iter_mut()).chain(blue.iter_mut()) {
            *bin /= count;
        }
        Self { red, green, blue }
    }

    /// Histogram intersection, averaged across the three channels.
    fn intersection(&self, other: &ColorHistogram) -> f64 {
        let channel = |a: &[f64; HISTOGRAM_BINS], b: &[f64; HISTOGRAM_BINS]| {
            a.iter().zip(b.iter()).map(|(x, y)| x.min(*y)).sum::<f64>()
        };
        (channel(&self.red, &other.red) + channel(&self.green, &other.green) + channel(&self.blue, &other.blue))
            / 3.0
    }

    fn motion_against(&self, other: &ColorHistogram) -> f64 {
        1.0 - self.intersection(other)
    }
}

fn bucket(channel: u8) -> usize {
    ((channel as usize) * HISTOGRAM_BINS / 256).min(HISTOGRAM_BINS - 1)
}

/// Evenly sample up to `MAX_SAMPLED_FRAMES` frame indices from `total_frames`,
/// always including the first and last.
fn sample_frame_indices(total_frames: usize, max_samples: usize) -> Vec<usize> {
    if total_frames == 0 {
        return Vec::new();
    }
    if total_frames <= max_samples {
        return (0..total_frames).collect();
    }
    let step = (total_frames - 1) as f64 / (max_samples - 1) as f64;
    let mut indices: Vec<usize> = (0..max_samples)
        .map(|i| ((i as f64) * step).round() as usize)
        .collect();
    indices.dedup();
    if *indices.last().unwrap() != total_frames - 1 {
        indices.push(total_frames - 1);
    }
    indices
}

fn mean_and_stddev(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    (mean, variance.sqrt())
}

/// spec.md §4.5 `detect_scenes`.
pub fn detect_scenes(image: &DecodedImage, max_scenes: usize) -> SceneResult {
    let total_frames = image.frame_count();
    if total_frames <= 1 {
        // A single-frame (or static) input is itself one scene, not zero.
        return SceneResult {
            total_frames,
            scene_count: 1,
            scene_end_frame_indices: Vec::new(),
            last_scene_frame_index: 0,
            scene_motion_scores: Vec::new(),
            average_motion: 0.0,
            used_motion_detection: false,
            text_change_frame_count: 0,
        };
    }

    let sampled = sample_frame_indices(total_frames, MAX_SAMPLED_FRAMES);
    let histograms: Vec<(usize, ColorHistogram)> = sampled
        .iter()
        .filter_map(|&idx| image.frame(idx).map(|f| (idx, ColorHistogram::from_rgba(f))))
        .collect();

    let mut transition_scores = Vec::with_capacity(histograms.len().saturating_sub(1));
    for window in histograms.windows(2) {
        transition_scores.push(window[1].1.motion_against(&window[0].1));
    }
    let average_motion = if transition_scores.is_empty() {
        0.0
    } else {
        transition_scores.iter().sum::<f64>() / transition_scores.len() as f64
    };
    let (mean, stddev) = mean_and_stddev(&transition_scores);
    let threshold = mean + stddev;

    let first_idx = histograms.first().map(|(i, _)| *i).unwrap_or(0);
    let last_idx = histograms.last().map(|(i, _)| *i).unwrap_or(0);

    let mut candidates: Vec<(usize, f64)> = vec![(first_idx, 0.0)];
    for (window, score) in histograms.windows(2).zip(transition_scores.iter()) {
        if *score > threshold {
            candidates.push((window[1].0, *score));
        }
    }
    if last_idx != first_idx && !candidates.iter().any(|(i, _)| *i == last_idx) {
        candidates.push((last_idx, 0.0));
    }

    if candidates.len() > max_scenes {
        let endpoints: Vec<(usize, f64)> = candidates
            .iter()
            .filter(|(i, _)| *i == first_idx || *i == last_idx)
            .copied()
            .collect();
        let mut rest: Vec<(usize, f64)> = candidates
            .into_iter()
            .filter(|(i, _)| *i != first_idx && *i != last_idx)
            .collect();
        rest.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        rest.truncate(max_scenes.saturating_sub(endpoints.len()));
        candidates = endpoints;
        candidates.extend(rest);
        candidates.sort_by_key(|(i, _)| *i);
    } else {
        candidates.sort_by_key(|(i, _)| *i);
    }

    let hist_by_index: std::collections::HashMap<usize, &ColorHistogram> =
        histograms.iter().map(|(i, h)| (*i, h)).collect();
    let mut deduped: Vec<(usize, f64)> = Vec::new();
    for (idx, score) in candidates {
        let is_duplicate = deduped.last().is_some_and(|(prev_idx, _)| {
            match (hist_by_index.get(prev_idx), hist_by_index.get(&idx)) {
                (Some(prev), Some(cur)) => cur.motion_against(prev) <= DEDUP_THRESHOLD,
                _ => false,
            }
        });
        if !is_duplicate {
            deduped.push((idx, score));
        }
    }

    let scene_end_frame_indices: Vec<usize> = deduped.iter().map(|(i, _)| *i).collect();
    let scene_motion_scores: Vec<f64> = deduped.iter().map(|(_, s)| *s).collect();
    let last_scene_frame_index = scene_end_frame_indices.last().copied().unwrap_or(0);

    SceneResult {
        total_frames,
        scene_count: scene_end_frame_indices.len(),
        scene_end_frame_indices,
        last_scene_frame_index,
        scene_motion_scores,
        average_motion,
        used_motion_detection: true,
        text_change_frame_count: 0,
    }
}

/// The histogram a zero-area text box collapses to: a single black pixel.
fn black_pixel_histogram() -> [f64; 256] {
    let mut histogram = [0f64; 256];
    histogram[0] = 1.0;
    histogram
}

/// A normalized 256-bin grayscale histogram over one region of a frame.
fn region_histogram(rgba: &[u8], width: usize, height: usize, region: (u32, u32, u32, u32)) -> [f64; 256] {
    let (x, y, w, h) = region;
    let x0 = (x as usize).min(width.saturating_sub(1));
    let y0 = (y as usize).min(height.saturating_sub(1));
    let x1 = ((x + w) as usize).min(width).max(x0 + 1);
    let y1 = ((y + h) as usize).min(height).max(y0 + 1);

    let mut histogram = [0f64; 256];
    let mut count = 0u64;
    for row in y0..y1 {
        for col in x0..x1 {
            let offset = (row * width + col) * 4;
            let Some(pixel) = rgba.get(offset..offset + 3) else {
                continue;
            };
            let luminance = 0.299 * pixel[0] as f64 + 0.587 * pixel[1] as f64 + 0.114 * pixel[2] as f64;
            histogram[luminance as u8 as usize] += 1.0;
            count += 1;
        }
    }
    let count = count.max(1) as f64;
    for bin in histogram.iter_mut() {
        *bin /= count;
    }
    histogram
}

fn pearson_correlation(a: &[f64; 256], b: &[f64; 256]) -> f64 {
    let mean_a = a.iter().sum::<f64>() / 256.0;
    let mean_b = b.iter().sum::<f64>() / 256.0;
    let mut covariance = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for i in 0..256 {
        let da = a[i] - mean_a;
        let db = b[i] - mean_b;
        covariance += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    if var_a == 0.0 || var_b == 0.0 {
        // A degenerate (constant) region - including the black 1x1 sample a
        // zero-area text box collapses to - has no meaningful correlation
        // with anything else; treat it as "different", not "same".
        return 0.0;
    }
    covariance / (var_a.sqrt() * var_b.sqrt())
}

/// spec.md §4.5 `detect_unique_text_frames`.
pub fn detect_unique_text_frames(
    image: &DecodedImage,
    text_boxes: &[TextBox],
    max_frames: usize,
    similarity_threshold: Option<f64>,
) -> Vec<usize> {
    let threshold = similarity_threshold.unwrap_or(TEXT_SIMILARITY_DEFAULT);
    let total_frames = image.frame_count();
    let (width, height) = (image.width as usize, image.height as usize);
    if total_frames == 0 || text_boxes.is_empty() {
        return Vec::new();
    }

    let box_histograms_for = |frame: &[u8]| -> Vec<[f64; 256]> {
        text_boxes
            .iter()
            .map(|tb| {
                if tb.width == 0 || tb.height == 0 {
                    black_pixel_histogram()
                } else {
                    region_histogram(frame, width, height, (tb.x, tb.y, tb.width, tb.height))
                }
            })
            .collect()
    };

    let mut kept = vec![0usize];
    let mut last_histograms = image.frame(0).map(box_histograms_for);

    for idx in 1..total_frames {
        let Some(frame) = image.frame(idx) else { continue };
        let current = box_histograms_for(frame);
        let correlation = match &last_histograms {
            Some(prev) => {
                let sum: f64 = prev.iter().zip(current.iter()).map(|(a, b)| pearson_correlation(a, b)).sum();
                sum / prev.len().max(1) as f64
            }
            None => 0.0,
        };
        if correlation < threshold {
            kept.push(idx);
            last_histograms = Some(current);
            if kept.len() >= max_frames {
                break;
            }
        }
    }
    kept
}

/// spec.md §4.5 `detect_text_change_frames`: same principle as
/// [`detect_unique_text_frames`] but restricted to the bottom subtitle band,
/// with no ML-provided text boxes required.
pub fn detect_text_change_frames(image: &DecodedImage, max_text_frames: usize) -> Vec<usize> {
    let total_frames = image.frame_count();
    let (width, height) = (image.width as usize, image.height as usize);
    if total_frames == 0 || height == 0 {
        return Vec::new();
    }

    let band_height = ((height as f64) * BOTTOM_REGION_FRACTION).round() as u32;
    let band_y = height as u32 - band_height.min(height as u32);
    let region = (0u32, band_y, width as u32, band_height.max(1));

    let mut kept = vec![0usize];
    let mut last = image.frame(0).map(|f| region_histogram(f, width, height, region));

    for idx in 1..total_frames {
        let Some(frame) = image.frame(idx) else { continue };
        let current = region_histogram(frame, width, height, region);
        let difference = match &last {
            Some(prev) => prev.iter().zip(current.iter()).map(|(a, b)| (a - b).abs()).sum::<f64>() / 2.0,
            None => 1.0,
        };
        if difference > TEXT_CHANGE_SENSITIVITY {
            kept.push(idx);
            last = Some(current);
            if kept.len() >= max_text_frames {
                break;
            }
        }
    }
    kept
}

/// spec.md §4.5 `detect_scenes_with_text_awareness`: union of scene-change
/// and text-change frames, endpoints and scene frames prioritized over text
/// frames when the union must be trimmed to `max_scenes`.
pub fn detect_scenes_with_text_awareness(
    image: &DecodedImage,
    max_scenes: usize,
    text_boxes: &[TextBox],
) -> SceneResult {
    let mut scenes = detect_scenes(image, max_scenes);
    let text_change_frames = if text_boxes.is_empty() {
        detect_text_change_frames(image, max_scenes)
    } else {
        detect_unique_text_frames(image, text_boxes, max_scenes, None)
    };
    scenes.text_change_frame_count = text_change_frames.len();

    let first = *scenes.scene_end_frame_indices.first().unwrap_or(&0);
    let last = scenes.last_scene_frame_index;

    let mut union: Vec<usize> = scenes.scene_end_frame_indices.clone();
    for frame in text_change_frames {
        if !union.contains(&frame) {
            union.push(frame);
        }
    }
    union.sort_unstable();
    union.dedup();

    if union.len() > max_scenes {
        let mut endpoints: Vec<usize> = union.iter().copied().filter(|i| *i == first || *i == last).collect();
        endpoints.sort_unstable();
        endpoints.dedup();

        let scene_set: std::collections::HashSet<usize> = scenes.scene_end_frame_indices.iter().copied().collect();
        let mut scene_only: Vec<usize> = union
            .iter()
            .copied()
            .filter(|i| scene_set.contains(i) && !endpoints.contains(i))
            .collect();
        let mut text_only: Vec<usize> = union
            .iter()
            .copied()
            .filter(|i| !scene_set.contains(i) && !endpoints.contains(i))
            .collect();

        let mut prioritized = endpoints;
        prioritized.append(&mut scene_only);
        prioritized.append(&mut text_only);
        prioritized.truncate(max_scenes);
        prioritized.sort_unstable();
        union = prioritized;
    }

    scenes.scene_end_frame_indices = union;
    scenes.scene_count = scenes.scene_end_frame_indices.len();
    scenes
}
