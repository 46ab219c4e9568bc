use anyhow::{Context, Result};
use facefind_vision::pipeline::MatchedImage;
use facefind_vision::ImagePayload;
use image::ImageFormat;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const ACCEPTED_FORMATS: [ImageFormat; 3] = [ImageFormat::Jpeg, ImageFormat::Png, ImageFormat::Gif];

/// Read the reference photo and make sure it is an image the face service accepts.
pub fn load_reference_photo(path: &Path) -> Result<ImagePayload> {
    let bytes =
        std::fs::read(path).with_context(|| format!("reading reference photo {}", path.display()))?;
    let format = image::guess_format(&bytes)
        .with_context(|| format!("{} is not a recognised image", path.display()))?;
    if !ACCEPTED_FORMATS.contains(&format) {
        anyhow::bail!(
            "{} is a {:?} image, expected jpeg, png or gif",
            path.display(),
            format
        );
    }
    Ok(ImagePayload::new("reference", bytes))
}

fn run_dir(output_dir: &Path, run_id: &str) -> PathBuf {
    let mut p = output_dir.to_path_buf();
    p.push(run_id);
    p
}

/// File name for a match, made unique within one run directory.
fn file_name(matched: &MatchedImage, taken: &mut HashSet<String>) -> String {
    let display = Path::new(&matched.image.display_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .unwrap_or(&matched.image.id)
        .to_string();

    if taken.insert(display.clone()) {
        return display;
    }

    let path = Path::new(&display);
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("image");
    let ext = path.extension().and_then(|e| e.to_str());
    let candidate = |suffix: String| match ext {
        Some(ext) => format!("{}-{}.{}", stem, suffix, ext),
        None => format!("{}-{}", stem, suffix),
    };

    let mut name = candidate(matched.image.id.clone());
    let mut attempt = 1;
    while !taken.insert(name.clone()) {
        attempt += 1;
        name = candidate(format!("{}-{}", matched.image.id, attempt));
    }
    name
}

/// Write every matched payload under `<output_dir>/<run_id>/`.
pub fn save_matches(
    output_dir: &Path,
    run_id: &str,
    matches: &[MatchedImage],
) -> Result<Vec<PathBuf>> {
    if matches.is_empty() {
        return Ok(vec![]);
    }

    let dir = run_dir(output_dir, run_id);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;

    let mut taken = HashSet::new();
    let mut written = Vec::with_capacity(matches.len());
    for matched in matches {
        let file = dir.join(file_name(matched, &mut taken));
        std::fs::write(&file, &matched.payload.bytes)
            .with_context(|| format!("writing {}", file.display()))?;
        written.push(file);
    }
    Ok(written)
}
