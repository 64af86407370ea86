//! File naming inside a job's working directory.
//!
//! Names are deterministic given their inputs; random tokens are supplied by
//! the caller so these stay pure.

/// Intro title frame file name.
pub const INTRO_TITLE_FILENAME: &str = "intro-title.png";

/// Outro title frame file name.
pub const OUTRO_TITLE_FILENAME: &str = "outro-title.png";

/// Extension used when a reference URL has none.
pub const DEFAULT_REFERENCE_EXTENSION: &str = ".png";

/// Frame file for a rendered shot, named after its output prefix.
pub fn shot_frame_filename(prefix: &str) -> String {
    format!("{prefix}.png")
}

/// Frame file substituted for a failed shot (`index` is 0-based).
///
/// # Examples
///
/// ```
/// use studio_core::naming::fallback_frame_filename;
///
/// assert_eq!(fallback_frame_filename(0), "shot-001-fallback.png");
/// assert_eq!(fallback_frame_filename(11), "shot-012-fallback.png");
/// ```
pub fn fallback_frame_filename(index: usize) -> String {
    format!("shot-{:03}-fallback.png", index + 1)
}

/// Final video file: `{episode}-{token}.mp4`.
pub fn output_video_filename(episode_id: &str, token: &str) -> String {
    format!("{}-{token}.mp4", sanitize_component(episode_id))
}

/// Local file for a downloaded reference image.
///
/// The extension is taken from the URL path (query and fragment ignored),
/// defaulting to [`DEFAULT_REFERENCE_EXTENSION`].
pub fn reference_filename(url: &str, token: &str) -> String {
    format!("reference-{token}{}", url_extension(url))
}

fn url_extension(url: &str) -> String {
    let path = url
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let path = path.split_once("://").map_or(path, |(_, rest)| {
        rest.find('/').map_or("", |i| &rest[i..])
    });
    let name = path.rsplit('/').next().unwrap_or_default();
    match name.rfind('.') {
        Some(i) if i > 0 && i + 1 < name.len() => name[i..].to_string(),
        _ => DEFAULT_REFERENCE_EXTENSION.to_string(),
    }
}

/// Make an identifier safe to use as a single path component.
///
/// Keeps ASCII alphanumerics, `-`, `_` and `.`; everything else becomes `_`.
/// Empty results and dot-only names become `_`.
pub fn sanitize_component(raw: &str) -> String {
    let clean: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if clean.chars().all(|c| c == '.') {
        "_".to_string()
    } else {
        clean
    }
}
