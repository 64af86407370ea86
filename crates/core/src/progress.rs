//! Progress milestones reported to the callback endpoint.
//!
//! Percentages are fixed per stage; shot rendering fills the band between
//! [`PROGRESS_BACKEND_CONNECTED`] and [`PROGRESS_SHOTS_DONE`].

pub const PROGRESS_QUEUED: u8 = 5;
pub const PROGRESS_BACKEND_CONNECTED: u8 = 12;
pub const PROGRESS_SHOTS_DONE: u8 = 75;
pub const PROGRESS_VOICE_STUB: u8 = 78;
pub const PROGRESS_MUSIC_STUB: u8 = 81;
pub const PROGRESS_SFX_STUB: u8 = 83;
pub const PROGRESS_ASSEMBLING: u8 = 85;

pub const STEP_QUEUED: &str = "queued_on_render_server";
pub const STEP_VOICE_STUB: &str = "voice_generation_stub";
pub const STEP_MUSIC_STUB: &str = "music_generation_stub";
pub const STEP_SFX_STUB: &str = "sfx_generation_stub";
pub const STEP_ASSEMBLING: &str = "assembling_video";

/// Backend version reported when its status payload omits one.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Step name once a backend has been located.
pub fn backend_connected_step(version: Option<&str>) -> String {
    format!("comfyui_connected:{}", version.unwrap_or(UNKNOWN_VERSION))
}

/// Step name after shot `completed` (1-based) of `total`.
pub fn shot_rendered_step(completed: usize, total: usize) -> String {
    format!("rendered_shot_{completed}_of_{total}")
}

/// Percentage after shot `completed` (1-based) of `total`.
pub fn shot_progress(completed: usize, total: usize) -> u8 {
    let band = u64::from(PROGRESS_SHOTS_DONE - PROGRESS_BACKEND_CONNECTED);
    let total = total.max(1) as u64;
    let step = (completed as u64).saturating_mul(band) / total;
    let raw = u64::from(PROGRESS_BACKEND_CONNECTED).saturating_add(step);
    raw.min(u64::from(PROGRESS_SHOTS_DONE)) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shot_progress_spans_band() {
        assert_eq!(shot_progress(1, 1), 75);
        assert_eq!(shot_progress(1, 3), 33);
        assert_eq!(shot_progress(2, 3), 54);
        assert_eq!(shot_progress(3, 3), 75);
        assert_eq!(shot_progress(0, 0), 12);
        assert_eq!(shot_progress(9, 3), 75);
    }

    #[test]
    fn step_names() {
        assert_eq!(backend_connected_step(Some("0.3.10")), "comfyui_connected:0.3.10");
        assert_eq!(backend_connected_step(None), "comfyui_connected:unknown");
        assert_eq!(shot_rendered_step(2, 5), "rendered_shot_2_of_5");
    }
}
