use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tasks::rotation::{RotationSnapshot, RotationState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable log lines.
    #[default]
    Text,
    /// One JSON object per change on stdout.
    Json,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameImage {
    pub id: String,
    pub url: String,
    pub description: Option<String>,
    pub width: u32,
    pub height: u32,
}

/// What the screen should show for one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Frame {
    pub status: &'static str,
    pub image: Option<FrameImage>,
    pub progress: f32,
    #[serde(skip)]
    pub reason: Option<String>,
}

impl Frame {
    pub fn from_snapshot(snap: &RotationSnapshot) -> Self {
        let image = snap.current().map(|img| FrameImage {
            id: img.record.id.clone(),
            url: img.record.url.clone(),
            description: img.record.description.clone(),
            width: img.width,
            height: img.height,
        });
        let reason = match snap.state() {
            RotationState::Error { reason } => Some(reason.clone()),
            _ => None,
        };
        Self {
            status: snap.state().label(),
            progress: if image.is_some() { snap.progress() } else { 0.0 },
            image,
            reason,
        }
    }
}

pub fn progress_bar(fraction: f32, width: usize) -> String {
    let fraction = fraction.clamp(0.0, 1.0);
    let filled = (fraction * width as f32).round() as usize;
    format!(
        "[{}{}] {:>3}%",
        "#".repeat(filled),
        "-".repeat(width - filled),
        (fraction * 100.0).round() as u32
    )
}

pub fn render_json(frame: &Frame, out: &mut impl Write) -> Result<()> {
    serde_json::to_writer(&mut *out, frame).context("failed to serialize frame")?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(())
}

fn log_text(previous: Option<&Frame>, frame: &Frame) {
    let previous_id = previous
        .and_then(|f| f.image.as_ref())
        .map(|img| img.id.as_str());
    match (&frame.image, frame.status) {
        (None, "loading") => info!("loading first image"),
        (None, "idle") => info!("gallery idle"),
        (Some(img), _) if previous_id != Some(img.id.as_str()) => info!(
            id = %img.id,
            url = %img.url,
            description = img.description.as_deref().unwrap_or(""),
            width = img.width,
            height = img.height,
            "now showing"
        ),
        _ => {}
    }
    if let Some(reason) = &frame.reason {
        if previous.and_then(|f| f.reason.as_ref()) != Some(reason) {
            warn!(%reason, "could not load the next image; keeping the current one");
        }
    }
    if frame.image.is_some() {
        debug!(progress = %progress_bar(frame.progress, 20));
    }
}

/// Render rotation snapshots until cancelled or the controller goes away.
pub async fn run(
    mut snapshots: watch::Receiver<RotationSnapshot>,
    format: OutputFormat,
    cancel: CancellationToken,
) -> Result<()> {
    let mut last: Option<Frame> = None;
    loop {
        let frame = Frame::from_snapshot(&snapshots.borrow_and_update());
        if last.as_ref() != Some(&frame) {
            match format {
                OutputFormat::Text => log_text(last.as_ref(), &frame),
                OutputFormat::Json => render_json(&frame, &mut std::io::stdout().lock())?,
            }
            last = Some(frame);
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            changed = snapshots.changed() => {
                if changed.is_err() {
                    debug!("rotation controller dropped; presenter exiting");
                    break;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{ImageRecord, PreparedImage};
    use std::sync::Arc;
    use std::time::Instant;

    fn image(id: &str) -> Arc<PreparedImage> {
        Arc::new(PreparedImage {
            record: ImageRecord::new(id, format!("https://example.com/{id}.jpg"))
                .with_description("mountains"),
            width: 640,
            height: 480,
            pixels: Vec::new(),
        })
    }

    #[test]
    fn placeholder_frame_before_first_image() {
        let mut snap = RotationSnapshot::new(100);
        snap.begin_loading();
        let frame = Frame::from_snapshot(&snap);
        assert_eq!(frame.status, "loading");
        assert!(frame.image.is_none());
        assert_eq!(frame.progress, 0.0);
    }

    #[test]
    fn error_frame_keeps_last_image() {
        let mut snap = RotationSnapshot::new(4);
        snap.display(image("a"), Instant::now());
        snap.tick();
        snap.fail("fetch failed: HTTP 403");
        let frame = Frame::from_snapshot(&snap);
        assert_eq!(frame.status, "error");
        assert_eq!(frame.image.as_ref().unwrap().id, "a");
        assert!((frame.progress - 0.25).abs() < f32::EPSILON);
        assert_eq!(frame.reason.as_deref(), Some("fetch failed: HTTP 403"));
    }

    #[test]
    fn json_frame_hides_error_reason() {
        let mut snap = RotationSnapshot::new(2);
        snap.display(image("a"), Instant::now());
        snap.fail("decode failed: truncated");
        let mut out = Vec::new();
        render_json(&Frame::from_snapshot(&snap), &mut out).unwrap();
        let line = String::from_utf8(out).unwrap();
        assert!(line.ends_with('\n'));
        let value: serde_json::Value = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(value["status"], "error");
        assert_eq!(value["image"]["id"], "a");
        assert_eq!(value["image"]["description"], "mountains");
        assert!(value.get("reason").is_none());
    }

    #[test]
    fn progress_bar_rounds_and_clamps() {
        assert_eq!(progress_bar(0.0, 10), "[----------]   0%");
        assert_eq!(progress_bar(0.5, 10), "[#####-----]  50%");
        assert_eq!(progress_bar(1.7, 4), "[####] 100%");
    }
}
