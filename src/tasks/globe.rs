use std::time::Duration;

use anyhow::Result;
use tokio::select;
use tokio::sync::mpsc::Receiver;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::decode::ImageSource;
use crate::events::GlobeCommand;
use crate::shake::ShakeGesture;
use crate::slideshow::SlideshowController;
use crate::surface::{Enclosure, ImagePlane, Present, apply_shake};

/// Drives the globe on one cooperative loop until cancelled.
///
/// Each frame: shake perturbation, the shake's single advance when due, then
/// the slideshow frame. Commands and finished decodes are handled between
/// frames. On exit the plane and the slideshow are disposed and the host is
/// handed back.
#[instrument(skip_all, fields(frame_interval = ?frame_interval))]
pub async fn run<S, H>(
    mut controller: SlideshowController<S>,
    host: H,
    mut shake: ShakeGesture,
    mut commands: Receiver<GlobeCommand>,
    cancel: CancellationToken,
    frame_interval: Duration,
) -> Result<H>
where
    S: ImageSource,
    H: Present<S::Output> + Enclosure,
{
    let mut plane = {
        let opts = controller.options();
        ImagePlane::new(host, opts.scale, opts.position)
    };
    let mut frames = interval(frame_interval);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut commands_open = true;
    let mut frame_count: u64 = 0;

    loop {
        select! {
            _ = cancel.cancelled() => {
                info!("cancel received; stopping globe");
                break;
            }

            maybe_cmd = commands.recv(), if commands_open => match maybe_cmd {
                Some(GlobeCommand::Shake) => {
                    if shake.trigger(Instant::now()) {
                        info!("shaking globe");
                    }
                }
                Some(GlobeCommand::Advance) => controller.advance(),
                Some(GlobeCommand::SetSequence(paths)) => controller.set_sequence(paths),
                None => {
                    // Producers are gone; keep rendering what we have.
                    debug!("command channel closed");
                    commands_open = false;
                }
            },

            Some(outcome) = controller.next_load(), if controller.has_pending_loads() => {
                if let Err(err) = &outcome.result {
                    warn!(%err, "image unavailable");
                }
            }

            now = frames.tick() => {
                let frame = shake.update(now);
                apply_shake(plane.surface_mut(), &frame);
                if frame.advance {
                    controller.advance_at(now);
                }
                plane.update(&mut controller, now);
                frame_count += 1;
            }
        }
    }

    plane.dispose();
    controller.dispose();
    info!(frames = frame_count, "globe stopped");
    Ok(plane.into_surface())
}
