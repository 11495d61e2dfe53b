// THEORY:
// A `Page` is the explicit registration pass over every hero the host knows
// about. It takes a finite list of elements at startup instead of scanning a
// document, attaches each one through the `HeroPipeline`, and from then on
// routes media events (image loaded, media failed, video data ready) to the
// right hero.
//
// Heroes are fully independent: each owns its style map and its tuner, and each
// video hero gets its own `SamplingTask`. No state is shared between heroes.
//
// `SamplingTask` is the periodic video loop as a cancellable tokio task. It
// ticks at the configured sample interval and ends when:
// - the tuner reaches `Stopped` on its own (sampling failure), or
// - `SamplingHandle::stop` is called, or the handle is dropped (teardown).

use crate::core_modules::frame_sampler::FrameSource;
use crate::core_modules::hero::{HeroConfig, VideoPlayback};
use crate::core_modules::style_sink::{SharedStyle, StyleMap, StyleSink};
use crate::core_modules::tuning::PresentationParams;
use crate::error::HeroError;
use crate::pipeline::{
    Attachment, HeroPipeline, ImageTuner, VideoState, VideoTuner, report_load_failure,
};
use futures::future::join_all;
use image::RgbaImage;
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// One hero as the host supplies it at startup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HeroElement {
    pub id: String,
    #[serde(flatten)]
    pub config: HeroConfig,
}

impl HeroElement {
    pub fn new(id: impl Into<String>, config: HeroConfig) -> Self {
        Self {
            id: id.into(),
            config,
        }
    }
}

/// Handle to a running sampling loop.
#[derive(Debug)]
pub struct SamplingHandle {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<VideoTuner>,
}

impl SamplingHandle {
    /// Asks the loop to stop without waiting for it.
    pub fn request_stop(&self) {
        let _ = self.stop_tx.send(true);
    }

    /// Stops the loop and hands back the tuner in its final state.
    pub async fn stop(self) -> Option<VideoTuner> {
        self.request_stop();
        self.task.await.ok()
    }

    /// Waits for the loop to end on its own.
    pub async fn join(self) -> Option<VideoTuner> {
        let SamplingHandle { stop_tx, task } = self;
        let tuner = task.await.ok();
        drop(stop_tx);
        tuner
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// The video loop as a periodic tokio task.
pub struct SamplingTask;

impl SamplingTask {
    /// Starts sampling. Spawning corresponds to the video having data for its
    /// current frame, so the tuner is moved into `Sampling` first.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub fn spawn<S, K>(mut tuner: VideoTuner, mut source: S, mut sink: K) -> SamplingHandle
    where
        S: FrameSource + Send + 'static,
        K: StyleSink + Send + 'static,
    {
        let (stop_tx, mut stop_rx) = watch::channel(false);
        tuner.on_loaded_data();

        let task = tokio::spawn(async move {
            let mut ticker = time::interval(tuner.sample_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            while tuner.state() == VideoState::Sampling {
                tokio::select! {
                    _ = ticker.tick() => {
                        let outcome = tuner.tick(Instant::now().into_std(), &mut source, &mut sink);
                        debug!(hero = tuner.id(), ?outcome, "sampling tick");
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            tuner.stop();
                        }
                    }
                }
            }
            debug!(hero = tuner.id(), samples = tuner.samples_taken(), "sampling loop ended");
            tuner
        });

        SamplingHandle { stop_tx, task }
    }
}

#[derive(Debug)]
enum Media {
    Unconfigured,
    Image(ImageTuner),
    VideoPending(VideoTuner),
    VideoRunning {
        playback: VideoPlayback,
        handle: SamplingHandle,
    },
    VideoEnded(VideoTuner),
}

impl Media {
    fn mode(&self) -> &'static str {
        match self {
            Media::Unconfigured => "unconfigured",
            Media::Image(_) => "image",
            _ => "video",
        }
    }
}

#[derive(Debug)]
struct HeroSlot {
    id: String,
    style: SharedStyle,
    media: Media,
}

/// Every registered hero of one page session.
#[derive(Debug)]
pub struct Page {
    pipeline: HeroPipeline,
    heroes: Vec<HeroSlot>,
}

impl Page {
    /// Registration pass: attaches every element, in order.
    pub fn register<I>(pipeline: HeroPipeline, elements: I) -> Self
    where
        I: IntoIterator<Item = HeroElement>,
    {
        let heroes = elements
            .into_iter()
            .map(|element| {
                let style: SharedStyle = Arc::new(Mutex::new(StyleMap::new()));
                let mut sink = style.clone();
                let media = match pipeline.attach(&element.id, &element.config, &mut sink) {
                    Attachment::Video(mut tuner) => {
                        tuner.begin_loading();
                        Media::VideoPending(tuner)
                    }
                    Attachment::Image(tuner) => Media::Image(tuner),
                    Attachment::Unconfigured => Media::Unconfigured,
                };
                HeroSlot {
                    id: element.id,
                    style,
                    media,
                }
            })
            .collect::<Vec<_>>();
        info!(heroes = heroes.len(), "page registered");
        Self { pipeline, heroes }
    }

    pub fn pipeline(&self) -> &HeroPipeline {
        &self.pipeline
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.heroes.iter().map(|h| h.id.as_str())
    }

    pub fn len(&self) -> usize {
        self.heroes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heroes.is_empty()
    }

    /// "image", "video" or "unconfigured".
    pub fn mode(&self, id: &str) -> Option<&'static str> {
        self.slot(id).ok().map(|h| h.media.mode())
    }

    /// Snapshot of a hero's styling variables.
    pub fn style(&self, id: &str) -> Option<StyleMap> {
        self.slot(id).ok().map(|h| {
            h.style
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        })
    }

    pub fn image_src(&self, id: &str) -> Option<&str> {
        match &self.slot(id).ok()?.media {
            Media::Image(tuner) => Some(tuner.src()),
            _ => None,
        }
    }

    pub fn playback(&self, id: &str) -> Option<&VideoPlayback> {
        match &self.slot(id).ok()?.media {
            Media::VideoPending(tuner) | Media::VideoEnded(tuner) => Some(tuner.playback()),
            Media::VideoRunning { playback, .. } => Some(playback),
            _ => None,
        }
    }

    /// Whether the hero's sampling loop is currently running.
    pub fn is_sampling(&self, id: &str) -> bool {
        matches!(
            self.slot(id).map(|h| &h.media),
            Ok(Media::VideoRunning { handle, .. }) if !handle.is_finished()
        )
    }

    /// The hero's background image finished loading.
    pub fn image_loaded(
        &mut self,
        id: &str,
        image: &RgbaImage,
    ) -> Result<PresentationParams, HeroError> {
        let slot = self.slot_mut(id)?;
        let mut sink = slot.style.clone();
        match &slot.media {
            Media::Image(tuner) => tuner.on_load(image, &mut sink),
            _ => Err(mode_mismatch(id, "image")),
        }
    }

    /// The hero's media (image or video) failed to load. The failure itself
    /// is logged and answered with conservative defaults.
    pub fn media_failed(&mut self, id: &str, reason: &str) -> Result<(), HeroError> {
        let slot = self.slot_mut(id)?;
        let mut sink = slot.style.clone();
        match &mut slot.media {
            Media::Image(tuner) => {
                tuner.on_error(reason, &mut sink);
            }
            Media::VideoPending(tuner) | Media::VideoEnded(tuner) => {
                tuner.on_load_error(reason, &mut sink);
            }
            Media::VideoRunning { playback, .. } => {
                // The running loop is left alone; only the defaults are applied.
                report_load_failure(&slot.id, &playback.source_list(), reason, &mut sink);
            }
            Media::Unconfigured => return Err(mode_mismatch(id, "image or video")),
        }
        Ok(())
    }

    /// The hero's video has data; starts its sampling loop on `source`.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime, since the loop is spawned
    /// onto the current one.
    pub fn start_video<S>(&mut self, id: &str, source: S) -> Result<(), HeroError>
    where
        S: FrameSource + Send + 'static,
    {
        let slot = self.slot_mut(id)?;
        let media = std::mem::replace(&mut slot.media, Media::Unconfigured);
        let tuner = match media {
            Media::VideoPending(tuner) => tuner,
            other => {
                slot.media = other;
                return Err(mode_mismatch(id, "idle video"));
            }
        };
        let playback = tuner.playback().clone();
        let handle = SamplingTask::spawn(tuner, source, slot.style.clone());
        slot.media = Media::VideoRunning { playback, handle };
        Ok(())
    }

    /// Tears one hero down, stopping its loop. Returns whether it existed.
    pub async fn remove(&mut self, id: &str) -> bool {
        let Some(index) = self.heroes.iter().position(|h| h.id == id) else {
            return false;
        };
        let slot = self.heroes.remove(index);
        if let Media::VideoRunning { handle, .. } = slot.media {
            handle.stop().await;
        }
        info!(hero = id, "hero removed");
        true
    }

    /// Stops every running loop and waits for all of them.
    pub async fn shutdown(&mut self) {
        let mut running = Vec::new();
        for slot in &mut self.heroes {
            if !matches!(slot.media, Media::VideoRunning { .. }) {
                continue;
            }
            if let Media::VideoRunning { handle, .. } =
                std::mem::replace(&mut slot.media, Media::Unconfigured)
            {
                running.push((slot.id.clone(), handle));
            }
        }
        let (ids, handles): (Vec<_>, Vec<_>) = running.into_iter().unzip();
        let tuners = join_all(handles.into_iter().map(SamplingHandle::stop)).await;

        for (id, tuner) in ids.into_iter().zip(tuners) {
            if let (Some(tuner), Ok(slot)) = (tuner, self.slot_mut(&id)) {
                slot.media = Media::VideoEnded(tuner);
            }
        }
        info!("page shut down");
    }

    /// Final state of a video hero's loop once it has ended.
    pub fn video_state(&self, id: &str) -> Option<VideoState> {
        match &self.slot(id).ok()?.media {
            Media::VideoPending(tuner) | Media::VideoEnded(tuner) => Some(tuner.state()),
            Media::VideoRunning { handle, .. } if handle.is_finished() => Some(VideoState::Stopped),
            Media::VideoRunning { .. } => Some(VideoState::Sampling),
            _ => None,
        }
    }

    fn slot(&self, id: &str) -> Result<&HeroSlot, HeroError> {
        self.heroes
            .iter()
            .find(|h| h.id == id)
            .ok_or_else(|| HeroError::UnknownHero(id.to_string()))
    }

    fn slot_mut(&mut self, id: &str) -> Result<&mut HeroSlot, HeroError> {
        self.heroes
            .iter_mut()
            .find(|h| h.id == id)
            .ok_or_else(|| HeroError::UnknownHero(id.to_string()))
    }
}

fn mode_mismatch(id: &str, expected: &'static str) -> HeroError {
    HeroError::ModeMismatch {
        id: id.to_string(),
        expected,
    }
}
