// THEORY:
// The `pipeline` module is the top-level API of the tuning engine. It wires the
// core modules into the two flows a hero can run:
//
// - Image mode: one sample of the decoded background image, taken on load.
// - Video mode: a throttled, repeating sample of the current video frame for as
//   long as the video plays (it loops forever).
//
// Both flows end in the same place: `LuminanceStats` -> `PresentationParams` ->
// `Presenter`. Any pass that cannot complete degrades to the conservative
// defaults, so a hero is never left half-tuned.
//
// The video tuner is an explicit state machine owned per hero:
//
//   Idle -> Loading -> Sampling (self-loop) -> Stopped
//   Loading -> DefaultsApplied                      (load error before data)
//
// `Stopped` is terminal. It is reached on a sampling failure under
// `FailurePolicy::HaltOnFirstFailure`, or on explicit teardown.

use crate::core_modules::frame_sampler::{FrameSampler, FrameSource};
use crate::core_modules::hero::{HeroConfig, MediaMode, VideoPlayback};
use crate::core_modules::luminance_stats::LuminanceStats;
use crate::core_modules::style_sink::{Presenter, StyleSink};
use crate::core_modules::tuning::{FailurePolicy, PresentationParams, TuningConfig};
use crate::error::{HeroError, SamplingError};
use image::RgbaImage;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

// Re-export key data structures for the public API.
pub use crate::core_modules::hero::VideoSource;
pub use crate::core_modules::tuning::StyleValues;

/// Runs the statistics and mapping engine over one flat RGBA buffer.
pub fn tune_rgba(data: &[u8], config: &TuningConfig) -> Result<PresentationParams, SamplingError> {
    let stats = LuminanceStats::from_rgba(data)?;
    Ok(PresentationParams::from_stats(&stats, config))
}

/// What attaching a hero produced.
#[derive(Debug)]
pub enum Attachment {
    Video(VideoTuner),
    Image(ImageTuner),
    /// No media configured; the hero keeps its stylesheet defaults.
    Unconfigured,
}

/// The Media Attacher: reads a hero's configuration once and sets it up.
#[derive(Debug, Clone, Default)]
pub struct HeroPipeline {
    config: TuningConfig,
}

impl HeroPipeline {
    pub fn new(config: TuningConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TuningConfig {
        &self.config
    }

    /// Writes the focal position, then resolves and prepares the media mode.
    pub fn attach<K>(&self, id: &str, hero: &HeroConfig, sink: &mut K) -> Attachment
    where
        K: StyleSink + ?Sized,
    {
        Presenter::apply_focal_position(sink, &hero.focal_position());

        match hero.resolve() {
            MediaMode::Video(playback) => {
                debug!(hero = id, sources = playback.sources.len(), "video mode");
                Attachment::Video(VideoTuner::new(id, playback, self.config.clone()))
            }
            MediaMode::Image { src } => {
                debug!(hero = id, %src, "image mode");
                Presenter::apply_background_image(sink, &src);
                Attachment::Image(ImageTuner::new(id, src, self.config.clone()))
            }
            MediaMode::Unconfigured => {
                warn!(
                    hero = id,
                    "{}; provide either a video source list (mp4/mov) or a background image",
                    HeroError::ConfigurationMissing
                );
                Attachment::Unconfigured
            }
        }
    }
}

/// Logs a media load failure for hero `id` and applies the conservative defaults.
pub(crate) fn report_load_failure<K>(id: &str, url: &str, reason: &str, sink: &mut K) -> HeroError
where
    K: StyleSink + ?Sized,
{
    let err = HeroError::MediaLoad {
        url: url.to_string(),
        reason: reason.to_string(),
    };
    error!(hero = id, "{err}; check the configured path and file type");
    Presenter::apply_conservative_defaults(sink);
    err
}

/// Image mode: a single sample taken when the background image has loaded.
#[derive(Debug, Clone)]
pub struct ImageTuner {
    id: String,
    src: String,
    sampler: FrameSampler,
    config: TuningConfig,
}

impl ImageTuner {
    pub fn new(id: &str, src: String, config: TuningConfig) -> Self {
        Self {
            id: id.to_string(),
            src,
            sampler: FrameSampler::square(config.image_buffer),
            config,
        }
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    /// Samples the loaded image and writes computed parameters, or the
    /// conservative defaults if the pixels cannot be read.
    pub fn on_load<K>(
        &self,
        image: &RgbaImage,
        sink: &mut K,
    ) -> Result<PresentationParams, HeroError>
    where
        K: StyleSink + ?Sized,
    {
        let stats = self.sampler.sample_image(image).and_then(|buffer| buffer.stats());
        match stats {
            Ok(stats) => {
                let params = PresentationParams::from_stats(&stats, &self.config);
                debug!(
                    hero = %self.id,
                    mean = stats.mean,
                    std_dev = stats.std_dev,
                    style = %params.to_style(),
                    "image tuned"
                );
                Presenter::apply_computed(sink, &params);
                Ok(params)
            }
            Err(err) => {
                warn!(
                    hero = %self.id,
                    "image adaptive tuning skipped ({err}); using safe defaults"
                );
                Presenter::apply_conservative_defaults(sink);
                Err(err.into())
            }
        }
    }

    /// The image failed to load or decode.
    pub fn on_error<K>(&self, reason: &str, sink: &mut K) -> HeroError
    where
        K: StyleSink + ?Sized,
    {
        report_load_failure(&self.id, &self.src, reason, sink)
    }
}

/// Lifecycle of a video hero's sampling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoState {
    Idle,
    Loading,
    Sampling,
    /// Load failed before any data arrived; defaults are showing.
    DefaultsApplied,
    /// Terminal. No further samples are taken.
    Stopped,
}

/// Result of one repaint-cadence tick of the video loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// The loop is not in the sampling state.
    Inactive,
    /// Less than the sample interval has passed since the last sample.
    Throttled,
    /// No decoded frame or unknown size yet; nothing was read.
    NotReady,
    Applied(PresentationParams),
    /// The pass failed and defaults are showing; `halted` when the loop stopped.
    Degraded { halted: bool },
}

/// Video mode: the per-hero sampling state, throttle and failure policy.
#[derive(Debug, Clone)]
pub struct VideoTuner {
    id: String,
    playback: VideoPlayback,
    sampler: FrameSampler,
    config: TuningConfig,
    state: VideoState,
    last_sample: Option<Instant>,
    degraded: bool,
    samples: u64,
}

impl VideoTuner {
    pub fn new(id: &str, playback: VideoPlayback, config: TuningConfig) -> Self {
        Self {
            id: id.to_string(),
            playback,
            sampler: FrameSampler::square(config.video_buffer),
            config,
            state: VideoState::Idle,
            last_sample: None,
            degraded: false,
            samples: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn playback(&self) -> &VideoPlayback {
        &self.playback
    }

    pub fn state(&self) -> VideoState {
        self.state
    }

    /// Number of passes that produced computed parameters.
    pub fn samples_taken(&self) -> u64 {
        self.samples
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.config.sample_interval_ms)
    }

    /// The host has built the video element and it is fetching.
    pub fn begin_loading(&mut self) {
        if self.state == VideoState::Idle {
            self.transition(VideoState::Loading);
        }
    }

    /// The video has data for its current frame; sampling may start.
    pub fn on_loaded_data(&mut self) {
        match self.state {
            VideoState::Idle | VideoState::Loading | VideoState::DefaultsApplied => {
                self.transition(VideoState::Sampling)
            }
            VideoState::Sampling | VideoState::Stopped => {}
        }
    }

    /// The video failed to load. Defaults are applied right away; an already
    /// running loop is left alone.
    pub fn on_load_error<K>(&mut self, reason: &str, sink: &mut K) -> HeroError
    where
        K: StyleSink + ?Sized,
    {
        if matches!(self.state, VideoState::Idle | VideoState::Loading) {
            self.transition(VideoState::DefaultsApplied);
        }
        report_load_failure(&self.id, &self.playback.source_list(), reason, sink)
    }

    /// Explicit teardown.
    pub fn stop(&mut self) {
        if self.state != VideoState::Stopped {
            self.transition(VideoState::Stopped);
        }
    }

    /// One repaint-cadence callback. Samples at most once per sample interval.
    pub fn tick<S, K>(&mut self, now: Instant, source: &mut S, sink: &mut K) -> TickOutcome
    where
        S: FrameSource + ?Sized,
        K: StyleSink + ?Sized,
    {
        if self.state != VideoState::Sampling {
            return TickOutcome::Inactive;
        }
        if let Some(last) = self.last_sample {
            if now.saturating_duration_since(last) < self.sample_interval() {
                return TickOutcome::Throttled;
            }
        }
        self.last_sample = Some(now);

        let pass = self
            .sampler
            .sample(source)
            .and_then(|buffer| buffer.map(|b| b.stats()).transpose());

        match pass {
            Ok(None) => TickOutcome::NotReady,
            Ok(Some(stats)) => {
                let params = PresentationParams::from_stats(&stats, &self.config);
                Presenter::apply_computed(sink, &params);
                self.samples += 1;
                self.degraded = false;
                debug!(
                    hero = %self.id,
                    mean = stats.mean,
                    std_dev = stats.std_dev,
                    style = %params.to_style(),
                    "video frame tuned"
                );
                TickOutcome::Applied(params)
            }
            Err(err) => self.degrade(&err, sink),
        }
    }

    fn degrade<K>(&mut self, err: &SamplingError, sink: &mut K) -> TickOutcome
    where
        K: StyleSink + ?Sized,
    {
        let cause = if err.is_restriction() { "likely cross-origin" } else { "unreadable frame" };
        match self.config.failure_policy {
            FailurePolicy::HaltOnFirstFailure => {
                warn!(
                    hero = %self.id,
                    "video adaptive tuning skipped ({cause}: {err}); using safe defaults"
                );
                Presenter::apply_conservative_defaults(sink);
                self.transition(VideoState::Stopped);
                TickOutcome::Degraded { halted: true }
            }
            FailurePolicy::Retry => {
                if !self.degraded {
                    warn!(
                        hero = %self.id,
                        "video adaptive tuning failed ({cause}: {err}); retrying with safe defaults"
                    );
                    Presenter::apply_conservative_defaults(sink);
                    self.degraded = true;
                }
                TickOutcome::Degraded { halted: false }
            }
        }
    }

    fn transition(&mut self, next: VideoState) {
        debug!(hero = %self.id, from = ?self.state, to = ?next, "video state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::frame_sampler::StillFrame;
    use crate::core_modules::style_sink::{
        StyleMap, VAR_BLUR, VAR_IMAGE, VAR_OVERLAY, VAR_POSITION, VAR_SATURATE,
    };
    use image::Rgba;
    use std::io;
    use std::sync::{Arc, Mutex};
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log output in memory.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogCapture {
        type Writer = LogCapture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Runs `f` under a plain-text subscriber and returns its log lines.
    fn with_logs<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        let capture = LogCapture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::INFO)
            .finish();
        let out = tracing::subscriber::with_default(subscriber, f);
        let text = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        (out, text.lines().map(str::to_string).collect())
    }

    fn solid(level: u8) -> RgbaImage {
        RgbaImage::from_pixel(160, 90, Rgba([level, level, level, 255]))
    }

    fn hero(bg: Option<&str>, video: Option<&str>) -> HeroConfig {
        HeroConfig {
            bg: bg.map(String::from),
            video: video.map(String::from),
            ..Default::default()
        }
    }

    fn video_tuner(config: TuningConfig) -> VideoTuner {
        let pipeline = HeroPipeline::new(config);
        match pipeline.attach("v", &hero(None, Some("loop.mp4")), &mut StyleMap::new()) {
            Attachment::Video(tuner) => tuner,
            other => panic!("expected video, got {other:?}"),
        }
    }

    /// Fails every read once `fail` is set.
    struct Flaky {
        frame: RgbaImage,
        fail: bool,
        reads: usize,
    }

    impl FrameSource for Flaky {
        fn intrinsic_size(&self) -> Option<(u32, u32)> {
            Some(self.frame.dimensions())
        }
        fn has_current_frame(&self) -> bool {
            true
        }
        fn current_frame(&mut self) -> Result<&RgbaImage, SamplingError> {
            self.reads += 1;
            if self.fail {
                Err(SamplingError::Restricted("tainted".into()))
            } else {
                Ok(&self.frame)
            }
        }
    }

    #[test]
    fn engine_boundaries() {
        let config = TuningConfig::default();
        let black = tune_rgba(&[0u8, 0, 0, 255].repeat(16), &config).unwrap().to_style();
        assert_eq!(
            (black.overlay.as_str(), black.blur.as_str(), black.saturate.as_str()),
            ("0.34", "0.00px", "1.00")
        );
        let white = tune_rgba(&[255u8, 255, 255, 255].repeat(16), &config).unwrap().to_style();
        assert_eq!(
            (white.overlay.as_str(), white.blur.as_str(), white.saturate.as_str()),
            ("0.70", "0.00px", "1.00")
        );
        assert!(tune_rgba(&[], &config).is_err());
    }

    #[test]
    fn engine_is_idempotent() {
        let data: Vec<u8> = (0..64 * 64)
            .flat_map(|i| [(i % 256) as u8, (i * 7 % 256) as u8, 40, 255])
            .collect();
        let config = TuningConfig::default();
        let a = tune_rgba(&data, &config).unwrap().to_style();
        let b = tune_rgba(&data, &config).unwrap().to_style();
        assert_eq!(a, b);
    }

    #[test]
    fn unconfigured_hero_sets_only_position() {
        let mut style = StyleMap::new();
        let (attachment, logs) =
            with_logs(|| HeroPipeline::default().attach("none", &hero(None, None), &mut style));
        assert!(matches!(attachment, Attachment::Unconfigured));
        assert_eq!(logs.len(), 1, "{logs:?}");
        assert!(logs[0].contains("WARN"), "{}", logs[0]);
        assert!(logs[0].contains(r#"hero="none""#), "{}", logs[0]);
        assert!(logs[0].contains("neither a video source list nor a background image"));
        assert_eq!(style.len(), 1);
        assert_eq!(style.get(VAR_POSITION), Some("center center"));
    }

    #[test]
    fn video_wins_and_image_is_untouched() {
        let mut style = StyleMap::new();
        let both = hero(Some("bg.jpg"), Some("a.mp4,b.mov"));
        let attachment = HeroPipeline::default().attach("both", &both, &mut style);
        assert!(matches!(attachment, Attachment::Video(_)));
        assert_eq!(style.get(VAR_IMAGE), None);
    }

    #[test]
    fn image_mode_tunes_on_load() {
        let mut style = StyleMap::new();
        let image_hero = hero(Some("bg.jpg"), None);
        let tuner = match HeroPipeline::default().attach("img", &image_hero, &mut style) {
            Attachment::Image(tuner) => tuner,
            other => panic!("expected image, got {other:?}"),
        };
        assert_eq!(style.get(VAR_IMAGE), Some("url(\"bg.jpg\")"));
        let params = tuner.on_load(&solid(255), &mut style).unwrap();
        assert!((params.overlay - 0.70).abs() < 1e-6);
        assert_eq!(style.get(VAR_OVERLAY), Some("0.70"));
        assert_eq!(style.get(VAR_BLUR), Some("0.00px"));
        assert_eq!(style.get(VAR_SATURATE), Some("1.00"));
    }

    #[test]
    fn image_load_error_applies_defaults() {
        let mut style = StyleMap::new();
        let tuner = ImageTuner::new("img", "missing.jpg".into(), TuningConfig::default());
        let (err, logs) = with_logs(|| tuner.on_error("404", &mut style));
        assert!(matches!(err, HeroError::MediaLoad { .. }));
        assert_eq!(logs.len(), 1, "{logs:?}");
        assert!(logs[0].contains("ERROR"), "{}", logs[0]);
        assert!(logs[0].contains(r#"hero="img""#), "{}", logs[0]);
        assert!(logs[0].contains("missing.jpg: 404"), "{}", logs[0]);
        assert_eq!(style.get(VAR_OVERLAY), Some(".55"));
        assert_eq!(style.get(VAR_BLUR), Some("1px"));
        assert_eq!(style.get(VAR_SATURATE), Some("1"));
    }

    #[test]
    fn empty_image_degrades() {
        let mut style = StyleMap::new();
        let tuner = ImageTuner::new("img", "x.png".into(), TuningConfig::default());
        assert!(tuner.on_load(&RgbaImage::new(0, 0), &mut style).is_err());
        assert_eq!(style.get(VAR_OVERLAY), Some(".55"));
    }

    #[test]
    fn video_is_inactive_until_data() {
        let mut tuner = video_tuner(TuningConfig::default());
        let mut style = StyleMap::new();
        let mut source = StillFrame::new(solid(0));
        assert_eq!(tuner.state(), VideoState::Idle);
        tuner.begin_loading();
        assert_eq!(tuner.tick(Instant::now(), &mut source, &mut style), TickOutcome::Inactive);
        tuner.on_loaded_data();
        assert_eq!(tuner.state(), VideoState::Sampling);
        assert!(matches!(
            tuner.tick(Instant::now(), &mut source, &mut style),
            TickOutcome::Applied(_)
        ));
    }

    #[test]
    fn video_throttles_to_interval() {
        let mut tuner = video_tuner(TuningConfig::default());
        let mut style = StyleMap::new();
        let mut source = StillFrame::new(solid(128));
        tuner.on_loaded_data();
        let t0 = Instant::now();
        assert!(matches!(tuner.tick(t0, &mut source, &mut style), TickOutcome::Applied(_)));
        for ms in [16, 250, 499] {
            assert_eq!(
                tuner.tick(t0 + Duration::from_millis(ms), &mut source, &mut style),
                TickOutcome::Throttled
            );
        }
        assert!(matches!(
            tuner.tick(t0 + Duration::from_millis(500), &mut source, &mut style),
            TickOutcome::Applied(_)
        ));
        assert_eq!(tuner.samples_taken(), 2);
    }

    #[test]
    fn sampling_failure_halts_for_good() {
        let mut tuner = video_tuner(TuningConfig::default());
        let mut style = StyleMap::new();
        let mut source = Flaky { frame: solid(200), fail: false, reads: 0 };
        tuner.on_loaded_data();
        let t0 = Instant::now();
        let step = Duration::from_millis(500);
        assert!(matches!(tuner.tick(t0, &mut source, &mut style), TickOutcome::Applied(_)));
        source.fail = true;
        assert_eq!(
            tuner.tick(t0 + step, &mut source, &mut style),
            TickOutcome::Degraded { halted: true }
        );
        assert_eq!(tuner.state(), VideoState::Stopped);
        let writes = style.writes();
        source.fail = false;
        for i in 2..10 {
            assert_eq!(tuner.tick(t0 + step * i, &mut source, &mut style), TickOutcome::Inactive);
        }
        assert_eq!(source.reads, 2);
        assert_eq!(style.writes(), writes);
        assert_eq!(style.get(VAR_OVERLAY), Some(".55"));
        tuner.on_loaded_data();
        assert_eq!(tuner.state(), VideoState::Stopped);
    }

    #[test]
    fn retry_policy_recovers() {
        let config = TuningConfig {
            failure_policy: FailurePolicy::Retry,
            ..Default::default()
        };
        let mut tuner = video_tuner(config);
        let mut style = StyleMap::new();
        let mut source = Flaky { frame: solid(255), fail: true, reads: 0 };
        tuner.on_loaded_data();
        let t0 = Instant::now();
        let step = Duration::from_millis(500);
        let degraded = TickOutcome::Degraded { halted: false };
        assert_eq!(tuner.tick(t0, &mut source, &mut style), degraded);
        assert_eq!(tuner.tick(t0 + step, &mut source, &mut style), degraded);
        // Defaults are written once per failure streak.
        assert_eq!(style.writes(), 3);
        source.fail = false;
        assert!(matches!(
            tuner.tick(t0 + step * 2, &mut source, &mut style),
            TickOutcome::Applied(_)
        ));
        assert_eq!(style.get(VAR_OVERLAY), Some("0.70"));
        assert_eq!(tuner.state(), VideoState::Sampling);
    }

    #[test]
    fn load_error_before_data_applies_defaults() {
        let mut tuner = video_tuner(TuningConfig::default());
        let mut style = StyleMap::new();
        tuner.begin_loading();
        let err = tuner.on_load_error("unsupported", &mut style);
        assert!(matches!(err, HeroError::MediaLoad { .. }));
        assert_eq!(tuner.state(), VideoState::DefaultsApplied);
        assert_eq!(style.get(VAR_BLUR), Some("1px"));
        // A late `loadeddata` still starts sampling.
        tuner.on_loaded_data();
        assert_eq!(tuner.state(), VideoState::Sampling);
    }

    #[test]
    fn load_error_does_not_stop_running_loop() {
        let mut tuner = video_tuner(TuningConfig::default());
        let mut style = StyleMap::new();
        let mut source = StillFrame::new(solid(0));
        tuner.on_loaded_data();
        let t0 = Instant::now();
        tuner.tick(t0, &mut source, &mut style);
        tuner.on_load_error("network", &mut style);
        assert_eq!(tuner.state(), VideoState::Sampling);
        assert_eq!(style.get(VAR_OVERLAY), Some(".55"));
        assert!(matches!(
            tuner.tick(t0 + Duration::from_millis(500), &mut source, &mut style),
            TickOutcome::Applied(_)
        ));
        assert_eq!(style.get(VAR_OVERLAY), Some("0.34"));
    }

    #[test]
    fn not_ready_still_consumes_the_slot() {
        struct Pending;
        impl FrameSource for Pending {
            fn intrinsic_size(&self) -> Option<(u32, u32)> {
                Some((0, 0))
            }
            fn has_current_frame(&self) -> bool {
                true
            }
            fn current_frame(&mut self) -> Result<&RgbaImage, SamplingError> {
                Err(SamplingError::EmptyBuffer)
            }
        }
        let mut tuner = video_tuner(TuningConfig::default());
        let mut style = StyleMap::new();
        tuner.on_loaded_data();
        let t0 = Instant::now();
        assert_eq!(tuner.tick(t0, &mut Pending, &mut style), TickOutcome::NotReady);
        let early = t0 + Duration::from_millis(100);
        assert_eq!(tuner.tick(early, &mut Pending, &mut style), TickOutcome::Throttled);
        assert!(style.is_empty());
    }
}
