/// Sample playback via rodio.
///
/// One WAV per lane (`crash.wav` .. `kick.wav`) plus `metronome.wav` are read
/// from the samples directory at startup and kept as in-memory buffers.
/// A trigger decodes the buffer into a detached Sink, delayed so it starts at
/// the requested clock time (fire-and-forget).
///
/// Lanes whose file is missing or undecodable stay silent. A missing
/// metronome falls back to a generated click.
///
/// Compile without the "sound" feature to disable audio entirely (the stub
/// SampleBank accepts triggers and plays nothing).

use std::time::Instant;

use crate::sim::schedule::{AudioClock, SampleTrigger, Voice};

/// Output gain per volume step.
pub const VOLUME_LEVELS: [f32; 3] = [0.3, 0.6, 1.0];

/// Sample file per default lane, matching `LANE_NAMES`.
pub const SAMPLE_FILES: [&str; 8] = [
    "crash.wav",
    "hhat.wav",
    "ride.wav",
    "htom.wav",
    "mtom.wav",
    "snare.wav",
    "ftom.wav",
    "kick.wav",
];

pub const METRONOME_FILE: &str = "metronome.wav";

pub fn next_volume_index(index: usize) -> usize {
    (index + 1) % VOLUME_LEVELS.len()
}

pub fn volume_gain(index: usize) -> f32 {
    VOLUME_LEVELS.get(index).copied().unwrap_or(1.0)
}

/// Clock and sink for when no audio device is available: time still runs so
/// runs can be timed, but nothing sounds.
pub struct SilentOutput {
    epoch: Instant,
}

impl SilentOutput {
    pub fn new() -> Self {
        SilentOutput { epoch: Instant::now() }
    }
}

impl Default for SilentOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioClock for SilentOutput {
    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

impl SampleTrigger for SilentOutput {
    fn trigger(&mut self, _voice: Voice, _at: f64) -> bool {
        true
    }
}

#[cfg(feature = "sound")]
mod inner {
    use std::io::Cursor;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use rodio::{OutputStream, OutputStreamHandle, Sink, Source};

    use super::{volume_gain, METRONOME_FILE, SAMPLE_FILES, VOLUME_LEVELS};
    use crate::sim::schedule::{AudioClock, SampleTrigger, Voice};

    const SAMPLE_RATE: u32 = 22050;

    pub struct SampleBank {
        _stream: OutputStream,
        handle: OutputStreamHandle,
        epoch: Instant,
        lanes: Vec<Option<Arc<Vec<u8>>>>,
        metronome: Arc<Vec<u8>>,
        volume_index: usize,
    }

    impl SampleBank {
        /// Open the default output device and load samples for `lanes` lanes.
        /// None if there is no output device.
        pub fn new(dir: &Path, lanes: usize, volume_index: usize) -> Option<Self> {
            let (stream, handle) = match OutputStream::try_default() {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::warn!("no audio output device: {e}");
                    return None;
                }
            };

            let lane_bufs: Vec<Option<Arc<Vec<u8>>>> = (0..lanes)
                .map(|lane| SAMPLE_FILES.get(lane).and_then(|f| load_wav(&dir.join(f))))
                .collect();
            let loaded = lane_bufs.iter().filter(|b| b.is_some()).count();
            tracing::info!(dir = %dir.display(), loaded, lanes, "samples loaded");

            let metronome = load_wav(&dir.join(METRONOME_FILE))
                .unwrap_or_else(|| Arc::new(make_wav(&gen_click())));

            Some(SampleBank {
                _stream: stream,
                handle,
                epoch: Instant::now(),
                lanes: lane_bufs,
                metronome,
                volume_index: volume_index.min(VOLUME_LEVELS.len() - 1),
            })
        }

        pub fn set_volume_index(&mut self, index: usize) {
            self.volume_index = index.min(VOLUME_LEVELS.len() - 1);
        }

        fn play_at(&self, buf: &Arc<Vec<u8>>, at: f64) {
            let delay = Duration::try_from_secs_f64((at - self.now()).max(0.0)).unwrap_or(Duration::ZERO);
            if let Ok(sink) = Sink::try_new(&self.handle) {
                let cursor = Cursor::new(buf.as_ref().clone());
                if let Ok(src) = rodio::Decoder::new(cursor) {
                    sink.append(src.delay(delay).amplify(volume_gain(self.volume_index)));
                    sink.detach(); // fire-and-forget
                }
            }
        }
    }

    impl AudioClock for SampleBank {
        fn now(&self) -> f64 {
            self.epoch.elapsed().as_secs_f64()
        }
    }

    impl SampleTrigger for SampleBank {
        fn trigger(&mut self, voice: Voice, at: f64) -> bool {
            let buf = match voice {
                Voice::Lane(lane) => match self.lanes.get(lane).and_then(|b| b.clone()) {
                    Some(b) => b,
                    None => return false,
                },
                Voice::Metronome => self.metronome.clone(),
            };
            self.play_at(&buf, at);
            true
        }
    }

    /// Read a WAV file and check that it decodes.
    fn load_wav(path: &Path) -> Option<Arc<Vec<u8>>> {
        let bytes = match std::fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(path = %path.display(), "sample not loaded: {e}");
                return None;
            }
        };
        if let Err(e) = rodio::Decoder::new(Cursor::new(bytes.clone())) {
            tracing::warn!(path = %path.display(), "sample not decodable: {e}");
            return None;
        }
        Some(Arc::new(bytes))
    }

    // ════════════════════════════════════════════════════════════
    //  Fallback click + WAV encoder
    // ════════════════════════════════════════════════════════════

    /// Short high sine blip with a linear fade.
    fn gen_click() -> Vec<f32> {
        let (freq, duration, volume) = (1500.0_f32, 0.03_f32, 0.5_f32);
        let n = (SAMPLE_RATE as f32 * duration) as usize;
        (0..n)
            .map(|i| {
                let t = i as f32 / SAMPLE_RATE as f32;
                let env = 1.0 - (i as f32 / n as f32);
                (t * freq * 2.0 * std::f32::consts::PI).sin() * env * volume
            })
            .collect()
    }

    /// Wrap mono f32 samples into a 16-bit PCM WAV buffer.
    fn make_wav(samples: &[f32]) -> Vec<u8> {
        let num_channels: u16 = 1;
        let bits_per_sample: u16 = 16;
        let byte_rate = SAMPLE_RATE * (num_channels as u32) * (bits_per_sample as u32) / 8;
        let block_align = num_channels * bits_per_sample / 8;
        let data_size = samples.len() as u32 * 2;
        let file_size = 36 + data_size;

        let mut buf = Vec::with_capacity(44 + data_size as usize);

        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&file_size.to_le_bytes());
        buf.extend_from_slice(b"WAVE");

        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
        buf.extend_from_slice(&num_channels.to_le_bytes());
        buf.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&bits_per_sample.to_le_bytes());

        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_size.to_le_bytes());

        for &s in samples {
            let val = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
            buf.extend_from_slice(&val.to_le_bytes());
        }

        buf
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn generated_click_is_a_valid_wav() {
            let wav = make_wav(&gen_click());
            assert_eq!(&wav[0..4], b"RIFF");
            assert_eq!(&wav[8..12], b"WAVE");
            assert_eq!(wav.len(), 44 + gen_click().len() * 2);
            assert!(rodio::Decoder::new(Cursor::new(wav)).is_ok());
        }
    }
}

// ════════════════════════════════════════════════════════════
//  Public API: compiles to no-ops when sound feature is off
// ════════════════════════════════════════════════════════════

#[cfg(feature = "sound")]
pub use inner::SampleBank;

/// Never constructed: without the sound feature the host falls back to
/// `SilentOutput` and says so.
#[cfg(not(feature = "sound"))]
pub struct SampleBank {
    clock: SilentOutput,
}

#[cfg(not(feature = "sound"))]
impl SampleBank {
    pub fn new(_dir: &std::path::Path, _lanes: usize, _volume_index: usize) -> Option<Self> {
        tracing::info!("built without sound support");
        None
    }
    pub fn set_volume_index(&mut self, _index: usize) {}
}

#[cfg(not(feature = "sound"))]
impl AudioClock for SampleBank {
    fn now(&self) -> f64 { self.clock.now() }
}

#[cfg(not(feature = "sound"))]
impl SampleTrigger for SampleBank {
    fn trigger(&mut self, _voice: Voice, _at: f64) -> bool { true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_cycles_through_three_levels() {
        assert_eq!(next_volume_index(0), 1);
        assert_eq!(next_volume_index(1), 2);
        assert_eq!(next_volume_index(2), 0);
        assert_eq!(volume_gain(0), 0.3);
        assert_eq!(volume_gain(2), 1.0);
        assert_eq!(volume_gain(9), 1.0);
    }

    #[cfg(not(feature = "sound"))]
    #[test]
    fn no_sample_bank_without_sound_feature() {
        assert!(SampleBank::new(std::path::Path::new("sounds"), 8, 2).is_none());
    }

    #[test]
    fn silent_output_clock_moves_forward() {
        let mut out = SilentOutput::new();
        let a = out.now();
        assert!(out.trigger(Voice::Lane(0), a));
        assert!(out.now() >= a);
    }
}
