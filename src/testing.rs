//! Recording host fakes and scripted codecs for unit tests.

use std::collections::HashSet;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::decode::{
    DecodeError, DecodedBlock, DecoderFactory, FrameHeader, Mp3FrameDecoder, StreamDecoder, StreamInfo, Transport,
};
use crate::host::{
    AudioCodec, AudioStreamPacket, DeviceCoordinator, DeviceState, Display, FftBuffer, Host, StorageMount,
};
use crate::library::AudioFormat;
use crate::library::wav::canonical_header;

/// First payload byte that makes [`ScriptedMp3`] reject a frame.
pub const CORRUPT_MARKER: u8 = 0xBA;

/// MPEG-1 Layer III, 128 kbps, 44.1 kHz, stereo, no padding: 417 bytes per frame.
pub const MP3_HEADER: [u8; 4] = [0xFF, 0xFB, 0x90, 0x00];
pub const MP3_FRAME_LEN: usize = 417;

pub struct FixedMount {
    root: PathBuf,
    mounted: AtomicBool,
}

impl FixedMount {
    pub fn new(root: &Path) -> Arc<Self> {
        Arc::new(Self {
            root: root.to_path_buf(),
            mounted: AtomicBool::new(true),
        })
    }

    pub fn unmounted(root: &Path) -> Arc<Self> {
        let m = Self::new(root);
        m.mounted.store(false, Ordering::SeqCst);
        m
    }
}

impl StorageMount for FixedMount {
    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn mount_point(&self) -> PathBuf {
        self.root.clone()
    }
}

pub struct RecordingCodec {
    rate: AtomicU32,
    original: u32,
    enabled: AtomicBool,
    rate_calls: Mutex<Vec<Option<u32>>>,
}

impl RecordingCodec {
    pub fn new(original: u32) -> Arc<Self> {
        Arc::new(Self {
            rate: AtomicU32::new(original),
            original,
            enabled: AtomicBool::new(true),
            rate_calls: Mutex::new(Vec::new()),
        })
    }

    pub fn rate_calls(&self) -> Vec<Option<u32>> {
        self.rate_calls.lock().unwrap().clone()
    }
}

impl AudioCodec for RecordingCodec {
    fn output_sample_rate(&self) -> u32 {
        self.rate.load(Ordering::SeqCst)
    }

    fn set_output_sample_rate(&self, rate: Option<u32>) {
        self.rate_calls.lock().unwrap().push(rate);
        self.rate.store(rate.unwrap_or(self.original), Ordering::SeqCst);
    }

    fn original_output_sample_rate(&self) -> u32 {
        self.original
    }

    fn output_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn enable_output(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }
}

/// Coordinator that applies state changes and drops back to `Idle` on a chat toggle.
pub struct RecordingCoordinator {
    state: Mutex<DeviceState>,
    packets: Mutex<Vec<AudioStreamPacket>>,
    states_set: Mutex<Vec<DeviceState>>,
    wake_word: Mutex<Vec<bool>>,
    toggles: AtomicUsize,
    stop_listening: AtomicUsize,
}

impl RecordingCoordinator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(DeviceState::Idle),
            packets: Mutex::new(Vec::new()),
            states_set: Mutex::new(Vec::new()),
            wake_word: Mutex::new(Vec::new()),
            toggles: AtomicUsize::new(0),
            stop_listening: AtomicUsize::new(0),
        })
    }

    pub fn force_state(&self, state: DeviceState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn packets(&self) -> Vec<AudioStreamPacket> {
        self.packets.lock().unwrap().clone()
    }

    pub fn packet_count(&self) -> usize {
        self.packets.lock().unwrap().len()
    }

    pub fn states_set(&self) -> Vec<DeviceState> {
        self.states_set.lock().unwrap().clone()
    }

    pub fn wake_word_calls(&self) -> Vec<bool> {
        self.wake_word.lock().unwrap().clone()
    }

    pub fn toggles(&self) -> usize {
        self.toggles.load(Ordering::SeqCst)
    }

    pub fn stop_listening_calls(&self) -> usize {
        self.stop_listening.load(Ordering::SeqCst)
    }
}

impl DeviceCoordinator for RecordingCoordinator {
    fn device_state(&self) -> DeviceState {
        *self.state.lock().unwrap()
    }

    fn set_device_state(&self, state: DeviceState) {
        self.states_set.lock().unwrap().push(state);
        *self.state.lock().unwrap() = state;
    }

    fn add_audio_data(&self, packet: AudioStreamPacket) {
        self.packets.lock().unwrap().push(packet);
    }

    fn toggle_chat_state(&self) {
        self.toggles.fetch_add(1, Ordering::SeqCst);
        *self.state.lock().unwrap() = DeviceState::Idle;
    }

    fn stop_listening(&self) {
        self.stop_listening.fetch_add(1, Ordering::SeqCst);
    }

    fn enable_wake_word_detection(&self, enabled: bool) {
        self.wake_word.lock().unwrap().push(enabled);
    }
}

#[derive(Default)]
struct FftLedger {
    outstanding: HashSet<u64>,
    max_outstanding: usize,
    feeds: usize,
    releases: usize,
}

/// Display that tracks every FFT buffer it hands out.
#[derive(Default)]
pub struct RecordingDisplay {
    infos: Mutex<Vec<String>>,
    starts: AtomicUsize,
    stops: AtomicUsize,
    next_id: AtomicU64,
    ledger: Mutex<FftLedger>,
}

impl RecordingDisplay {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn infos(&self) -> Vec<String> {
        self.infos.lock().unwrap().clone()
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    pub fn outstanding(&self) -> usize {
        self.ledger.lock().unwrap().outstanding.len()
    }

    pub fn max_outstanding(&self) -> usize {
        self.ledger.lock().unwrap().max_outstanding
    }

    pub fn feeds(&self) -> usize {
        self.ledger.lock().unwrap().feeds
    }

    pub fn releases(&self) -> usize {
        self.ledger.lock().unwrap().releases
    }
}

impl Display for RecordingDisplay {
    fn set_music_info(&self, text: &str) {
        self.infos.lock().unwrap().push(text.to_string());
    }

    fn start_fft(&self) {
        self.starts.fetch_add(1, Ordering::SeqCst);
    }

    fn stop_fft(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    fn make_fft_buffer(&self, bytes: usize) -> Option<FftBuffer> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut ledger = self.ledger.lock().unwrap();
        ledger.outstanding.insert(id);
        ledger.max_outstanding = ledger.max_outstanding.max(ledger.outstanding.len());
        Some(FftBuffer::new(id, bytes))
    }

    fn feed_fft(&self, buffer: &FftBuffer, pcm: &[i16]) {
        assert_eq!(buffer.len(), std::mem::size_of_val(pcm));
        let mut ledger = self.ledger.lock().unwrap();
        assert!(ledger.outstanding.contains(&buffer.id()), "fed a released buffer");
        ledger.feeds += 1;
    }

    fn release_fft_buffer(&self, buffer: FftBuffer) {
        let mut ledger = self.ledger.lock().unwrap();
        assert!(ledger.outstanding.remove(&buffer.id()), "double release");
        ledger.releases += 1;
    }
}

pub struct Fakes {
    pub mount: Arc<FixedMount>,
    pub codec: Arc<RecordingCodec>,
    pub coordinator: Arc<RecordingCoordinator>,
    pub display: Arc<RecordingDisplay>,
}

impl Fakes {
    pub fn new(root: &Path) -> Self {
        Self {
            mount: FixedMount::new(root),
            codec: RecordingCodec::new(16_000),
            coordinator: RecordingCoordinator::new(),
            display: RecordingDisplay::new(),
        }
    }

    pub fn host(&self) -> Host {
        Host {
            mount: self.mount.clone(),
            codec: self.codec.clone(),
            coordinator: self.coordinator.clone(),
            display: Some(self.display.clone()),
        }
    }
}

/// Frame decoder that emits one constant-valued frame per call, or fails on
/// frames whose first payload byte is [`CORRUPT_MARKER`].
pub struct ScriptedMp3 {
    pub value: i16,
}

impl Mp3FrameDecoder for ScriptedMp3 {
    fn decode_frame(&mut self, frame: &[u8], header: &FrameHeader, out: &mut Vec<i16>) -> Result<(), DecodeError> {
        if frame.get(4) == Some(&CORRUPT_MARKER) {
            return Err(DecodeError::Corrupt("scripted".into()));
        }
        let n = header.samples_per_channel * usize::from(header.channels);
        out.extend(std::iter::repeat_n(self.value, n));
        Ok(())
    }
}

/// Stream decoder producing `blocks` blocks of `block_len` interleaved samples.
pub struct ScriptedStream {
    pub blocks: usize,
    pub block_len: usize,
    pub info: StreamInfo,
    /// Fail with `Corrupt` instead of producing block number `fail_at`.
    pub fail_at: Option<usize>,
    pub produced: usize,
    pub too_small: Arc<AtomicUsize>,
}

impl StreamDecoder for ScriptedStream {
    fn decode(&mut self, out: &mut [i16]) -> Result<Option<DecodedBlock>, DecodeError> {
        if self.fail_at == Some(self.produced) {
            return Err(DecodeError::Corrupt("scripted".into()));
        }
        if self.produced >= self.blocks {
            return Ok(None);
        }
        if out.len() < self.block_len {
            self.too_small.fetch_add(1, Ordering::SeqCst);
            return Err(DecodeError::BufferTooSmall { needed: self.block_len });
        }
        out[..self.block_len].fill(1000);
        self.produced += 1;
        Ok(Some(DecodedBlock {
            samples: self.block_len,
            info: self.info,
        }))
    }
}

/// Factory handing out [`ScriptedMp3`] and [`ScriptedStream`] decoders.
pub struct ScriptedDecoders {
    pub stream_blocks: usize,
    pub stream_block_len: usize,
    pub stream_info: StreamInfo,
    pub stream_fail_at: Option<usize>,
    pub too_small: Arc<AtomicUsize>,
}

impl Default for ScriptedDecoders {
    fn default() -> Self {
        Self {
            stream_blocks: 4,
            stream_block_len: 2048,
            stream_info: StreamInfo {
                sample_rate: 44_100,
                bits_per_sample: 16,
                channels: 2,
            },
            stream_fail_at: None,
            too_small: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl DecoderFactory for ScriptedDecoders {
    fn mp3_frame_decoder(&self) -> Result<Box<dyn Mp3FrameDecoder>, DecodeError> {
        Ok(Box::new(ScriptedMp3 { value: 500 }))
    }

    fn open_stream(&self, format: AudioFormat, _file: File) -> Result<Box<dyn StreamDecoder>, DecodeError> {
        if !matches!(format, AudioFormat::Aac | AudioFormat::Flac) {
            return Err(DecodeError::Unsupported(format!("{format:?}")));
        }
        Ok(Box::new(ScriptedStream {
            blocks: self.stream_blocks,
            block_len: self.stream_block_len,
            info: self.stream_info,
            fail_at: self.stream_fail_at,
            produced: 0,
            too_small: self.too_small.clone(),
        }))
    }
}

/// Transport that never pauses and returns from back-off immediately.
///
/// With a non-zero `backoff_limit`, stop is requested once that many
/// back-offs have happened.
#[derive(Default)]
pub struct NoopTransport {
    pub stop: AtomicBool,
    pub backoffs: AtomicUsize,
    pub backoff_limit: usize,
}

impl Transport for NoopTransport {
    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn wait_while_paused(&self) -> bool {
        !self.stop_requested()
    }

    fn backoff(&self, _d: Duration) {
        let n = self.backoffs.fetch_add(1, Ordering::SeqCst) + 1;
        if self.backoff_limit > 0 && n >= self.backoff_limit {
            self.stop.store(true, Ordering::SeqCst);
        }
    }
}

/// One MP3 frame built from [`MP3_HEADER`], optionally marked corrupt.
pub fn mp3_frame(corrupt: bool) -> Vec<u8> {
    let mut f = vec![0u8; MP3_FRAME_LEN];
    f[..4].copy_from_slice(&MP3_HEADER);
    if corrupt {
        f[4] = CORRUPT_MARKER;
    }
    f
}

/// Canonical WAV with `frames` frames of constant `value` per channel.
pub fn wav_bytes(sample_rate: u32, channels: u16, frames: usize, value: i16) -> Vec<u8> {
    let data_size = (frames * usize::from(channels) * 2) as u32;
    let mut bytes = canonical_header(sample_rate, channels, 16, data_size);
    for _ in 0..frames * usize::from(channels) {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}
