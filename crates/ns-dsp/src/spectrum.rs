//! Spectrum analyzer: lock-free STFT pipeline
//!
//! Audio is mixed to mono into a 4096-sample FIFO; each 1024-sample hop (75%
//! overlap) runs a Hann-windowed real FFT whose magnitudes are aggregated
//! into 256 log-spaced bands (peak per band), converted to dB with a -96 dB
//! floor, and smoothed with asymmetric attack/release coefficients.
//!
//! Publication uses a sequence lock: the writer bumps a version counter to
//! odd, writes the band array, bumps it to even. A reader copies the array
//! between two even, equal version reads; on repeated tearing it falls back
//! to a best-effort copy. Neither side ever blocks the other.
//!
//! The band→bin mapping depends on the sample rate and is double-buffered:
//! a rebuild writes the inactive table and swaps the active index with a
//! release store, so a rebuild never races a render call.

use ns_core::Sample;
use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;
use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering, fence};

/// FFT order (2^12 = 4096 points)
pub const FFT_ORDER: usize = 12;
/// FFT size in samples
pub const FFT_SIZE: usize = 1 << FFT_ORDER;
/// Analysis hop (75% overlap)
pub const HOP_SIZE: usize = FFT_SIZE / 4;
/// Number of log-spaced output bands
pub const SPECTRUM_BANDS: usize = 256;
/// Magnitude floor in dB
pub const DB_FLOOR: f32 = -96.0;

/// Smoothing time constants
const ATTACK_MS: f64 = 60.0;
const RELEASE_MS: f64 = 200.0;

/// Bounded seqlock read attempts before the best-effort fallback
const MAX_READ_ATTEMPTS: usize = 8;

/// Lowest analyzed frequency
const MIN_FREQ_HZ: f64 = 20.0;

/// Half-open FFT-bin range aggregated into one display band
#[derive(Debug, Clone, Copy, Default)]
struct BandRange {
    start: u32,
    end: u32,
}

/// State shared between the audio-thread writer and UI-thread readers
struct SharedSpectrum {
    /// Seqlock version: odd while the writer is inside the payload
    version: AtomicU64,
    /// Published band array, guarded by `version`
    payload: UnsafeCell<[f32; SPECTRUM_BANDS]>,
    /// Double-buffered band→bin mapping tables
    mappings: [UnsafeCell<[BandRange; SPECTRUM_BANDS]>; 2],
    /// Index of the table render calls may use
    active_mapping: AtomicUsize,
}

// SAFETY: `payload` is only written by the single audio-thread writer inside
// the odd-version window and only read by readers via volatile copies that
// are validated against the version counter. `mappings[i]` is only written
// while `i` is the inactive index and becomes visible to readers through the
// release store of `active_mapping`.
unsafe impl Sync for SharedSpectrum {}
unsafe impl Send for SharedSpectrum {}

impl SharedSpectrum {
    fn new() -> Self {
        Self {
            version: AtomicU64::new(0),
            payload: UnsafeCell::new([DB_FLOOR; SPECTRUM_BANDS]),
            mappings: [
                UnsafeCell::new([BandRange::default(); SPECTRUM_BANDS]),
                UnsafeCell::new([BandRange::default(); SPECTRUM_BANDS]),
            ],
            active_mapping: AtomicUsize::new(0),
        }
    }

    /// Publish a new band array (single writer, audio thread)
    fn publish(&self, values: &[f32; SPECTRUM_BANDS]) {
        // Begin: version becomes odd. The Acquire half of the RMW keeps the
        // payload writes from being reordered above it.
        let v = self.version.fetch_add(1, Ordering::AcqRel);
        debug_assert_eq!(v & 1, 0, "publish re-entered");

        let dst = self.payload.get() as *mut f32;
        for (i, &value) in values.iter().enumerate() {
            // SAFETY: dst points at SPECTRUM_BANDS f32s; i < SPECTRUM_BANDS.
            // Volatile keeps the element stores from being elided or fused
            // across the version-counter protocol.
            unsafe { dst.add(i).write_volatile(value) };
        }

        // End: version even again. Release keeps the payload writes above.
        self.version.store(v.wrapping_add(2), Ordering::Release);
    }

    /// Copy the published array without blocking the writer. Returns `true`
    /// when the copy is generation-consistent, `false` for the best-effort
    /// fallback after bounded retries.
    fn read(&self, out: &mut [f32; SPECTRUM_BANDS]) -> bool {
        for _ in 0..MAX_READ_ATTEMPTS {
            let v1 = self.version.load(Ordering::Acquire);
            if v1 & 1 == 1 {
                std::hint::spin_loop();
                continue;
            }

            let src = self.payload.get() as *const f32;
            for (i, slot) in out.iter_mut().enumerate() {
                // SAFETY: src points at SPECTRUM_BANDS f32s; the copy may
                // race the writer, which is exactly what the version
                // re-check below detects.
                *slot = unsafe { src.add(i).read_volatile() };
            }

            fence(Ordering::Acquire);
            let v2 = self.version.load(Ordering::Relaxed);
            if v1 == v2 {
                return true;
            }
        }

        // Best effort: the caller gets whatever mixture is present
        let src = self.payload.get() as *const f32;
        for (i, slot) in out.iter_mut().enumerate() {
            // SAFETY: as above.
            *slot = unsafe { src.add(i).read_volatile() };
        }
        false
    }

    /// Rebuild the inactive mapping table for `sample_rate` and swap it in.
    /// One rebuilder at a time; render calls keep reading the active table
    /// until the release store makes the new one visible.
    fn rebuild_mapping(&self, sample_rate: f64) {
        let inactive = 1 - self.active_mapping.load(Ordering::Relaxed);
        let max_freq = (sample_rate * 0.5).min(20000.0).max(MIN_FREQ_HZ * 2.0);
        let max_bin = (FFT_SIZE / 2 + 1) as u32;
        let ratio = max_freq / MIN_FREQ_HZ;

        // SAFETY: `inactive` is not the active index, so no render call reads
        // this table until the store below publishes it.
        let table = unsafe { &mut *self.mappings[inactive].get() };
        for (band, range) in table.iter_mut().enumerate() {
            let f_lo = MIN_FREQ_HZ * ratio.powf(band as f64 / SPECTRUM_BANDS as f64);
            let f_hi = MIN_FREQ_HZ * ratio.powf((band + 1) as f64 / SPECTRUM_BANDS as f64);
            let start = ((f_lo * FFT_SIZE as f64 / sample_rate) as u32).clamp(1, max_bin - 1);
            let end = ((f_hi * FFT_SIZE as f64 / sample_rate).ceil() as u32)
                .clamp(start + 1, max_bin);
            *range = BandRange { start, end };
        }

        self.active_mapping.store(inactive, Ordering::Release);
    }

    /// Snapshot of the active mapping table (audio thread, per hop)
    #[inline]
    fn mapping(&self) -> &[BandRange; SPECTRUM_BANDS] {
        let index = self.active_mapping.load(Ordering::Acquire);
        // SAFETY: the active table is never mutated; rebuilds only touch the
        // inactive one before swapping.
        unsafe { &*self.mappings[index].get() }
    }
}

/// UI-side handle: non-blocking spectrum reads at any poll rate
#[derive(Clone)]
pub struct SpectrumReader {
    shared: Arc<SharedSpectrum>,
}

impl SpectrumReader {
    /// Copy the latest published spectrum (dB values, one per band) into
    /// `out`. Never blocks. Returns `true` when the copy is consistent.
    pub fn copy_spectrum(&self, out: &mut [f32; SPECTRUM_BANDS]) -> bool {
        self.shared.read(out)
    }
}

/// Audio-side STFT analyzer
pub struct SpectrumAnalyzer {
    shared: Arc<SharedSpectrum>,
    fft: Arc<dyn RealToComplex<f32>>,
    /// Input FIFO, FFT_SIZE samples, mono
    fifo: Vec<f32>,
    fill: usize,
    window: Vec<f32>,
    /// Windowed-frame scratch consumed by the FFT
    fft_input: Vec<f32>,
    fft_output: Vec<Complex<f32>>,
    smoothed_db: [f32; SPECTRUM_BANDS],
    attack_coeff: f32,
    release_coeff: f32,
    sample_rate: f64,
}

impl SpectrumAnalyzer {
    pub fn new(sample_rate: f64) -> Self {
        let sample_rate = if sample_rate.is_finite() && sample_rate >= 8000.0 {
            sample_rate
        } else {
            log::warn!("spectrum analyzer: invalid sample rate {sample_rate}, using 48 kHz");
            48000.0
        };

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(FFT_SIZE);

        // Hann window
        let window: Vec<f32> = (0..FFT_SIZE)
            .map(|i| {
                0.5 * (1.0
                    - (2.0 * std::f64::consts::PI * i as f64 / (FFT_SIZE - 1) as f64).cos())
                    as f32
            })
            .collect();

        let shared = Arc::new(SharedSpectrum::new());
        shared.rebuild_mapping(sample_rate);

        let mut analyzer = Self {
            shared,
            fft,
            fifo: vec![0.0; FFT_SIZE],
            fill: 0,
            window,
            fft_input: vec![0.0; FFT_SIZE],
            fft_output: vec![Complex::new(0.0, 0.0); FFT_SIZE / 2 + 1],
            smoothed_db: [DB_FLOOR; SPECTRUM_BANDS],
            attack_coeff: 0.0,
            release_coeff: 0.0,
            sample_rate,
        };
        analyzer.update_smoothing_coeffs();
        analyzer
    }

    /// Handle for UI-side reads
    pub fn reader(&self) -> SpectrumReader {
        SpectrumReader {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Asymmetric smoothing coefficients derived from the hop period
    fn update_smoothing_coeffs(&mut self) {
        let hop_seconds = HOP_SIZE as f64 / self.sample_rate;
        self.attack_coeff = (1.0 - (-hop_seconds / (ATTACK_MS / 1000.0)).exp()) as f32;
        self.release_coeff = (1.0 - (-hop_seconds / (RELEASE_MS / 1000.0)).exp()) as f32;
    }

    /// Feed a stereo block; `right` may repeat `left` for mono sources
    pub fn process_block(&mut self, left: &[Sample], right: &[Sample]) {
        let n = left.len().min(right.len());
        for i in 0..n {
            self.fifo[self.fill] = 0.5 * (left[i] + right[i]);
            self.fill += 1;
            if self.fill == FFT_SIZE {
                self.analyze();
                // Shift out one hop and keep the 75% overlap
                self.fifo.copy_within(HOP_SIZE.., 0);
                self.fill = FFT_SIZE - HOP_SIZE;
            }
        }
    }

    fn analyze(&mut self) {
        for (dst, (&x, &w)) in self
            .fft_input
            .iter_mut()
            .zip(self.fifo.iter().zip(self.window.iter()))
        {
            *dst = x * w;
        }

        if self.fft.process(&mut self.fft_input, &mut self.fft_output).is_err() {
            for c in &mut self.fft_output {
                *c = Complex::new(0.0, 0.0);
            }
            return;
        }

        // Peak magnitude per log band, dB floor, asymmetric smoothing
        let scale = 2.0 / FFT_SIZE as f32;
        let mapping = self.shared.mapping();
        for band in 0..SPECTRUM_BANDS {
            let range = mapping[band];
            let mut peak = 0.0f32;
            for bin in range.start..range.end {
                let c = self.fft_output[bin as usize];
                let mag_sq = c.re * c.re + c.im * c.im;
                if mag_sq > peak {
                    peak = mag_sq;
                }
            }
            let magnitude = peak.sqrt() * scale;
            let db = (20.0 * magnitude.max(1e-10).log10()).max(DB_FLOOR);

            let smoothed = self.smoothed_db[band];
            let coeff = if db > smoothed {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.smoothed_db[band] = smoothed + coeff * (db - smoothed);
        }

        self.shared.publish(&self.smoothed_db);
    }

    /// Re-derive the bin mapping and smoothing for a new sample rate. The
    /// double-buffered mapping swap keeps concurrent render calls safe.
    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate.is_finite() && sample_rate >= 8000.0 {
            self.sample_rate = sample_rate;
        } else {
            log::warn!("spectrum analyzer: rejecting invalid sample rate {sample_rate}");
        }
        self.shared.rebuild_mapping(self.sample_rate);
        self.update_smoothing_coeffs();
    }

    pub fn reset(&mut self) {
        self.fifo.fill(0.0);
        self.fill = 0;
        self.smoothed_db = [DB_FLOOR; SPECTRUM_BANDS];
        self.shared.publish(&self.smoothed_db);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const SR: f64 = 48000.0;

    fn feed_sine(analyzer: &mut SpectrumAnalyzer, freq: f64, seconds: f64) {
        let n = (SR * seconds) as usize;
        let block: Vec<Sample> = (0..n)
            .map(|i| (2.0 * PI * freq * i as f64 / SR).sin() as Sample)
            .collect();
        for chunk in block.chunks(512) {
            analyzer.process_block(chunk, chunk);
        }
    }

    fn band_of(freq: f64) -> usize {
        let ratio: f64 = 20000.0 / 20.0;
        ((freq / 20.0).ln() / ratio.ln() * SPECTRUM_BANDS as f64) as usize
    }

    #[test]
    fn test_sine_peaks_in_expected_band() {
        let mut analyzer = SpectrumAnalyzer::new(SR);
        let reader = analyzer.reader();
        feed_sine(&mut analyzer, 1000.0, 1.0);

        let mut spectrum = [0.0f32; SPECTRUM_BANDS];
        assert!(reader.copy_spectrum(&mut spectrum));

        let loudest = spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        let expected = band_of(1000.0);
        assert!(
            (loudest as i64 - expected as i64).abs() <= 2,
            "loudest band {} expected {}",
            loudest,
            expected
        );
    }

    #[test]
    fn test_floor_before_any_audio() {
        let analyzer = SpectrumAnalyzer::new(SR);
        let reader = analyzer.reader();
        let mut spectrum = [0.0f32; SPECTRUM_BANDS];
        assert!(reader.copy_spectrum(&mut spectrum));
        assert!(spectrum.iter().all(|&db| db == DB_FLOOR));
    }

    #[test]
    fn test_silence_releases_toward_floor() {
        let mut analyzer = SpectrumAnalyzer::new(SR);
        let reader = analyzer.reader();
        feed_sine(&mut analyzer, 500.0, 0.5);

        let mut loud = [0.0f32; SPECTRUM_BANDS];
        reader.copy_spectrum(&mut loud);
        let band = band_of(500.0);
        assert!(loud[band] > DB_FLOOR + 20.0);

        let silence = vec![0.0 as Sample; 512];
        for _ in 0..(SR as usize * 3 / 512) {
            analyzer.process_block(&silence, &silence);
        }
        let mut quiet = [0.0f32; SPECTRUM_BANDS];
        reader.copy_spectrum(&mut quiet);
        assert!(quiet[band] < loud[band] - 30.0);
    }

    #[test]
    fn test_mapping_rebuild_on_sample_rate_change() {
        let mut analyzer = SpectrumAnalyzer::new(48000.0);
        analyzer.set_sample_rate(96000.0);
        feed_sine(&mut analyzer, 1000.0, 0.5);
        let reader = analyzer.reader();
        let mut spectrum = [0.0f32; SPECTRUM_BANDS];
        assert!(reader.copy_spectrum(&mut spectrum));
        assert!(spectrum.iter().any(|&db| db > DB_FLOOR));
    }

    #[test]
    fn test_reset_publishes_floor() {
        let mut analyzer = SpectrumAnalyzer::new(SR);
        feed_sine(&mut analyzer, 2000.0, 0.5);
        analyzer.reset();
        let reader = analyzer.reader();
        let mut spectrum = [0.0f32; SPECTRUM_BANDS];
        reader.copy_spectrum(&mut spectrum);
        assert!(spectrum.iter().all(|&db| db == DB_FLOOR));
    }

    #[test]
    fn test_concurrent_reads_never_tear() {
        use std::sync::atomic::{AtomicBool, Ordering};

        // Generation-stamped payloads: every entry of a publish carries the
        // same value, so any mixture is detectable
        let shared = Arc::new(SharedSpectrum::new());
        let stop = Arc::new(AtomicBool::new(false));

        let writer = {
            let shared = Arc::clone(&shared);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                let mut generation = 0.0f32;
                while !stop.load(Ordering::Relaxed) {
                    generation += 1.0;
                    shared.publish(&[generation; SPECTRUM_BANDS]);
                }
            })
        };

        let mut consistent_reads = 0usize;
        let mut out = [0.0f32; SPECTRUM_BANDS];
        for _ in 0..20000 {
            if shared.read(&mut out) {
                consistent_reads += 1;
                let first = out[0];
                assert!(
                    out.iter().all(|&x| x == first),
                    "torn read on a consistent generation"
                );
            }
        }
        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
        assert!(consistent_reads > 0, "no consistent read ever succeeded");
    }
}
