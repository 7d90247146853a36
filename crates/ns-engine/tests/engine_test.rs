//! Engine integration tests
//!
//! Drives the closed unit set through the uniform render entry point:
//! arpeggiator feeding the synth, effects processing in place, zero-sample
//! tolerance, and preset restore re-deriving the atomic parameter surfaces.

use ns_core::{NoteEvent, Sample, TimedEvent, Transport};
use ns_dsp::arpeggiator::EventSink;
use ns_engine::wrappers::{ArpeggiatorUnit, DelayUnit, SaturationUnit, SynthUnit};
use ns_engine::{
    AudioBuffer, DspUnit, RenderContext, UnitKind, apply_preset, capture_preset, preset_from_json,
    preset_to_json,
};

const SAMPLE_RATE: f64 = 48000.0;
const BLOCK_SIZE: usize = 512;

fn playing(beat_start: f64, beat_end: f64) -> Transport {
    Transport {
        playing: true,
        tempo_bpm: 120.0,
        beat_start,
        beat_end,
    }
}

#[test]
fn test_zero_samples_and_missing_buffer_are_noops() {
    let mut sink = EventSink::with_capacity(16);
    for kind in UnitKind::ALL {
        let mut unit = DspUnit::new(kind, SAMPLE_RATE, BLOCK_SIZE);

        // Missing buffer
        let mut ctx = RenderContext::new(None, &[], Transport::default());
        unit.render(&mut ctx, &mut sink);

        // Zero-length view
        let mut l: Vec<Sample> = vec![];
        let mut r: Vec<Sample> = vec![];
        let mut ctx = RenderContext::new(
            Some(AudioBuffer::stereo(&mut l, &mut r, 0, 0)),
            &[],
            Transport::default(),
        );
        unit.render(&mut ctx, &mut sink);
    }
}

#[test]
fn test_arp_into_synth_chain_produces_audio() {
    let mut arp = DspUnit::new(UnitKind::Arpeggiator, SAMPLE_RATE, BLOCK_SIZE);
    let mut synth = DspUnit::new(UnitKind::Synth, SAMPLE_RATE, BLOCK_SIZE);
    let mut delay = DspUnit::new(UnitKind::Delay, SAMPLE_RATE, BLOCK_SIZE);
    arp.params().set_value(ArpeggiatorUnit::RATE, 4.0); // 1/16
    synth.params().set_value(SynthUnit::AMP_ATTACK, 1.0);

    let held = [
        TimedEvent::new(0, NoteEvent::NoteOn { note: 57, velocity: 110 }),
        TimedEvent::new(0, NoteEvent::NoteOn { note: 60, velocity: 110 }),
        TimedEvent::new(0, NoteEvent::NoteOn { note: 64, velocity: 110 }),
    ];

    let beats_per_block = BLOCK_SIZE as f64 * 2.0 / SAMPLE_RATE; // 120 BPM
    let mut sink = EventSink::with_capacity(256);
    let mut energy = 0.0f64;

    for b in 0..200 {
        let transport = playing(b as f64 * beats_per_block, (b + 1) as f64 * beats_per_block);
        let events: &[TimedEvent] = if b == 0 { &held } else { &[] };

        // Arpeggiator: event-only render
        sink.clear();
        let mut ctx = RenderContext::events_only(events, transport, BLOCK_SIZE);
        arp.render(&mut ctx, &mut sink);

        // Synth consumes the scheduled events, effects process in place
        let mut l = vec![0.0; BLOCK_SIZE];
        let mut r = vec![0.0; BLOCK_SIZE];
        let mut unused = EventSink::with_capacity(1);
        let mut ctx = RenderContext::new(
            Some(AudioBuffer::stereo(&mut l, &mut r, 0, BLOCK_SIZE)),
            sink.events(),
            transport,
        );
        synth.render(&mut ctx, &mut unused);
        let mut ctx = RenderContext::new(
            Some(AudioBuffer::stereo(&mut l, &mut r, 0, BLOCK_SIZE)),
            &[],
            transport,
        );
        delay.render(&mut ctx, &mut unused);

        assert!(l.iter().chain(r.iter()).all(|x| x.is_finite()));
        energy += l.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>();
    }

    assert!(energy > 0.1, "chain produced no audio: {}", energy);
}

#[test]
fn test_mono_view_processes_in_place() {
    let mut sat = DspUnit::new(UnitKind::Saturation, SAMPLE_RATE, BLOCK_SIZE);
    sat.params().set_value(SaturationUnit::DRIVE, 0.9);
    let mut sink = EventSink::with_capacity(4);

    let mut buffer: Vec<Sample> = (0..BLOCK_SIZE)
        .map(|i| ((i as f32) * 0.05).sin() * 0.5)
        .collect();
    let before = buffer.clone();
    let mut ctx = RenderContext::new(
        Some(AudioBuffer::mono(&mut buffer, 0, BLOCK_SIZE)),
        &[],
        Transport::default(),
    );
    sat.render(&mut ctx, &mut sink);
    assert!(buffer.iter().all(|x| x.is_finite()));
    assert!(buffer != before, "mono render left the buffer untouched");
}

#[test]
fn test_start_offset_limits_processed_range() {
    let mut synth = DspUnit::new(UnitKind::Synth, SAMPLE_RATE, BLOCK_SIZE);
    let mut sink = EventSink::with_capacity(4);
    let mut l = vec![0.0; BLOCK_SIZE];
    let mut r = vec![0.0; BLOCK_SIZE];
    let events = [TimedEvent::new(0, NoteEvent::NoteOn { note: 69, velocity: 127 })];

    // Render only the back half of the host buffer
    let mut ctx = RenderContext::new(
        Some(AudioBuffer::stereo(&mut l, &mut r, 256, 256)),
        &events,
        Transport::default(),
    );
    synth.render(&mut ctx, &mut sink);

    assert!(l[..256].iter().all(|&x| x == 0.0));
    assert!(l[256..].iter().any(|&x| x != 0.0));
}

#[test]
fn test_preset_restore_drives_live_render() {
    // Capture a configured delay, restore into a fresh instance, and check
    // the restored atomics actually steer the DSP
    let source = DspUnit::new(UnitKind::Delay, SAMPLE_RATE, BLOCK_SIZE);
    source.params().set_value(DelayUnit::MIX, 1.0);
    source.params().set_value(DelayUnit::FEEDBACK, 0.0);
    source.params().set_value(DelayUnit::TIME_MS, 100.0);
    source.params().set_value(DelayUnit::OFFSET_MS, 0.0);
    source.params().set_value(DelayUnit::MODE, 0.0); // mono
    let json = preset_to_json(&capture_preset(&source)).unwrap();

    let mut restored = DspUnit::new(UnitKind::Delay, SAMPLE_RATE, BLOCK_SIZE);
    apply_preset(&restored, &preset_from_json(&json).unwrap()).unwrap();

    let mut sink = EventSink::with_capacity(4);
    // Warm the delay-time ramp, then measure the echo of an impulse
    for _ in 0..20 {
        let mut l = vec![0.0; BLOCK_SIZE];
        let mut r = vec![0.0; BLOCK_SIZE];
        let mut ctx = RenderContext::new(
            Some(AudioBuffer::stereo(&mut l, &mut r, 0, BLOCK_SIZE)),
            &[],
            Transport::default(),
        );
        restored.render(&mut ctx, &mut sink);
    }

    let delay_samples = (0.1 * SAMPLE_RATE) as usize;
    let mut l = vec![0.0; delay_samples + 512];
    let mut r = vec![0.0; delay_samples + 512];
    l[0] = 1.0;
    r[0] = 1.0;
    let n = l.len();
    let mut ctx = RenderContext::new(
        Some(AudioBuffer::stereo(&mut l, &mut r, 0, n)),
        &[],
        Transport::default(),
    );
    restored.render(&mut ctx, &mut sink);

    let peak_at = l
        .iter()
        .enumerate()
        .max_by(|a, b| a.1.abs().partial_cmp(&b.1.abs()).unwrap())
        .map(|(i, _)| i)
        .unwrap();
    assert!(
        (peak_at as i64 - delay_samples as i64).abs() <= 2,
        "echo at {} expected {}",
        peak_at,
        delay_samples
    );
}

#[test]
fn test_param_surface_descriptors_and_text() {
    let delay = DspUnit::new(UnitKind::Delay, SAMPLE_RATE, BLOCK_SIZE);
    let params = delay.params();
    assert_eq!(params.num_params(), 10);
    params.set_value(DelayUnit::TIME_MS, 500.0);
    assert_eq!(params.value_text(DelayUnit::TIME_MS), "500.0 ms");
    params.set_value(DelayUnit::MODE, 3.0);
    assert_eq!(params.value_text(DelayUnit::MODE), "Ping-Pong");
}

#[test]
fn test_spectrum_reader_survives_initialise() {
    let mut spectrum = DspUnit::new(UnitKind::Spectrum, SAMPLE_RATE, BLOCK_SIZE);
    let reader = match &spectrum {
        DspUnit::Spectrum(u) => u.reader(),
        _ => unreachable!(),
    };
    spectrum.initialise(96000.0, BLOCK_SIZE);

    let mut sink = EventSink::with_capacity(4);
    let mut l: Vec<Sample> = (0..BLOCK_SIZE).map(|i| ((i as f32) * 0.2).sin()).collect();
    let mut r = l.clone();
    for _ in 0..32 {
        let mut ctx = RenderContext::new(
            Some(AudioBuffer::stereo(&mut l, &mut r, 0, BLOCK_SIZE)),
            &[],
            Transport::default(),
        );
        spectrum.render(&mut ctx, &mut sink);
    }

    let mut out = [0.0f32; ns_dsp::spectrum::SPECTRUM_BANDS];
    assert!(reader.copy_spectrum(&mut out));
    assert!(out.iter().any(|&db| db > ns_dsp::spectrum::DB_FLOOR));
}
