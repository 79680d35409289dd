use heartwire_core::protocol::{HEART_RATE_MEASUREMENT, PMD_DATA};
use heartwire_core::{
    Assembler, CHANNEL_COUNT, Channel, RawNotification, Tick, TickCollector, TickSource,
};

fn pmd_frame(tag: u8, samples: &[u8]) -> RawNotification {
    let mut payload = vec![tag];
    payload.extend_from_slice(&[0u8; 9]);
    payload.extend_from_slice(samples);
    RawNotification::new(PMD_DATA, payload)
}

fn ecg_frame(values: &[i32]) -> RawNotification {
    let samples: Vec<u8> = values
        .iter()
        .flat_map(|v| {
            let b = v.to_le_bytes();
            [b[0], b[1], b[2]]
        })
        .collect();
    pmd_frame(0x00, &samples)
}

fn heart_rate(payload: &[u8]) -> RawNotification {
    RawNotification::new(HEART_RATE_MEASUREMENT, payload.to_vec())
}

fn resolved(ticks: &[Tick]) -> Vec<[f32; CHANNEL_COUNT]> {
    ticks.iter().map(|t| t.resolve().0).collect()
}

#[test]
fn hr_record_with_one_rr_interval_emits_two_ticks() {
    let assembler = Assembler::new(TickCollector::new());

    let emitted = assembler.ingest(&heart_rate(&[0x10, 0x3C, 0x0A, 0x00]));
    let ticks = assembler.emitter().take();

    assert_eq!(emitted, 2);
    assert_eq!(ticks.len(), 2);
    assert_eq!(ticks[0].source, TickSource::HeartRate);
    assert_eq!(ticks[1].source, TickSource::RrInterval);

    // HR tick carries no RRI yet
    assert_eq!(ticks[0].get(Channel::Hr), Some(60.0));
    assert_eq!(ticks[0].get(Channel::Rri), None);

    let rri = ticks[1].get(Channel::Rri).unwrap();
    assert!((rri - 9.77).abs() < 0.01);
    assert_eq!(ticks[1].get(Channel::Hr), Some(60.0));
}

#[test]
fn single_acc_group_emits_one_tick_with_carried_channels() {
    let assembler = Assembler::new(TickCollector::new());
    assembler.ingest(&heart_rate(&[0x10, 0x48, 0x00, 0x04]));
    assembler.ingest(&ecg_frame(&[-42]));
    assembler.emitter().take();

    let emitted = assembler.ingest(&pmd_frame(0x01, &[0x01, 0x00, 0x02, 0x00, 0x03, 0x00]));
    let ticks = assembler.emitter().take();

    assert_eq!(emitted, 1);
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].source, TickSource::Acc);
    assert_eq!(resolved(&ticks), vec![[-42.0, 72.0, 1000.0, 1.0, 2.0, 3.0]]);
}

#[test]
fn hr_resolves_to_zero_until_first_heart_rate_record() {
    let assembler = Assembler::new(TickCollector::new());

    assembler.ingest(&ecg_frame(&[1, 2, 3]));
    assembler.ingest(&pmd_frame(0x01, &[0x10, 0x00, 0x20, 0x00, 0x30, 0x00]));

    let ticks = assembler.emitter().take();
    assert_eq!(ticks.len(), 4);
    for tick in &ticks {
        assert_eq!(tick.get(Channel::Hr), None);
        assert_eq!(tick.resolve().get(Channel::Hr), 0.0);
    }
}

#[test]
fn ten_ecg_samples_emit_ten_ticks_with_unchanged_carried_state() {
    let assembler = Assembler::new(TickCollector::new());
    assembler.ingest(&heart_rate(&[0x00, 0x41]));
    assembler.ingest(&pmd_frame(0x01, &[0xF6, 0xFF, 0x14, 0x00, 0xE8, 0x03]));
    assembler.emitter().take();

    let values: Vec<i32> = (0..10).map(|i| i * 100 - 450).collect();
    let emitted = assembler.ingest(&ecg_frame(&values));
    let ticks = assembler.emitter().take();

    assert_eq!(emitted, 10);
    assert_eq!(ticks.len(), 10);
    for (tick, value) in ticks.iter().zip(&values) {
        assert_eq!(tick.source, TickSource::Ecg);
        assert_eq!(tick.resolve().0, [*value as f32, 65.0, 0.0, -10.0, 20.0, 1000.0]);
    }
}

#[test]
fn non_ecg_ticks_carry_the_last_ecg_sample() {
    let assembler = Assembler::new(TickCollector::new());

    assembler.ingest(&ecg_frame(&[120, -7]));
    assembler.ingest(&heart_rate(&[0x00, 0x50]));

    let ticks = assembler.emitter().take();
    assert_eq!(ticks.last().unwrap().get(Channel::Ecg), Some(-7.0));
}

#[test]
fn zero_valued_ecg_sample_is_carried() {
    let assembler = Assembler::new(TickCollector::new());

    assembler.ingest(&ecg_frame(&[250, 0]));
    assembler.ingest(&heart_rate(&[0x00, 0x50]));

    let ticks = assembler.emitter().take();
    assert_eq!(ticks.last().unwrap().get(Channel::Ecg), Some(0.0));
}

#[test]
fn truncated_tails_are_dropped_without_error() {
    let assembler = Assembler::new(TickCollector::new());

    assert_eq!(assembler.ingest(&pmd_frame(0x00, &[1, 0, 0, 2, 0])), 1);
    assert_eq!(
        assembler.ingest(&pmd_frame(0x01, &[1, 0, 2, 0, 3, 0, 4, 0, 5])),
        1
    );
    assert_eq!(assembler.ingest(&heart_rate(&[0x10, 0x3C, 0x00, 0x04, 0x01])), 2);

    assert_eq!(assembler.emitter().len(), 4);
    assert_eq!(assembler.stats().counts().malformed, 0);
}

#[test]
fn unknown_frame_tag_emits_nothing_and_keeps_state() {
    let assembler = Assembler::new(TickCollector::new());
    assembler.ingest(&heart_rate(&[0x00, 0x3C]));
    let before = assembler.state();

    let emitted = assembler.ingest(&pmd_frame(0x02, &[0x01; 24]));

    assert_eq!(emitted, 0);
    assert_eq!(assembler.state(), before);
    assert_eq!(assembler.emitter().len(), 1);
}

#[test]
fn every_tick_is_full_length_and_numeric() {
    let assembler = Assembler::new(TickCollector::new());

    assembler.ingest(&ecg_frame(&[5; 73]));
    assembler.ingest(&pmd_frame(0x01, &[0x01; 78]));
    assembler.ingest(&heart_rate(&[0x10, 0x3C, 0x00, 0x04, 0x10, 0x04]));

    let ticks = assembler.emitter().take();
    assert_eq!(ticks.len(), 73 + 13 + 3);
    for vector in resolved(&ticks) {
        assert_eq!(vector.len(), CHANNEL_COUNT);
        assert!(vector.iter().all(|v| v.is_finite()));
    }

    let counts = assembler.stats().counts();
    assert_eq!(counts.ecg, 73);
    assert_eq!(counts.acc, 13);
    assert_eq!(counts.heart_rate, 1);
    assert_eq!(counts.rr_interval, 2);
}

#[test]
fn concurrent_decoders_never_tear_the_accelerometer_triple() {
    use std::sync::Arc;
    use std::thread;

    let assembler = Arc::new(Assembler::new(TickCollector::new()));

    let acc = {
        let assembler = Arc::clone(&assembler);
        thread::spawn(move || {
            for i in 0..200i16 {
                let v = i.to_le_bytes();
                assembler.ingest(&pmd_frame(0x01, &[v[0], v[1], v[0], v[1], v[0], v[1]]));
            }
        })
    };
    let hr = {
        let assembler = Arc::clone(&assembler);
        thread::spawn(move || {
            for bpm in 40..240u8 {
                assembler.ingest(&heart_rate(&[0x00, bpm]));
            }
        })
    };
    acc.join().unwrap();
    hr.join().unwrap();

    let ticks = assembler.emitter().take();
    assert_eq!(ticks.len(), 400);
    for tick in ticks {
        let x = tick.get(Channel::AccX);
        assert_eq!(x, tick.get(Channel::AccY));
        assert_eq!(x, tick.get(Channel::AccZ));
    }
}
