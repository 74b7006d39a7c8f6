use std::sync::Arc;
use std::thread;

use approx::assert_relative_eq;
use tempfile::tempdir;

use velodyne_lidar::{
    consts::{CHANNELS_PER_BLOCK, LOWER_BANK, SCANS_PER_PACKET, UPPER_BANK},
    Calibration, CalibrationError, CorrectionTable, FormatError, PacketDecoder, RawPacket,
    SharedCorrections,
};

fn factory_calibration() -> Calibration {
    let mut calibration = Calibration::default_profile(64);
    calibration.pitch = 0.001;
    calibration.roll = -0.002;
    for (&id, laser) in calibration.lasers.iter_mut() {
        laser.rotational_offset = if id % 2 == 0 { 0.05 } else { -0.05 };
        laser.vertical_angle = (2.0 - id as f64 * 0.4).to_radians();
        laser.distance_correction = 1.25;
        laser.vertical_offset_correction = 0.2;
        laser.horizontal_offset_correction = 0.026;
        laser.intensity.a = 1.5;
    }
    calibration
}

fn capture(revolution: u16) -> RawPacket {
    let mut packet = RawPacket::default();
    for (index, block) in packet.blocks.iter_mut().enumerate() {
        block.header = if index % 2 == 0 { LOWER_BANK } else { UPPER_BANK };
        block.rotation = 9000 + (index / 2) as u16 * 18;
        for position in 0..CHANNELS_PER_BLOCK {
            block.set_scan(position, 5000, 100);
        }
    }
    packet.revolution = revolution;
    packet
}

#[test]
fn saved_profile_drives_decoder() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("hdl64e.yaml");
    let calibration = factory_calibration();
    calibration.save(&path).unwrap();

    let loaded = Calibration::load(&path).unwrap();
    assert_eq!(loaded, calibration);

    let table = CorrectionTable::from_calibration(&loaded).unwrap();
    let decoder = PacketDecoder::new(Arc::new(table));
    let measurements = decoder.decode(&capture(7).to_bytes()).unwrap();
    assert_eq!(measurements.len(), SCANS_PER_PACKET);

    // block 0: lower bank at 90 degrees, laser 0 rotated by +0.05 rad
    let first = measurements[0];
    assert_eq!(first.channel, 0);
    assert_relative_eq!(first.heading, -(90f64.to_radians() - 0.05), epsilon = 1e-12);
    assert_relative_eq!(first.elevation, 2f64.to_radians());
    assert_relative_eq!(first.range, 10.0 + 1.25, epsilon = 1e-12);
    assert_eq!(first.intensity, 100);
    assert_eq!(first.revolution, 7);

    // block 1: upper bank, laser 35
    let upper = measurements[CHANNELS_PER_BLOCK + 3];
    assert_eq!(upper.channel, 35);
    assert_relative_eq!(upper.heading, -(90f64.to_radians() + 0.05), epsilon = 1e-12);
    assert_relative_eq!(upper.elevation, (2.0 - 35.0 * 0.4f64).to_radians(), epsilon = 1e-12);
}

#[test]
fn truncated_profile_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("truncated.yaml");
    let text = factory_calibration()
        .to_yaml_string()
        .unwrap()
        .replacen("num_lasers: 64", "num_lasers: 65", 1);
    std::fs::write(&path, text).unwrap();

    match Calibration::load(&path) {
        Err(CalibrationError::Format(FormatError::TooFewLasers { declared, found })) => {
            assert_eq!(declared, 65);
            assert_eq!(found, 64);
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn decoding_threads_share_tables() {
    let shared = SharedCorrections::new(CorrectionTable::identity());
    let bytes = capture(1).to_bytes();

    let workers: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            let bytes = bytes.clone();
            thread::spawn(move || {
                for _ in 0..200 {
                    let decoder = PacketDecoder::from_shared(&shared);
                    let measurements = decoder.decode(&bytes).unwrap();
                    // all channels of a packet see the same table
                    let offset = measurements[0].range - 10.0;
                    assert!(measurements
                        .iter()
                        .all(|m| (m.range - 10.0 - offset).abs() < 1e-9));
                }
            })
        })
        .collect();

    shared.reload(&factory_calibration()).unwrap();
    for worker in workers {
        worker.join().unwrap();
    }

    let measurements = PacketDecoder::from_shared(&shared).decode(&bytes).unwrap();
    assert_relative_eq!(measurements[0].range, 11.25, epsilon = 1e-12);
}
