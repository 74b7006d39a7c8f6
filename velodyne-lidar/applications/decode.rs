use std::{
    fs::File,
    io::{prelude::*, BufReader, BufWriter},
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};

use velodyne_lidar::{
    consts::PACKET_SIZE, Bank, Calibration, CorrectionProvider, CorrectionTable, DecodeConfig,
    PacketDecoder, SharedCorrections,
};

/// Decode recorded Velodyne HDL-64E packets into calibrated measurements.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Decode a packet dump described by a TOML config, one JSON measurement per line.
    Decode { config: PathBuf },
    /// Write a calibration profile with all corrections zeroed.
    DefaultProfile {
        path: PathBuf,
        #[arg(long, default_value_t = 64)]
        lasers: u32,
    },
    /// Load a calibration profile and check it can drive the decoder.
    Check { calibration: PathBuf },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match Args::parse().command {
        Command::Decode { config } => decode(DecodeConfig::from_file(&config)?),
        Command::DefaultProfile { path, lasers } => {
            if lasers == 0 {
                bail!("a profile needs at least one laser");
            }
            Calibration::default_profile(lasers).save(&path)?;
            info!("Written default profile for {} lasers to '{}'", lasers, path.display());
            Ok(())
        }
        Command::Check { calibration } => check(calibration),
    }
}

fn load_corrections(path: &Path) -> Result<SharedCorrections> {
    let calibration = Calibration::load(path)
        .with_context(|| format!("calibration '{}' is unusable", path.display()))?;
    let table = CorrectionTable::from_calibration(&calibration)?;
    Ok(SharedCorrections::new(table))
}

fn check(path: PathBuf) -> Result<()> {
    let corrections = load_corrections(&path)?.snapshot();
    for bank in [Bank::Lower, Bank::Upper] {
        let entries = corrections.bank(bank);
        let (min, max) = entries
            .iter()
            .map(|entry| entry.vertical_angle.to_degrees())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(min, max), angle| {
                (min.min(angle), max.max(angle))
            });
        info!(
            "{:?} bank: lasers {}..{}, elevation {:.2} to {:.2} degrees",
            bank,
            bank.origin(),
            bank.origin() + entries.len() - 1,
            min,
            max
        );
    }
    info!("Calibration '{}' is usable", path.display());
    Ok(())
}

fn decode(config: DecodeConfig) -> Result<()> {
    let corrections = load_corrections(&config.calibration)?;
    let decoder = PacketDecoder::from_shared(&corrections);

    let packet_file = File::open(&config.packets)
        .with_context(|| format!("cannot open packets '{}'", config.packets.display()))?;
    let mut reader = BufReader::new(packet_file);
    let mut writer = BufWriter::new(std::io::stdout().lock());

    let instant = Instant::now();
    let mut buf = [0u8; PACKET_SIZE];
    let (mut decoded, mut dropped) = (0usize, 0usize);

    loop {
        let read_size = read_packet(&mut reader, &mut buf)?;
        if read_size == 0 {
            break;
        }
        if read_size < PACKET_SIZE {
            warn!("ignoring trailing {} bytes of partial packet", read_size);
            break;
        }

        match decoder.decode(&buf) {
            Ok(measurements) => {
                for measurement in &measurements {
                    serde_json::to_writer(&mut writer, measurement)?;
                    writeln!(writer)?;
                }
                decoded += 1;
            }
            Err(error) if config.skip_invalid => {
                warn!(
                    "packet {} rejected: {}. Proceed to next packet.",
                    decoded + dropped,
                    error
                );
                dropped += 1;
            }
            Err(error) => {
                return Err(error).context(format!("packet {} rejected", decoded + dropped))
            }
        }
    }
    writer.flush()?;

    info!(
        "decoded {} packets, dropped {}, in {} milliseconds",
        decoded,
        dropped,
        instant.elapsed().as_millis()
    );
    Ok(())
}

/// Fills `buf` from `reader`, returning fewer bytes only at end of input.
fn read_packet<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}
