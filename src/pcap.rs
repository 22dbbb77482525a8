//! `skboutput()` packet sink: writes captured packets to a libpcap
//! "savefile" so they can be opened in Wireshark/tcpdump.
//!
//! Grounded on `examples/original_source/src/pcap_writer.cpp`'s
//! `PCAPwriter`: open/write/close lifecycle, raw-IP link type, and the
//! nanosecond-to-(seconds, microseconds) timestamp split
//! (`NSEC_PER_SEC`/`NSEC_PER_USEC`). The original links `libpcap` when
//! available and no-ops otherwise; this port always writes the pcap
//! savefile format directly rather than depending on libpcap, since the
//! format itself is a fixed, tiny binary layout and no crate in this
//! workspace's stack wraps it (noted in DESIGN.md).

use std::fs::File;
use std::io::{self, Write};

/// `DLT_RAW`: raw IP packets, no link-layer header. Matches the original's
/// `pcap_open_dead(DLT_RAW, 65535)`.
const LINKTYPE_RAW: u32 = 101;
const SNAPLEN: u32 = 65535;
const PCAP_MAGIC: u32 = 0xa1b2_c3d4;
const NSEC_PER_SEC: u64 = 1_000_000_000;
const NSEC_PER_USEC: u64 = 1_000;

#[derive(Debug)]
pub enum Error {
    Io(io::Error),
    AlreadyOpen,
    NotOpen,
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "pcap i/o error: {}", e),
            Self::AlreadyOpen => write!(f, "pcap writer is already open"),
            Self::NotOpen => write!(f, "pcap writer is not open"),
        }
    }
}

impl std::error::Error for Error {}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

/// Writes packets captured via the `skboutput()` builtin to a pcap
/// savefile as they arrive.
pub struct PcapWriter {
    file: Option<File>,
}

impl PcapWriter {
    pub fn new() -> Self {
        Self { file: None }
    }

    pub fn open(&mut self, path: &str) -> Result<(), Error> {
        if self.file.is_some() {
            return Err(Error::AlreadyOpen);
        }
        let mut file = File::create(path)?;
        write_global_header(&mut file)?;
        self.file = Some(file);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.file.is_some()
    }

    /// Append one packet, splitting `ts_ns` into seconds/microseconds the
    /// way the original's `write()` does.
    pub fn write(&mut self, ts_ns: u64, packet: &[u8]) -> Result<(), Error> {
        let file = self.file.as_mut().ok_or(Error::NotOpen)?;
        let secs = ts_ns / NSEC_PER_SEC;
        let usecs = (ts_ns - secs * NSEC_PER_SEC) / NSEC_PER_USEC;
        let caplen = packet.len().min(SNAPLEN as usize) as u32;

        file.write_all(&(secs as u32).to_ne_bytes())?;
        file.write_all(&(usecs as u32).to_ne_bytes())?;
        file.write_all(&caplen.to_ne_bytes())?;
        file.write_all(&(packet.len() as u32).to_ne_bytes())?;
        file.write_all(&packet[..caplen as usize])?;
        Ok(())
    }

    pub fn close(&mut self) {
        self.file = None;
    }
}

impl Default for PcapWriter {
    fn default() -> Self {
        Self::new()
    }
}

fn write_global_header(file: &mut File) -> Result<(), Error> {
    file.write_all(&PCAP_MAGIC.to_ne_bytes())?;
    file.write_all(&2u16.to_ne_bytes())?; // version_major
    file.write_all(&4u16.to_ne_bytes())?; // version_minor
    file.write_all(&0i32.to_ne_bytes())?; // thiszone
    file.write_all(&0u32.to_ne_bytes())?; // sigfigs
    file.write_all(&SNAPLEN.to_ne_bytes())?;
    file.write_all(&LINKTYPE_RAW.to_ne_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_write_close_produces_header_plus_one_record() {
        let path = std::env::temp_dir().join(format!("tracec_pcap_test_{}.pcap", std::process::id()));
        let path_str = path.to_str().unwrap();

        let mut writer = PcapWriter::new();
        writer.open(path_str).unwrap();
        writer.write(1_500_000_000, &[1, 2, 3, 4]).unwrap();
        writer.close();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), 24 + 16 + 4);
        assert_eq!(u32::from_ne_bytes(bytes[0..4].try_into().unwrap()), PCAP_MAGIC);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn write_before_open_is_an_error() {
        let mut writer = PcapWriter::new();
        assert!(matches!(writer.write(0, &[]), Err(Error::NotOpen)));
    }

    #[test]
    fn double_open_is_rejected() {
        let path = std::env::temp_dir().join(format!("tracec_pcap_test_double_{}.pcap", std::process::id()));
        let path_str = path.to_str().unwrap();
        let mut writer = PcapWriter::new();
        writer.open(path_str).unwrap();
        assert!(matches!(writer.open(path_str), Err(Error::AlreadyOpen)));
        writer.close();
        std::fs::remove_file(&path).ok();
    }
}
