//! JPEG header inspection for ready-made frames
//!
//! Compressed frames handed over by producers are checked for the SOI / EOI
//! markers, then [`read_header`] walks the segments up to the start of scan
//! so the declared geometry can be compared with the SOF header.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JpegParseError {
    #[error("invalid JPEG: too short")]
    TooShort,

    #[error("missing SOI marker")]
    MissingSoi,

    #[error("missing SOS marker")]
    MissingSos,

    #[error("missing EOI marker")]
    MissingEoi,

    #[error("unsupported JPEG format")]
    Unsupported,
}

/// JPEG marker codes
mod markers {
    pub const SOI: u8 = 0xD8; // Start of Image
    pub const EOI: u8 = 0xD9; // End of Image
    pub const SOS: u8 = 0xDA; // Start of Scan
    pub const DQT: u8 = 0xDB; // Define Quantization Table
    pub const SOF0: u8 = 0xC0; // Start of Frame (Baseline)
    pub const SOF1: u8 = 0xC1; // Start of Frame (Extended sequential)
    pub const SOF2: u8 = 0xC2; // Start of Frame (Progressive)
    pub const TEM: u8 = 0x01;
    pub const RST0: u8 = 0xD0;
    pub const RST7: u8 = 0xD7;
}

/// Frame component from the SOF segment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Component {
    pub id: u8,
    /// Horizontal sampling factor
    pub h: u8,
    /// Vertical sampling factor
    pub v: u8,
    pub quant_table: u8,
}

/// Header information of a JPEG image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JpegInfo {
    /// Width in pixels
    pub width: u16,

    /// Height in pixels
    pub height: u16,

    pub components: Vec<Component>,

    /// Number of quantization tables defined before the scan
    pub quant_tables: usize,
}

/// Checks the SOI and EOI markers framing a JPEG bitstream.
pub fn validate_jpeg(data: &[u8]) -> Result<(), JpegParseError> {
    if data.len() < 4 {
        return Err(JpegParseError::TooShort);
    }
    if data[0] != 0xFF || data[1] != markers::SOI {
        return Err(JpegParseError::MissingSoi);
    }
    if data[data.len() - 2] != 0xFF || data[data.len() - 1] != markers::EOI {
        return Err(JpegParseError::MissingEoi);
    }
    Ok(())
}

fn segment_len(data: &[u8], pos: usize) -> Result<usize, JpegParseError> {
    if pos + 2 > data.len() {
        return Err(JpegParseError::TooShort);
    }
    let length = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
    if length < 2 || pos + length > data.len() {
        return Err(JpegParseError::TooShort);
    }
    Ok(length)
}

/// Reads the frame header of a Huffman-coded JPEG.
pub fn read_header(data: &[u8]) -> Result<JpegInfo, JpegParseError> {
    if data.len() < 4 {
        return Err(JpegParseError::TooShort);
    }
    if data[0] != 0xFF || data[1] != markers::SOI {
        return Err(JpegParseError::MissingSoi);
    }

    let mut pos = 2;
    let mut frame: Option<(u16, u16, Vec<Component>)> = None;
    let mut quant_tables = 0usize;

    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = data[pos + 1];
        pos += 2;

        match marker {
            // fill bytes before a marker
            0xFF => pos -= 1,

            markers::TEM | markers::RST0..=markers::RST7 => {}

            markers::EOI => break,

            markers::SOS => {
                let (width, height, components) = frame.ok_or(JpegParseError::Unsupported)?;
                return Ok(JpegInfo {
                    width,
                    height,
                    components,
                    quant_tables,
                });
            }

            markers::DQT => {
                let length = segment_len(data, pos)?;
                let mut table = pos + 2;
                while table < pos + length {
                    // 16-bit tables take twice the space
                    let precision = data[table] >> 4;
                    table += 1 + if precision == 0 { 64 } else { 128 };
                    quant_tables += 1;
                }
                pos += length;
            }

            markers::SOF0 | markers::SOF1 | markers::SOF2 => {
                let length = segment_len(data, pos)?;
                if length < 8 {
                    return Err(JpegParseError::TooShort);
                }
                let height = u16::from_be_bytes([data[pos + 3], data[pos + 4]]);
                let width = u16::from_be_bytes([data[pos + 5], data[pos + 6]]);
                let count = data[pos + 7] as usize;
                if length < 8 + 3 * count {
                    return Err(JpegParseError::TooShort);
                }

                let components = data[pos + 8..pos + 8 + 3 * count]
                    .chunks_exact(3)
                    .map(|c| Component {
                        id: c[0],
                        h: c[1] >> 4,
                        v: c[1] & 0x0F,
                        quant_table: c[2],
                    })
                    .collect();
                frame = Some((width, height, components));
                pos += length;
            }

            // lossless and arithmetic-coded frames
            0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF => {
                return Err(JpegParseError::Unsupported)
            }

            _ => {
                let length = segment_len(data, pos)?;
                pos += length;
            }
        }
    }

    Err(JpegParseError::MissingSos)
}
