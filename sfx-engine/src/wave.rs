//! RIFF/WAVE container decoding.
//!
//! The scan runs in three phases over the top-level chunks: find `fmt `, then `data`,
//! then an optional `smpl`. Unknown chunks are skipped by their declared size in every
//! phase. Running out of input in the middle of anything is a hard error.

use std::io::{self, Read, Write};

use crate::error::{AudioError, Result};
use crate::format::{AudioFormat, FormatTag, LoopRegion};

const FMT_FIXED_LEN: u32 = 16;
const SMPL_HEADER_LEN: u32 = 36;
const SMPL_LOOP_LEN: u32 = 24;

/// Everything extracted from a container.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedWave {
    pub format: AudioFormat,
    pub payload: Vec<u8>,
    pub loop_region: LoopRegion,
}

struct ChunkReader<R> {
    inner: R,
}

impl<R: Read> ChunkReader<R> {
    /// Fill `buf` completely, or report how many bytes were available.
    fn fill(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut read = 0;
        while read < buf.len() {
            match self.inner.read(&mut buf[read..]) {
                Ok(0) => break,
                Ok(n) => read += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(read)
    }

    fn read_exact(&mut self, buf: &mut [u8], what: &'static str) -> Result<()> {
        if self.fill(buf)? < buf.len() {
            return Err(AudioError::Truncated(what));
        }
        Ok(())
    }

    /// Next chunk id and size; `None` on a clean end of stream.
    fn next_chunk(&mut self) -> Result<Option<([u8; 4], u32)>> {
        let mut header = [0u8; 8];
        match self.fill(&mut header)? {
            0 => Ok(None),
            8 => {
                let id = [header[0], header[1], header[2], header[3]];
                Ok(Some((id, u32_le(&header[4..8]))))
            }
            _ => Err(AudioError::Truncated("chunk header")),
        }
    }

    fn skip(&mut self, len: u64, what: &'static str) -> Result<()> {
        let copied = io::copy(&mut (&mut self.inner).take(len), &mut io::sink())?;
        if copied < len {
            return Err(AudioError::Truncated(what));
        }
        Ok(())
    }

    fn read_payload(&mut self, len: u32) -> Result<Vec<u8>> {
        // Grow as bytes arrive rather than trusting the declared size up front.
        let mut payload = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut payload)?;
        if payload.len() < len as usize {
            return Err(AudioError::Truncated("data chunk"));
        }
        Ok(payload)
    }
}

fn u16_le(b: &[u8]) -> u16 {
    u16::from_le_bytes([b[0], b[1]])
}

fn u32_le(b: &[u8]) -> u32 {
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn parse_fmt<R: Read>(reader: &mut ChunkReader<R>, size: u32) -> Result<AudioFormat> {
    if size < FMT_FIXED_LEN {
        return Err(AudioError::MalformedChunk {
            chunk: "fmt ",
            reason: format!("{} bytes, need at least {}", size, FMT_FIXED_LEN),
        });
    }
    let mut fixed = [0u8; FMT_FIXED_LEN as usize];
    reader.read_exact(&mut fixed, "fmt chunk")?;
    // Extension bytes (cbSize and friends) are not interpreted.
    reader.skip((size - FMT_FIXED_LEN) as u64, "fmt chunk")?;

    let tag = FormatTag::from_raw(u16_le(&fixed[0..2]))?;
    let format = AudioFormat {
        tag,
        channels: u16_le(&fixed[2..4]),
        sample_rate: u32_le(&fixed[4..8]),
        avg_bytes_per_sec: u32_le(&fixed[8..12]),
        block_align: u16_le(&fixed[12..14]),
        bits_per_sample: u16_le(&fixed[14..16]),
    };
    if format.channels == 0 {
        return Err(AudioError::MalformedChunk { chunk: "fmt ", reason: "zero channels".into() });
    }
    if format.block_align == 0 {
        return Err(AudioError::MalformedChunk { chunk: "fmt ", reason: "zero block alignment".into() });
    }
    Ok(format)
}

fn parse_smpl<R: Read>(reader: &mut ChunkReader<R>, size: u32) -> Result<LoopRegion> {
    if size < SMPL_HEADER_LEN {
        return Err(AudioError::MalformedChunk {
            chunk: "smpl",
            reason: format!("{} bytes, header needs {}", size, SMPL_HEADER_LEN),
        });
    }
    let mut header = [0u8; SMPL_HEADER_LEN as usize];
    reader.read_exact(&mut header, "smpl header")?;
    let loop_count = u32_le(&header[28..32]);
    let table_len = loop_count as u64 * SMPL_LOOP_LEN as u64;
    let body_len = (size - SMPL_HEADER_LEN) as u64;
    if table_len > body_len {
        return Err(AudioError::MalformedChunk {
            chunk: "smpl",
            reason: format!("{} loops do not fit in {} bytes", loop_count, size),
        });
    }

    let mut region = LoopRegion::default();
    let mut entry = [0u8; SMPL_LOOP_LEN as usize];
    for i in 0..loop_count {
        reader.read_exact(&mut entry, "smpl loop table")?;
        if i == 0 {
            let start = u32_le(&entry[8..12]);
            let end = u32_le(&entry[12..16]);
            // The end sample is inclusive.
            let length = if end >= start { end - start + 1 } else { 0 };
            region = LoopRegion::new(start, length);
        }
    }
    // Sampler-specific data and any padding after it.
    reader.skip(body_len - table_len, "smpl sampler data")?;
    Ok(region)
}

/// Decode a RIFF/WAVE stream.
pub fn decode<R: Read>(reader: R) -> Result<DecodedWave> {
    let mut reader = ChunkReader { inner: reader };

    let mut riff = [0u8; 12];
    let got = reader.fill(&mut riff)?;
    if got < 4 || &riff[0..4] != b"RIFF" {
        return Err(AudioError::UnsupportedFormat("missing RIFF signature".into()));
    }
    if got < 12 {
        return Err(AudioError::Truncated("RIFF header"));
    }
    if &riff[8..12] != b"WAVE" {
        return Err(AudioError::UnsupportedFormat("RIFF form is not WAVE".into()));
    }

    let format = loop {
        let Some((id, size)) = reader.next_chunk()? else {
            return Err(AudioError::MissingChunk("fmt "));
        };
        if &id == b"fmt " {
            break parse_fmt(&mut reader, size)?;
        }
        tracing::trace!(chunk = %String::from_utf8_lossy(&id), size, "skipping chunk before fmt");
        reader.skip(size as u64, "skipped chunk")?;
    };

    let payload = loop {
        let Some((id, size)) = reader.next_chunk()? else {
            return Err(AudioError::MissingChunk("data"));
        };
        if id.eq_ignore_ascii_case(b"data") {
            if &id != b"data" {
                return Err(AudioError::UnsupportedFormat(format!(
                    "payload chunk id {:?} is not 'data'",
                    String::from_utf8_lossy(&id)
                )));
            }
            break reader.read_payload(size)?;
        }
        reader.skip(size as u64, "skipped chunk")?;
    };

    let mut loop_region = LoopRegion::default();
    while let Some((id, size)) = reader.next_chunk()? {
        if &id == b"smpl" {
            loop_region = parse_smpl(&mut reader, size)?;
            break;
        }
        reader.skip(size as u64, "skipped chunk")?;
    }

    tracing::debug!(
        tag = ?format.tag,
        channels = format.channels,
        sample_rate = format.sample_rate,
        bytes = payload.len(),
        loop_start = loop_region.start,
        loop_length = loop_region.length,
        "decoded wave"
    );
    Ok(DecodedWave { format, payload, loop_region })
}

/// Write a minimal container: `fmt ` (16 bytes), `data`, and a one-loop `smpl` chunk
/// when `loop_region` is given with a non-zero length.
pub fn write_wave<W: Write>(
    mut writer: W,
    format: &AudioFormat,
    payload: &[u8],
    loop_region: Option<LoopRegion>,
) -> Result<()> {
    let loop_region = loop_region.filter(|r| r.length > 0);
    let data_len = u32::try_from(payload.len())
        .map_err(|_| AudioError::InvalidArgument("payload larger than 4 GiB".into()))?;
    let loop_end = match loop_region {
        // The end sample is inclusive.
        Some(r) => Some(r.start.checked_add(r.length - 1).ok_or_else(|| {
            AudioError::InvalidArgument(format!("loop {}+{} past the last addressable sample", r.start, r.length))
        })?),
        None => None,
    };
    let smpl_len = SMPL_HEADER_LEN + SMPL_LOOP_LEN;
    let mut riff_len = (4 + (8 + FMT_FIXED_LEN) + 8u32)
        .checked_add(data_len)
        .ok_or_else(|| AudioError::InvalidArgument("payload too large for a RIFF container".into()))?;
    if loop_region.is_some() {
        riff_len = riff_len
            .checked_add(8 + smpl_len)
            .ok_or_else(|| AudioError::InvalidArgument("payload too large for a RIFF container".into()))?;
    }

    writer.write_all(b"RIFF")?;
    writer.write_all(&riff_len.to_le_bytes())?;
    writer.write_all(b"WAVE")?;

    writer.write_all(b"fmt ")?;
    writer.write_all(&FMT_FIXED_LEN.to_le_bytes())?;
    writer.write_all(&format.tag.raw().to_le_bytes())?;
    writer.write_all(&format.channels.to_le_bytes())?;
    writer.write_all(&format.sample_rate.to_le_bytes())?;
    writer.write_all(&format.avg_bytes_per_sec.to_le_bytes())?;
    writer.write_all(&format.block_align.to_le_bytes())?;
    writer.write_all(&format.bits_per_sample.to_le_bytes())?;

    writer.write_all(b"data")?;
    writer.write_all(&data_len.to_le_bytes())?;
    writer.write_all(payload)?;

    if let (Some(region), Some(end)) = (loop_region, loop_end) {
        let period_ns = if format.sample_rate > 0 { 1_000_000_000 / format.sample_rate } else { 0 };
        let header: [u32; 9] = [0, 0, period_ns, 60, 0, 0, 0, 1, 0];
        let entry: [u32; 6] = [0, 0, region.start, end, 0, 0];
        writer.write_all(b"smpl")?;
        writer.write_all(&smpl_len.to_le_bytes())?;
        for v in header.iter().chain(entry.iter()) {
            writer.write_all(&v.to_le_bytes())?;
        }
    }
    writer.flush()?;
    Ok(())
}
