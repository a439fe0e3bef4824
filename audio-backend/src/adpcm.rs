use crate::BackendError;

const ADAPTATION_TABLE: [i32; 16] = [
    230, 230, 230, 230, 307, 409, 512, 614, 768, 614, 512, 409, 307, 230, 230, 230,
];
const COEFF1: [i32; 7] = [256, 512, 0, 192, 240, 460, 392];
const COEFF2: [i32; 7] = [0, -256, 0, 64, 0, -208, -232];

/// Samples per channel in one Microsoft ADPCM block.
pub fn adpcm_samples_per_block(block_align: u16, channels: u16) -> u32 {
    if channels == 0 {
        return 0;
    }
    let per_channel = (block_align / channels) as u32;
    if per_channel < 7 {
        return 0;
    }
    (per_channel - 7) * 2 + 2
}

#[derive(Clone, Copy)]
struct ChannelState {
    predictor: usize,
    delta: i32,
    sample1: i32,
    sample2: i32,
}

impl ChannelState {
    fn expand(&mut self, nibble: u8) -> i16 {
        let signed = if nibble & 0x08 != 0 {
            nibble as i32 - 16
        } else {
            nibble as i32
        };
        let predicted =
            (self.sample1 * COEFF1[self.predictor] + self.sample2 * COEFF2[self.predictor]) >> 8;
        let sample = (predicted + signed * self.delta).clamp(i16::MIN as i32, i16::MAX as i32);
        self.sample2 = self.sample1;
        self.sample1 = sample;
        self.delta = ((ADAPTATION_TABLE[nibble as usize] * self.delta) >> 8).max(16);
        sample as i16
    }
}

/// Decode Microsoft ADPCM blocks into interleaved 16-bit samples.
///
/// A trailing partial block is ignored.
pub fn decode_ms_adpcm(data: &[u8], channels: u16, block_align: u16) -> Result<Vec<i16>, BackendError> {
    if channels == 0 || channels > 2 {
        return Err(BackendError::UnsupportedFormat(format!(
            "adpcm supports mono or stereo, got {} channels",
            channels
        )));
    }
    let per_block = adpcm_samples_per_block(block_align, channels) as usize;
    if per_block < 2 {
        return Err(BackendError::UnsupportedFormat(format!(
            "adpcm block alignment {} too small",
            block_align
        )));
    }

    let ch = channels as usize;
    let block_len = block_align as usize;
    let mut out = Vec::with_capacity(data.len() / block_len * per_block * ch);

    for block in data.chunks_exact(block_len) {
        // Header is stored field-by-field, each field interleaved across channels.
        let mut states = [ChannelState { predictor: 0, delta: 0, sample1: 0, sample2: 0 }; 2];
        let mut cursor = 0usize;
        for state in states.iter_mut().take(ch) {
            let predictor = block[cursor] as usize;
            if predictor >= COEFF1.len() {
                return Err(BackendError::UnsupportedFormat(format!(
                    "adpcm predictor index {} out of range",
                    predictor
                )));
            }
            state.predictor = predictor;
            cursor += 1;
        }
        for state in states.iter_mut().take(ch) {
            state.delta = i16::from_le_bytes([block[cursor], block[cursor + 1]]) as i32;
            cursor += 2;
        }
        for state in states.iter_mut().take(ch) {
            state.sample1 = i16::from_le_bytes([block[cursor], block[cursor + 1]]) as i32;
            cursor += 2;
        }
        for state in states.iter_mut().take(ch) {
            state.sample2 = i16::from_le_bytes([block[cursor], block[cursor + 1]]) as i32;
            cursor += 2;
        }

        // The two header samples come out oldest first.
        for state in states.iter().take(ch) {
            out.push(state.sample2 as i16);
        }
        for state in states.iter().take(ch) {
            out.push(state.sample1 as i16);
        }

        // Remaining nibbles alternate channels, high nibble first.
        let mut channel = 0usize;
        for &byte in &block[cursor..] {
            for nibble in [byte >> 4, byte & 0x0f] {
                out.push(states[channel].expand(nibble));
                channel = (channel + 1) % ch;
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_block(block_align: u16) -> Vec<u8> {
        let mut b = vec![0u8; block_align as usize];
        b[0] = 0; // predictor
        b[1..3].copy_from_slice(&16i16.to_le_bytes());
        b[3..5].copy_from_slice(&100i16.to_le_bytes());
        b[5..7].copy_from_slice(&50i16.to_le_bytes());
        b
    }

    #[test]
    fn samples_per_block_matches_layout() {
        assert_eq!(adpcm_samples_per_block(512, 1), 1012);
        assert_eq!(adpcm_samples_per_block(1024, 2), 1012);
        assert_eq!(adpcm_samples_per_block(4, 1), 0);
    }

    #[test]
    fn mono_block_decodes_expected_count() {
        let block = mono_block(70);
        let out = decode_ms_adpcm(&block, 1, 70).unwrap();
        assert_eq!(out.len(), adpcm_samples_per_block(70, 1) as usize);
        assert_eq!(out[0], 50);
        assert_eq!(out[1], 100);
    }

    #[test]
    fn stereo_blocks_interleave_channels() {
        let block_align = 2 * 7 + 8;
        let block = vec![0u8; block_align];
        let data = [block.clone(), block].concat();
        let out = decode_ms_adpcm(&data, 2, block_align as u16).unwrap();
        let per_block = adpcm_samples_per_block(block_align as u16, 2) as usize;
        assert_eq!(out.len(), 2 * per_block * 2);
    }

    #[test]
    fn partial_trailing_block_is_ignored() {
        let mut data = mono_block(32);
        data.extend_from_slice(&[0u8; 10]);
        let out = decode_ms_adpcm(&data, 1, 32).unwrap();
        assert_eq!(out.len(), adpcm_samples_per_block(32, 1) as usize);
    }

    #[test]
    fn bad_predictor_rejected() {
        let mut block = mono_block(32);
        block[0] = 9;
        assert!(matches!(
            decode_ms_adpcm(&block, 1, 32),
            Err(BackendError::UnsupportedFormat(_))
        ));
    }
}
