//! ATR synthesis for contactless cards.
//!
//! Contactless cards have no electrical ATR. PC/SC maps the ISO 14443
//! activation data to a pseudo-ATR instead (PC/SC part 3, 3.1.3.2.3):
//!
//! ```text
//! 3B  80+N  80  01  <N historical bytes>  TCK
//! ```
//!
//! where TCK is the XOR of every byte from T0 through the last historical byte.

use tracing::warn;

/// Fixed ATR prefix before the historical bytes (T0 is patched in).
const ATR_PREFIX: [u8; 4] = [0x3B, 0x80, 0x80, 0x01];

/// Historical byte count that still fits the T0 low nibble.
pub const MAX_HISTORICAL_BYTES: usize = 15;

/// ISO 14443-B maximum frame sizes, indexed by the ATQB frame size code.
const ATQB_FRAME_SIZES: [usize; 9] = [16, 24, 32, 40, 48, 64, 96, 128, 256];

/// Build a PC/SC pseudo-ATR around `historical` bytes.
///
/// The result is always `historical.len() + 5` bytes long.
pub fn synthesize_atr(historical: &[u8]) -> Vec<u8> {
    if historical.len() > MAX_HISTORICAL_BYTES {
        warn!(
            len = historical.len(),
            "historical bytes exceed the T0 nibble; ATR will not be ISO 7816-3 conformant"
        );
    }

    let mut atr = Vec::with_capacity(ATR_PREFIX.len() + historical.len() + 1);
    atr.extend_from_slice(&ATR_PREFIX);
    atr[1] = 0x80u8.wrapping_add(historical.len() as u8);
    atr.extend_from_slice(historical);

    let tck = atr[1..].iter().fold(0u8, |acc, b| acc ^ b);
    atr.push(tck);
    atr
}

/// Historical bytes for an ISO 14443-B card.
///
/// Application Data (4 bytes), Protocol Info (3 bytes) and the MBLI in the
/// high nibble of the last byte. `None` when the inputs are malformed or no
/// valid MBLI exists.
pub fn type_b_historical_bytes(
    application_data: &[u8],
    protocol_info: &[u8],
    max_transceive_len: usize,
) -> Option<[u8; 8]> {
    if application_data.len() != 4 || protocol_info.len() != 3 {
        return None;
    }
    let mbli = translate_to_mbli(protocol_info, max_transceive_len)?;

    let mut out = [0u8; 8];
    out[..4].copy_from_slice(application_data);
    out[4..7].copy_from_slice(protocol_info);
    out[7] = mbli << 4;
    Some(out)
}

/// Derive the maximum buffer length index from ATQB protocol info and the
/// reader's maximum transceive length.
pub fn translate_to_mbli(protocol_info: &[u8], max_transceive_len: usize) -> Option<u8> {
    let code = (*protocol_info.get(1)? >> 4) as usize;
    // Codes 9..=15 are reserved.
    let frame_size = *ATQB_FRAME_SIZES.get(code)?;

    // Between 3 and 5 bytes of framing overhead sit on top of the payload.
    let predicted = max_transceive_len.checked_add(5)?;

    // The buffer length is the frame size times a power of two.
    let ratio = predicted / frame_size;
    if ratio == 0 {
        return None;
    }
    let mbl = highest_one_bit(ratio) * frame_size;
    if predicted - mbl > 2 {
        return None;
    }

    let mbli = (mbl / frame_size).trailing_zeros() + 1;
    if mbli > 15 {
        return None;
    }
    Some(mbli as u8)
}

fn highest_one_bit(value: usize) -> usize {
    1 << (usize::BITS - 1 - value.leading_zeros())
}
