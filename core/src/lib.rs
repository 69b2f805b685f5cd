pub mod texture;

/// Converts a 2-byte string into a 16-bit big endian integer.
/// Byte strings longer than 2 bytes are truncated.
#[macro_export]
macro_rules! tag2 {
	($b2: literal) => {
		u16::from_be_bytes([$b2[0], $b2[1]])
	}
}

/// Scales a 5 bit value to 8 bits.
///
/// This is a plain shift, not bit replication, so the low three bits of the result are always zero
/// and `scale8to5(scale5to8(b)) == b` for every 5 bit `b`.
pub const fn scale5to8(b: u8) -> u8 {
	(b & 0x1F) << 3
}

/// Scales an 8 bit value to 5 bits
pub const fn scale8to5(b: u8) -> u8 {
	(b & 0xF8) >> 3
}
