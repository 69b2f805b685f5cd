/// Splits packed 4 bit indices into one byte per pixel. Even pixels come from the low nibble.
///
/// `data` must hold at least `(count + 1) / 2` bytes.
pub fn unpack_4bpp(data: &[u8], count: usize) -> Vec<u8> {
	let mut out = vec![0; count];

	for (i, index) in out.iter_mut().enumerate() {
		let byte = data[i / 2];
		*index = if i & 1 == 0 { byte & 0x0F } else { byte >> 4 };
	}

	out
}

/// Packs pairs of 4 bit indices into bytes, the first of each pair in the low nibble.
/// An odd trailing index leaves the high nibble clear.
pub fn pack_4bpp(indices: &[u8]) -> Vec<u8> {
	let mut out = vec![0; (indices.len() + 1) / 2];

	for (i, index) in indices.iter().enumerate() {
		out[i / 2] |= (index & 0x0F) << ((i & 1) * 4);
	}

	out
}

/// Stand-in palette for indexed textures without a CLUT: entry `i` has all three channels set to `i & 31`.
pub fn gray_ramp(len: usize) -> Vec<u16> {
	(0..len).map(|i| {
		let v = (i & 0x1F) as u16;
		v | v << 5 | v << 10
	}).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_unpack() {
		assert_eq!(unpack_4bpp(&[0x01, 0x00], 4), vec![1, 0, 0, 0]);
		assert_eq!(unpack_4bpp(&[0xBA, 0x0C], 3), vec![0xA, 0xB, 0xC]);
	}

	#[test]
	fn test_pack() {
		assert_eq!(pack_4bpp(&[1, 2, 3, 4]), vec![0x21, 0x43]);
		assert_eq!(pack_4bpp(&[0xA, 0xB, 0xC]), vec![0xBA, 0x0C]);
		assert_eq!(pack_4bpp(&[]), Vec::<u8>::new());
	}

	#[test]
	fn test_ramp() {
		let ramp = gray_ramp(256);
		assert_eq!(ramp[0], 0);
		assert_eq!(ramp[1], 0x0421);
		assert_eq!(ramp[31], 0x7FFF);
		// wraps after 32 entries
		assert_eq!(ramp[32], 0);
		assert_eq!(ramp[255], 0x7FFF);
	}
}
