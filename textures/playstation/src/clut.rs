use byteorder::{
	LE,
	ReadBytesExt,
	WriteBytesExt
};

use log::{
	debug,
	warn
};

use std::io::{
	self,
	Read
};

use timkit_core::texture::Rgb;

use crate::tim::{
	SubHeader,
	SUBHEADER_SIZE
};

#[cfg(feature = "import")]
use crate::tim::{
	read_block,
	TIMImportError
};

/// A color lookup table, stored as a flat run of packed colors split into equally sized rows.
#[derive(Clone, Debug, PartialEq)]
pub struct Clut {
	pub header: SubHeader,
	colors: Vec<u16>,
	row_len: usize,
	num_rows: usize,
}

impl Clut {
	/// Works out the row layout of `count` colors for a CLUT declared `width` colors wide.
	/// Returns `(row_len, num_rows)`. Colors that don't split evenly become a single row.
	pub fn layout(count: usize, width: u16) -> (usize, usize) {
		let width = width as usize;

		if width != 0 && count % width == 0 {
			(width, count / width)
		} else {
			(count, 1)
		}
	}

	#[cfg(feature = "import")]
	pub(crate) fn read<R>(buf: &mut R) -> Result<Clut, TIMImportError>
	where
		R: Read,
	{
		let header = SubHeader::read(buf)?;
		if header.size < SUBHEADER_SIZE {
			return Err(TIMImportError::ClutSize(header.size));
		}

		let data = read_block(buf, (header.size - SUBHEADER_SIZE) as usize)?;
		if data.len() % 2 != 0 {
			warn!("CLUT data has an odd length of {} bytes, ignoring the last byte", data.len());
		}

		let mut colors = vec![0; data.len() / 2];
		let mut cursor = &data[..];
		cursor.read_u16_into::<LE>(&mut colors)?;

		let (row_len, num_rows) = Clut::layout(colors.len(), header.width);
		if num_rows == 1 && row_len != header.width as usize {
			warn!("{} CLUT colors don't divide into rows of {}, using a single row", colors.len(),
				header.width);
		}

		debug!("CLUT at ({}, {}): {} rows of {} colors (header says {}x{})", header.x, header.y, num_rows,
			row_len, header.width, header.height);

		Ok(Clut {
			header: header,
			colors: colors,
			row_len: row_len,
			num_rows: num_rows,
		})
	}

	/// Builds a single row CLUT of exactly `len` entries. Missing entries are black, extra colors are dropped.
	pub fn from_palette(palette: &[Rgb], len: usize) -> Clut {
		let mut colors = vec![0; len];

		for (slot, c) in colors.iter_mut().zip(palette.iter()) {
			*slot = c.to_bgr555();
		}

		Clut {
			header: SubHeader {
				size: SUBHEADER_SIZE + (len * 2) as u32,
				x: 0,
				y: 0,
				width: len as u16,
				height: 1,
			},
			colors: colors,
			row_len: len,
			num_rows: 1,
		}
	}

	#[cfg(feature = "export")]
	pub(crate) fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		self.header.write(buf)?;

		for c in self.colors.iter() {
			buf.write_u16::<LE>(*c)?;
		}

		Ok(())
	}

	pub fn num_rows(&self) -> usize {
		self.num_rows
	}

	pub fn row_len(&self) -> usize {
		self.row_len
	}

	/// Returns palette row `index`. Rows past the end fall back to row 0 rather than failing.
	pub fn row(&self, index: usize) -> &[u16] {
		let index = if index < self.num_rows {
			index
		} else {
			debug!("Palette row {} requested from a {} row CLUT, using row 0", index, self.num_rows);
			0
		};

		let start = index * self.row_len;
		self.colors.get(start..start + self.row_len).unwrap_or(&[])
	}

	/// Palette row `index` expanded to 8 bit RGB, with the same fallback as [`Clut::row`]
	pub fn colors(&self, index: usize) -> Vec<Rgb> {
		self.row(index).iter().map(|c| Rgb::from_bgr555(*c)).collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn clut_block(width: u16, height: u16, colors: &[u16]) -> Vec<u8> {
		let mut data = vec![];
		data.extend_from_slice(&(12 + colors.len() as u32 * 2).to_le_bytes());
		for v in [0u16, 480, width, height].iter() {
			data.extend_from_slice(&v.to_le_bytes());
		}
		for c in colors.iter() {
			data.extend_from_slice(&c.to_le_bytes());
		}
		data
	}

	#[test]
	fn test_rows() {
		let colors: Vec<u16> = (0..32).collect();
		let data = clut_block(16, 2, &colors);
		let clut = Clut::read(&mut data.as_slice()).unwrap();

		assert_eq!(clut.header.y, 480);
		assert_eq!(clut.num_rows(), 2);
		assert_eq!(clut.row_len(), 16);
		assert_eq!(clut.row(1), &colors[16..]);
	}

	#[test]
	fn test_row_fallback_to_zero() {
		let colors: Vec<u16> = (0..48).collect();
		let data = clut_block(16, 3, &colors);
		let clut = Clut::read(&mut data.as_slice()).unwrap();

		assert_eq!(clut.row(3), clut.row(0));
		assert_eq!(clut.row(usize::MAX), &colors[..16]);
		assert_eq!(clut.colors(7), clut.colors(0));
	}

	#[test]
	fn test_reshape_mismatch() {
		let colors: Vec<u16> = (0..20).collect();
		let data = clut_block(16, 2, &colors);
		let clut = Clut::read(&mut data.as_slice()).unwrap();

		assert_eq!(clut.num_rows(), 1);
		assert_eq!(clut.row(0), &colors[..]);
	}

	#[test]
	fn test_zero_width() {
		let colors = [1u16, 2, 3];
		let data = clut_block(0, 1, &colors);
		let clut = Clut::read(&mut data.as_slice()).unwrap();

		assert_eq!(clut.num_rows(), 1);
		assert_eq!(clut.row(0), &colors[..]);
	}

	#[test]
	fn test_odd_length() {
		let mut data = clut_block(2, 1, &[0x7FFF]);
		// one stray byte counted in the block size
		data[0] = 15;
		data.push(0xAB);
		let clut = Clut::read(&mut data.as_slice()).unwrap();

		assert_eq!(clut.num_rows(), 1);
		assert_eq!(clut.row_len(), 1);
		assert_eq!(clut.row(0), &[0x7FFF]);
		assert_eq!(clut.colors(0), vec![Rgb::new(248, 248, 248)]);
	}

	#[test]
	fn test_block_too_small() {
		let mut data = clut_block(16, 1, &[]);
		data[0] = 4;
		assert!(matches!(Clut::read(&mut data.as_slice()), Err(TIMImportError::ClutSize(4))));
	}

	#[test]
	fn test_block_truncated() {
		let mut data = clut_block(16, 1, &[0; 16]);
		data.truncate(20);
		assert!(matches!(Clut::read(&mut data.as_slice()), Err(TIMImportError::Truncated)));
	}

	#[test]
	fn test_from_palette_pads_black() {
		let clut = Clut::from_palette(&[Rgb::new(255, 255, 255), Rgb::new(8, 16, 24)], 16);

		assert_eq!(clut.header.size, 44);
		assert_eq!(clut.header.width, 16);
		assert_eq!(clut.row(0)[0], 0x7FFF);
		assert_eq!(clut.row(0)[1], 1 | 2 << 5 | 3 << 10);
		assert!(clut.row(0)[2..].iter().all(|c| *c == 0));

		let mut out = vec![];
		clut.write(&mut out).unwrap();
		assert_eq!(out.len(), 44);
		assert_eq!(Clut::read(&mut out.as_slice()).unwrap(), clut);
	}
}
