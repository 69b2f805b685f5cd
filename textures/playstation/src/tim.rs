use bitflags::bitflags;

use byteorder::{
	LE,
	ReadBytesExt,
	WriteBytesExt
};

use log::debug;

use std::{
	fmt,
	io::{
		self,
		Read
	}
};

use thiserror::Error;

use timkit_core::texture::{
	IndexedImage,
	Rgb,
	RgbImage
};

use crate::clut::Clut;
use crate::pixels::{
	gray_ramp,
	pack_4bpp,
	unpack_4bpp
};

pub const MAGIC: u32 = 0x10;

/// Size of a CLUT or image block header, which is counted in the block's size field
pub const SUBHEADER_SIZE: u32 = 12;

bitflags! {
	pub struct Flags: u32 {
		const MODE = 0x07;
		const CLUT = 0x08;
	}
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u32)]
pub enum Depth {
	BPP4 = 0,
	BPP8,
	BPP16,
	BPP24,
}

impl Depth {
	/// Maps the 3 bit mode field of the flag word
	pub fn from_mode(mode: u32) -> Option<Depth> {
		match mode {
			0 => Some(Depth::BPP4),
			1 => Some(Depth::BPP8),
			2 => Some(Depth::BPP16),
			3 => Some(Depth::BPP24),
			_ => None,
		}
	}

	pub fn from_bits_per_pixel(bpp: u32) -> Option<Depth> {
		match bpp {
			4 => Some(Depth::BPP4),
			8 => Some(Depth::BPP8),
			16 => Some(Depth::BPP16),
			24 => Some(Depth::BPP24),
			_ => None,
		}
	}

	pub const fn mode(self) -> u32 {
		self as u32
	}

	pub const fn bits_per_pixel(self) -> u32 {
		match self {
			Depth::BPP4 => 4,
			Depth::BPP8 => 8,
			Depth::BPP16 => 16,
			Depth::BPP24 => 24,
		}
	}

	/// Number of palette entries addressable by an index of this depth, if the depth is indexed
	pub const fn palette_len(self) -> Option<usize> {
		match self {
			Depth::BPP4 => Some(16),
			Depth::BPP8 => Some(256),
			_ => None,
		}
	}

	/// Pixel width of an image block whose header stores `width_words` 16 bit words per row.
	/// 24 BPP uses the stored value as-is.
	pub const fn pixel_width(self, width_words: u16) -> usize {
		match self {
			Depth::BPP4 => width_words as usize * 4,
			Depth::BPP8 => width_words as usize * 2,
			Depth::BPP16 | Depth::BPP24 => width_words as usize,
		}
	}

	/// Inverse of [`Depth::pixel_width`], rounding up to whole words
	pub const fn width_words(self, width: usize) -> usize {
		match self {
			Depth::BPP4 => (width + 3) / 4,
			Depth::BPP8 => (width + 1) / 2,
			Depth::BPP16 | Depth::BPP24 => width,
		}
	}

	/// Number of payload bytes holding `width * height` pixels
	pub const fn payload_len(self, width: usize, height: usize) -> usize {
		let pixels = width * height;

		match self {
			Depth::BPP4 => (pixels + 1) / 2,
			Depth::BPP8 => pixels,
			Depth::BPP16 => pixels * 2,
			Depth::BPP24 => pixels * 3,
		}
	}
}

impl fmt::Display for Depth {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{} BPP", self.bits_per_pixel())
	}
}

#[cfg(feature = "import")]
#[derive(Debug, Error)]
pub enum TIMImportError {
	#[error("CLUT block size {0} is smaller than its 12 byte header")]
	ClutSize(u32),
	#[error("Unsupported pixel mode: {0}")]
	Depth(u32),
	#[error("I/O error")]
	IO {
		source: io::Error,
	},
	#[error("Not a PlayStation texture: {0:#x}")]
	Magic(u32),
	#[error("Pixel index {index} is outside of a {len} color palette")]
	PaletteIndex {
		index: u8,
		len: usize,
	},
	#[error("Unexpected end of data")]
	Truncated,
}

#[cfg(feature = "import")]
impl From<io::Error> for TIMImportError {
	fn from(source: io::Error) -> TIMImportError {
		if source.kind() == io::ErrorKind::UnexpectedEof {
			TIMImportError::Truncated
		} else {
			TIMImportError::IO {
				source: source,
			}
		}
	}
}

#[cfg(feature = "export")]
#[derive(Debug, Error)]
pub enum TIMExportError {
	#[error("Only 4 and 8 BPP textures can be written, got {0}")]
	Depth(Depth),
	#[error("Texture of {width}x{height} does not fit in a TIM image block")]
	Dimensions {
		width: usize,
		height: usize,
	},
	#[error("Expected {expected} indices, got {actual}")]
	IndexCount {
		expected: usize,
		actual: usize,
	},
	#[error("Palette index {index} at pixel {pixel} does not fit a {depth} texture")]
	IndexOutOfRange {
		pixel: usize,
		index: u8,
		depth: Depth,
	},
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
}

/// Reads exactly `len` bytes without trusting `len` for the allocation
#[cfg(feature = "import")]
pub(crate) fn read_block<R>(buf: &mut R, len: usize) -> Result<Vec<u8>, TIMImportError>
where
	R: Read,
{
	let mut data = vec![];
	buf.take(len as u64).read_to_end(&mut data)?;

	if data.len() < len {
		debug!("Block needs {} bytes, only {} available", len, data.len());
		return Err(TIMImportError::Truncated);
	}

	Ok(data)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
	pub magic: u32,
	pub flags: Flags,
	pub depth: Depth,
}

impl Header {
	pub fn new(depth: Depth, has_clut: bool) -> Header {
		let mut flags = Flags::from_bits_truncate(depth.mode());
		flags.set(Flags::CLUT, has_clut);

		Header {
			magic: MAGIC,
			flags: flags,
			depth: depth,
		}
	}

	pub fn has_clut(&self) -> bool {
		self.flags.contains(Flags::CLUT)
	}

	#[cfg(feature = "import")]
	pub(crate) fn read<R>(buf: &mut R) -> Result<Header, TIMImportError>
	where
		R: ReadBytesExt,
	{
		let magic = buf.read_u32::<LE>()?;
		if magic != MAGIC {
			return Err(TIMImportError::Magic(magic));
		}

		let flags = Flags::from_bits_truncate(buf.read_u32::<LE>()?);
		let mode = (flags & Flags::MODE).bits();
		let depth = Depth::from_mode(mode).ok_or(TIMImportError::Depth(mode))?;

		Ok(Header {
			magic: magic,
			flags: flags,
			depth: depth,
		})
	}

	#[cfg(feature = "export")]
	pub(crate) fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		buf.write_u32::<LE>(self.magic)?;
		buf.write_u32::<LE>(self.flags.bits())
	}
}

/// Shared header of the CLUT and image blocks
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SubHeader {
	pub size: u32,
	pub x: u16,
	pub y: u16,
	pub width: u16,
	pub height: u16,
}

impl SubHeader {
	#[cfg(feature = "import")]
	pub(crate) fn read<R>(buf: &mut R) -> Result<SubHeader, TIMImportError>
	where
		R: ReadBytesExt,
	{
		Ok(SubHeader {
			size: buf.read_u32::<LE>()?,
			x: buf.read_u16::<LE>()?,
			y: buf.read_u16::<LE>()?,
			width: buf.read_u16::<LE>()?,
			height: buf.read_u16::<LE>()?,
		})
	}

	#[cfg(feature = "export")]
	pub(crate) fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		buf.write_u32::<LE>(self.size)?;
		buf.write_u16::<LE>(self.x)?;
		buf.write_u16::<LE>(self.y)?;
		buf.write_u16::<LE>(self.width)?;
		buf.write_u16::<LE>(self.height)
	}
}

#[derive(Clone, Debug, PartialEq)]
pub enum ImageData {
	/// One palette index per pixel, unpacked for 4 BPP
	Indexed(Vec<u8>),
	BPP16(Vec<u16>),
	BPP24(Vec<Rgb>),
}

impl ImageData {
	#[cfg(feature = "import")]
	fn read<R>(depth: Depth, width: usize, height: usize, buf: &mut R) -> Result<ImageData, TIMImportError>
	where
		R: Read,
	{
		let count = width * height;
		let payload = read_block(buf, depth.payload_len(width, height))?;

		match depth {
			Depth::BPP4 => Ok(ImageData::Indexed(unpack_4bpp(&payload, count))),
			Depth::BPP8 => Ok(ImageData::Indexed(payload)),
			Depth::BPP16 => {
				let mut colors = vec![0; count];

				for (i, c) in payload.chunks_exact(2).enumerate() {
					colors[i] = u16::from_le_bytes([c[0], c[1]]);
				}

				Ok(ImageData::BPP16(colors))
			},
			Depth::BPP24 => {
				let mut rgb = vec![Rgb::BLACK; count];

				for (i, c) in payload.chunks_exact(3).enumerate() {
					rgb[i] = Rgb::new(c[0], c[1], c[2]);
				}

				Ok(ImageData::BPP24(rgb))
			},
		}
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, depth: Depth, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		match self {
			ImageData::Indexed(ref indices) => {
				if depth == Depth::BPP4 {
					buf.write_all(&pack_4bpp(indices))
				} else {
					buf.write_all(indices)
				}
			},
			ImageData::BPP16(ref colors) => {
				for c in colors.iter() {
					buf.write_u16::<LE>(*c)?;
				}

				Ok(())
			},
			ImageData::BPP24(ref rgb) => {
				for c in rgb.iter() {
					buf.write_all(&[c.red, c.green, c.blue])?;
				}

				Ok(())
			},
		}
	}

	/// Size of the data once written for the given depth
	pub fn payload_len(&self, depth: Depth) -> usize {
		match self {
			ImageData::Indexed(ref indices) => depth.payload_len(indices.len(), 1),
			ImageData::BPP16(ref colors) => colors.len() * 2,
			ImageData::BPP24(ref rgb) => rgb.len() * 3,
		}
	}
}

#[derive(Clone, Debug, PartialEq)]
pub struct PSXTexture {
	pub header: Header,
	pub clut: Option<Clut>,
	pub img_header: SubHeader,
	pub data: ImageData,
}

impl PSXTexture {
	pub fn width(&self) -> usize {
		self.header.depth.pixel_width(self.img_header.width)
	}

	pub fn height(&self) -> usize {
		self.img_header.height as usize
	}

	/// Returns the pixel indices of a 4 or 8 BPP texture
	pub fn indices(&self) -> Option<&[u8]> {
		match self.data {
			ImageData::Indexed(ref indices) => Some(indices),
			_ => None,
		}
	}

	#[cfg(feature = "import")]
	pub fn read<R>(buf: &mut R) -> Result<PSXTexture, TIMImportError>
	where
		R: Read,
	{
		let header = Header::read(buf)?;

		let clut = if header.has_clut() {
			Some(Clut::read(buf)?)
		} else {
			None
		};

		let img_header = SubHeader::read(buf)?;
		let width = header.depth.pixel_width(img_header.width);
		let height = img_header.height as usize;

		debug!("TIM header: {}, {}x{} at ({}, {}), CLUT: {}", header.depth, width, height,
			img_header.x, img_header.y, header.has_clut());

		let data = ImageData::read(header.depth, width, height, buf)?;

		Ok(PSXTexture {
			header: header,
			clut: clut,
			img_header: img_header,
			data: data,
		})
	}

	/// Resolves every pixel to 8 bit RGB, using CLUT row `palette` for indexed textures.
	///
	/// Out of range rows fall back to row 0. Indexed textures without a CLUT use a gray ramp.
	#[cfg(feature = "import")]
	pub fn to_rgb(&self, palette: usize) -> Result<RgbImage, TIMImportError> {
		let pixels = match self.data {
			ImageData::Indexed(ref indices) => {
				let ramp;
				let colors = match self.clut {
					Some(ref clut) => clut.row(palette),
					None => {
						ramp = gray_ramp(self.header.depth.palette_len().unwrap_or(256));
						&ramp[..]
					},
				};

				let mut pixels = vec![Rgb::BLACK; indices.len()];

				for (i, index) in indices.iter().enumerate() {
					let c = colors.get(*index as usize).ok_or(TIMImportError::PaletteIndex {
						index: *index,
						len: colors.len(),
					})?;
					pixels[i] = Rgb::from_bgr555(*c);
				}

				pixels
			},
			ImageData::BPP16(ref colors) => colors.iter().map(|c| Rgb::from_bgr555(*c)).collect(),
			ImageData::BPP24(ref rgb) => rgb.clone(),
		};

		Ok(RgbImage {
			width: self.width(),
			height: self.height(),
			pixels: pixels,
		})
	}

	/// Builds a 4 or 8 BPP texture with a single row CLUT from a paletted image.
	///
	/// Rows are padded with index 0 up to a whole number of 16 bit words.
	#[cfg(feature = "export")]
	pub fn from_indexed(image: &IndexedImage, depth: Depth) -> Result<PSXTexture, TIMExportError> {
		let palette_len = depth.palette_len().ok_or(TIMExportError::Depth(depth))?;

		if image.indices.len() != image.width * image.height {
			return Err(TIMExportError::IndexCount {
				expected: image.width * image.height,
				actual: image.indices.len(),
			});
		}

		let width_words = depth.width_words(image.width);
		if width_words > u16::MAX as usize || image.height > u16::MAX as usize {
			return Err(TIMExportError::Dimensions {
				width: image.width,
				height: image.height,
			});
		}

		if let Some(pixel) = image.indices.iter().position(|i| *i as usize >= palette_len) {
			return Err(TIMExportError::IndexOutOfRange {
				pixel: pixel,
				index: image.indices[pixel],
				depth: depth,
			});
		}

		let padded_width = depth.pixel_width(width_words as u16);
		let mut indices = vec![0; padded_width * image.height];

		if image.width > 0 {
			for (y, row) in image.indices.chunks_exact(image.width).enumerate() {
				let start = y * padded_width;
				indices[start..start + image.width].copy_from_slice(row);
			}
		}

		let data = ImageData::Indexed(indices);
		let size = SUBHEADER_SIZE as u64 + data.payload_len(depth) as u64;
		if size > u32::MAX as u64 {
			return Err(TIMExportError::Dimensions {
				width: image.width,
				height: image.height,
			});
		}

		Ok(PSXTexture {
			header: Header::new(depth, true),
			clut: Some(Clut::from_palette(&image.palette, palette_len)),
			img_header: SubHeader {
				size: size as u32,
				x: 0,
				y: 0,
				width: width_words as u16,
				height: image.height as u16,
			},
			data: data,
		})
	}

	#[cfg(feature = "export")]
	pub fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		self.header.write(buf)?;

		if self.header.has_clut() {
			if let Some(ref clut) = self.clut {
				clut.write(buf)?;
			}
		}

		self.img_header.write(buf)?;
		self.data.write(self.header.depth, buf)
	}
}
