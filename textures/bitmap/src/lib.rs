use byteorder::{
	BE,
	LE,
	ReadBytesExt,
	WriteBytesExt
};

use log::debug;

use std::{
	fs,
	io::{
		self,
		Read
	},
	path::Path
};

use thiserror::Error;

use timkit_core::{
	tag2,
	texture::{
		IndexedImage,
		Rgb,
		RgbImage
	}
};

pub const FILE_HEADER_SIZE: u32 = 14;
pub const HEADER_SIZE: u32 = 40;
pub const NUM_COLOR_PANES: u16 = 1;

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u16)]
pub enum Magic {
	OS2BitmapArray = tag2!(b"BA"),
	Windows = tag2!(b"BM"),
	OS2ColorIcon = tag2!(b"CI"),
	OS2ColorPointer = tag2!(b"CP"),
	OS2Icon = tag2!(b"IC"),
	OS2Pointer = tag2!(b"PT"),
}

impl Magic {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<Magic, BitmapImportError>
	where
		R: ReadBytesExt,
	{
		let magic = buf.read_u16::<BE>()?;
		match magic {
			0x4241 => Ok(Magic::OS2BitmapArray),
			0x424D => Ok(Magic::Windows),
			0x4349 => Ok(Magic::OS2ColorIcon),
			0x4350 => Ok(Magic::OS2ColorPointer),
			0x4943 => Ok(Magic::OS2Icon),
			0x5054 => Ok(Magic::OS2Pointer),
			_ => Err(BitmapImportError::Magic(magic)),
		}
	}

	#[cfg(feature = "export")]
	fn write<W>(self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		buf.write_u16::<BE>(self as u16)
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Header {
	pub magic: Magic,
	pub size: u32,
	reserved6: u16, // safe to be 0
	reserved8: u16, // safe to be 0
	pub pixel_offset: u32,
}

impl Header {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<Header, BitmapImportError>
	where
		R: ReadBytesExt,
	{
		Ok(Header {
			magic: Magic::read(buf)?,
			size: buf.read_u32::<LE>()?,
			reserved6: buf.read_u16::<LE>()?,
			reserved8: buf.read_u16::<LE>()?,
			pixel_offset: buf.read_u32::<LE>()?,
		})
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		self.magic.write(buf)?;
		buf.write_u32::<LE>(self.size)?;
		buf.write_u16::<LE>(self.reserved6)?;
		buf.write_u16::<LE>(self.reserved8)?;
		buf.write_u32::<LE>(self.pixel_offset)
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(u32)]
pub enum Compression {
	RGB = 0,
	RLE8,
	RLE4,
	Huffman1D,
	JPEG,
	PNG,
	AlphaBitfields,
	CMYK = 11,
	CMYKRLE8,
	CMYKRLE4,
}

impl Compression {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<Compression, BitmapImportError>
	where
		R: ReadBytesExt,
	{
		let cmp = buf.read_u32::<LE>()?;
		match cmp {
			0 => Ok(Compression::RGB),
			1 => Ok(Compression::RLE8),
			2 => Ok(Compression::RLE4),
			3 => Ok(Compression::Huffman1D),
			4 => Ok(Compression::JPEG),
			5 => Ok(Compression::PNG),
			6 => Ok(Compression::AlphaBitfields),
			11 => Ok(Compression::CMYK),
			12 => Ok(Compression::CMYKRLE8),
			13 => Ok(Compression::CMYKRLE4),
			_ => Err(BitmapImportError::Compression(cmp)),
		}
	}

	#[cfg(feature = "export")]
	fn write<W>(self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		buf.write_u32::<LE>(self as u32)
	}
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InfoHeader {
	pub header_size: u32, // 40, or larger for V4/V5 headers
	pub width: i32,
	pub height: i32, // negative for top-down rows
	pub num_color_panes: u16, // should be 1
	pub bpp: u16,
	pub compression: Compression,
	pub img_size: u32,
	pub h_res: i32,
	pub v_res: i32,
	pub num_colors_used: u32, // defaults to 0 for power of 2
	pub num_important_colors: u32, // ignored, should be 0
}

impl InfoHeader {
	#[cfg(feature = "import")]
	fn read<R>(buf: &mut R) -> Result<InfoHeader, BitmapImportError>
	where
		R: ReadBytesExt,
	{
		let header_size = buf.read_u32::<LE>()?;
		if header_size < HEADER_SIZE {
			return Err(BitmapImportError::HeaderSize(header_size));
		}

		let info = InfoHeader {
			header_size: header_size,
			width: buf.read_i32::<LE>()?,
			height: buf.read_i32::<LE>()?,
			num_color_panes: buf.read_u16::<LE>()?,
			bpp: buf.read_u16::<LE>()?,
			compression: Compression::read(buf)?,
			img_size: buf.read_u32::<LE>()?,
			h_res: buf.read_i32::<LE>()?,
			v_res: buf.read_i32::<LE>()?,
			num_colors_used: buf.read_u32::<LE>()?,
			num_important_colors: buf.read_u32::<LE>()?,
		};

		// V4/V5 color space fields
		skip(buf, (header_size - HEADER_SIZE) as u64)?;

		Ok(info)
	}

	#[cfg(feature = "export")]
	fn write<W>(&self, buf: &mut W) -> io::Result<()>
	where
		W: WriteBytesExt,
	{
		buf.write_u32::<LE>(HEADER_SIZE)?;
		buf.write_i32::<LE>(self.width)?;
		buf.write_i32::<LE>(self.height)?;
		buf.write_u16::<LE>(self.num_color_panes)?;
		buf.write_u16::<LE>(self.bpp)?;
		self.compression.write(buf)?;
		buf.write_u32::<LE>(self.img_size)?;
		buf.write_i32::<LE>(self.h_res)?;
		buf.write_i32::<LE>(self.v_res)?;
		buf.write_u32::<LE>(self.num_colors_used)?;
		buf.write_u32::<LE>(self.num_important_colors)
	}

	/// Bytes per row, including the padding to a 4 byte boundary
	pub fn stride(&self) -> usize {
		((self.width.unsigned_abs() as usize * self.bpp as usize + 31) / 32) * 4
	}
}

#[cfg(feature = "import")]
fn skip<R>(buf: &mut R, len: u64) -> io::Result<()>
where
	R: Read,
{
	if io::copy(&mut buf.take(len), &mut io::sink())? < len {
		return Err(io::ErrorKind::UnexpectedEof.into());
	}

	Ok(())
}

/// Pixel rows, always stored top to bottom
#[derive(Clone, Debug, PartialEq)]
pub enum Pixels {
	Indexed(Vec<u8>),
	Rgb(Vec<Rgb>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct Bitmap {
	pub header: Header,
	pub info_header: InfoHeader,
	pub palette: Vec<Rgb>,
	pub pixels: Pixels,
}

impl Bitmap {
	pub fn width(&self) -> usize {
		self.info_header.width.unsigned_abs() as usize
	}

	pub fn height(&self) -> usize {
		self.info_header.height.unsigned_abs() as usize
	}

	/// Reads an uncompressed 4, 8, 24 or 32 BPP bitmap
	#[cfg(feature = "import")]
	pub fn read<R>(buf: &mut R) -> Result<Bitmap, BitmapImportError>
	where
		R: ReadBytesExt,
	{
		let header = Header::read(buf)?;
		let info_h = InfoHeader::read(buf)?;

		if info_h.compression != Compression::RGB {
			return Err(BitmapImportError::Compression(info_h.compression as u32));
		}

		let mut palette = vec![];

		if info_h.bpp <= 8 {
			let num_colors = match info_h.num_colors_used {
				0 => 1 << info_h.bpp,
				n => n as usize,
			};

			if num_colors > 256 {
				return Err(BitmapImportError::PaletteSize(info_h.num_colors_used));
			}

			for _ in 0..num_colors {
				let c = buf.read_u32::<LE>()?;
				palette.push(Rgb::new((c >> 16) as u8, (c >> 8) as u8, c as u8));
			}
		}

		let consumed = (FILE_HEADER_SIZE + info_h.header_size) as u64 + palette.len() as u64 * 4;
		skip(buf, (header.pixel_offset as u64).saturating_sub(consumed))?;

		let width = info_h.width.unsigned_abs() as usize;
		let height = info_h.height.unsigned_abs() as usize;
		let stride = info_h.stride();

		debug!("BMP: {}x{} {} BPP, {} palette entries", width, height, info_h.bpp, palette.len());

		let mut rows = vec![];

		// the row length comes from the header, so it only bounds the read
		for _ in 0..height {
			let mut row = vec![];
			buf.by_ref().take(stride as u64).read_to_end(&mut row)?;

			if row.len() < stride {
				return Err(BitmapImportError::Truncated {
					expected: stride,
					actual: row.len(),
				});
			}

			rows.push(row);
		}

		// bottom-up unless the height is negative
		if info_h.height > 0 {
			rows.reverse();
		}

		let pixels = match info_h.bpp {
			4 => {
				let mut indices = vec![0; width * height];

				for (y, r) in rows.iter().enumerate() {
					for x in 0..width {
						let byte = r[x / 2];
						indices[y * width + x] = if x & 1 == 0 { byte >> 4 } else { byte & 0x0F };
					}
				}

				Pixels::Indexed(indices)
			},
			8 => {
				let mut indices = vec![0; width * height];

				for (y, r) in rows.iter().enumerate() {
					indices[y * width..(y + 1) * width].copy_from_slice(&r[..width]);
				}

				Pixels::Indexed(indices)
			},
			24 | 32 => {
				let step = info_h.bpp as usize / 8;
				let mut rgb = vec![Rgb::BLACK; width * height];

				for (y, r) in rows.iter().enumerate() {
					for x in 0..width {
						let mut px = &r[x * step..];
						let c = px.read_u24::<LE>()?;
						rgb[y * width + x] = Rgb::new((c >> 16) as u8, (c >> 8) as u8, c as u8);
					}
				}

				Pixels::Rgb(rgb)
			},
			bpp => return Err(BitmapImportError::Depth(bpp)),
		};

		Ok(Bitmap {
			header: header,
			info_header: info_h,
			palette: palette,
			pixels: pixels,
		})
	}

	/// Creates a new [`Bitmap`] object with a bit depth of 24
	#[cfg(feature = "export")]
	pub fn new_24bpp(tex: &RgbImage) -> Result<Bitmap, BitmapExportError> {
		if tex.width > i32::MAX as usize || tex.height > i32::MAX as usize {
			return Err(BitmapExportError::Dimensions {
				width: tex.width,
				height: tex.height,
			});
		}

		let mut info_header = InfoHeader {
			header_size: HEADER_SIZE,
			width: tex.width as i32,
			height: tex.height as i32,
			num_color_panes: NUM_COLOR_PANES,
			bpp: 24,
			compression: Compression::RGB,
			img_size: 0,

			// not sure how to handle these yet
			h_res: 0,
			v_res: 0,

			num_colors_used: 0,
			num_important_colors: 0,
		};

		let img_size = info_header.stride() as u64 * tex.height as u64;
		if img_size > (u32::MAX - FILE_HEADER_SIZE - HEADER_SIZE) as u64 {
			return Err(BitmapExportError::Dimensions {
				width: tex.width,
				height: tex.height,
			});
		}
		info_header.img_size = img_size as u32;

		Ok(Bitmap {
			header: Header {
				magic: Magic::Windows,
				size: info_header.img_size + FILE_HEADER_SIZE + HEADER_SIZE,
				reserved6: 0,
				reserved8: 0,
				pixel_offset: FILE_HEADER_SIZE + HEADER_SIZE,
			},
			info_header: info_header,
			palette: vec![],
			pixels: Pixels::Rgb(tex.pixels.clone()),
		})
	}

	/// Writes a 24 BPP bitmap, bottom row first
	#[cfg(feature = "export")]
	pub fn write<W>(&self, buf: &mut W) -> Result<(), BitmapExportError>
	where
		W: WriteBytesExt,
	{
		let rgb = match self.pixels {
			Pixels::Rgb(ref rgb) => rgb,
			Pixels::Indexed(_) => return Err(BitmapExportError::Indexed),
		};

		self.header.write(buf)?;
		self.info_header.write(buf)?;

		let width = self.width();
		let padding = vec![0; self.info_header.stride() - width * 3];

		for y in (0..self.height()).rev() {
			for x in 0..width {
				buf.write_u24::<LE>(rgb[(y * width) + x].to_rgb888())?;
			}
			buf.write_all(&padding)?;
		}

		Ok(())
	}

	/// Returns the image as palette indices, if the bitmap is paletted
	pub fn to_indexed(&self) -> Option<IndexedImage> {
		match self.pixels {
			Pixels::Indexed(ref indices) => Some(IndexedImage {
				width: self.width(),
				height: self.height(),
				palette: self.palette.clone(),
				indices: indices.clone(),
			}),
			Pixels::Rgb(_) => None,
		}
	}

	pub fn to_rgb(&self) -> RgbImage {
		match self.pixels {
			Pixels::Indexed(ref indices) => IndexedImage {
				width: self.width(),
				height: self.height(),
				palette: self.palette.clone(),
				indices: indices.clone(),
			}.to_rgb(),
			Pixels::Rgb(ref rgb) => RgbImage {
				width: self.width(),
				height: self.height(),
				pixels: rgb.clone(),
			},
		}
	}
}

#[cfg(feature = "import")]
pub fn read_bmp<P>(filepath: P) -> Result<Bitmap, BitmapImportError>
where
	P: AsRef<Path>,
{
	let data = fs::read(filepath)?;
	Bitmap::read(&mut data.as_slice())
}

#[cfg(feature = "export")]
pub fn write_bmp<P>(filepath: P, image: &RgbImage) -> Result<(), BitmapExportError>
where
	P: AsRef<Path>,
{
	let bmp = Bitmap::new_24bpp(image)?;
	let mut data = Vec::with_capacity(bmp.header.size as usize);
	bmp.write(&mut data)?;
	fs::write(filepath, data)?;
	Ok(())
}

#[cfg(feature = "import")]
#[derive(Error, Debug)]
pub enum BitmapImportError {
	#[error("Unknown/unsupported compression method: {0}")]
	Compression(u32),
	#[error("Unsupported bit depth: {0}")]
	Depth(u16),
	#[error("Header size too small: expected at least 40, got {0}")]
	HeaderSize(u32),
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("Not a BMP file: {0:X}")]
	Magic(u16),
	#[error("Palette of {0} colors is too large")]
	PaletteSize(u32),
	#[error("Pixel row needs {expected} bytes, only {actual} available")]
	Truncated {
		expected: usize,
		actual: usize,
	},
}

#[cfg(feature = "export")]
#[derive(Error, Debug)]
pub enum BitmapExportError {
	#[error("Image of {width}x{height} is too large for a bitmap")]
	Dimensions {
		width: usize,
		height: usize,
	},
	#[error("Only 24 BPP bitmaps can be written")]
	Indexed,
	#[error("I/O error")]
	IO {
		#[from]
		source: io::Error,
	},
}
