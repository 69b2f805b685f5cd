pub mod clut;
pub mod pixels;
pub mod tim;

use log::debug;

use std::{
	fs,
	io::{
		self,
		Read
	}
};

use timkit_core::texture::{
	IndexedImage,
	Rgb,
	RgbImage
};

use clut::Clut;
use tim::*;

/// A decoded texture along with what a viewer needs to offer palette switching
#[derive(Clone, Debug, PartialEq)]
pub struct DecodedTim {
	pub depth: Depth,
	/// Number of selectable CLUT rows, 0 without a CLUT
	pub palette_rows: usize,
	/// Per-pixel palette indices for 4 and 8 BPP textures
	pub indices: Option<Vec<u8>>,
	pub image: RgbImage,
}

/// Header summary of a TIM file, read without touching the pixel data
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimInfo {
	pub depth: Depth,
	pub clut: Option<SubHeader>,
	pub palette_rows: usize,
	pub image: SubHeader,
	pub width: usize,
	pub height: usize,
}

/// Decodes a TIM held in memory, resolving indexed pixels through CLUT row `palette`
#[cfg(feature = "import")]
pub fn decode_tim(data: &[u8], palette: usize) -> Result<DecodedTim, TIMImportError> {
	let tex = PSXTexture::read(&mut &data[..])?;
	let image = tex.to_rgb(palette)?;

	Ok(DecodedTim {
		depth: tex.header.depth,
		palette_rows: tex.clut.as_ref().map_or(0, |c| c.num_rows()),
		indices: tex.indices().map(|i| i.to_vec()),
		image: image,
	})
}

#[cfg(feature = "import")]
pub fn read_tim(filepath: &str, palette: usize) -> Result<DecodedTim, TIMImportError> {
	let input = fs::read(filepath)?;
	decode_tim(&input, palette)
}

#[cfg(feature = "import")]
pub fn inspect_tim(data: &[u8]) -> Result<TimInfo, TIMImportError> {
	let mut buf = &data[..];
	let header = Header::read(&mut buf)?;

	let mut clut = None;
	let mut palette_rows = 0;

	if header.has_clut() {
		let clut_header = SubHeader::read(&mut buf)?;
		if clut_header.size < SUBHEADER_SIZE {
			return Err(TIMImportError::ClutSize(clut_header.size));
		}

		let len = (clut_header.size - SUBHEADER_SIZE) as u64;
		if io::copy(&mut (&mut buf).take(len), &mut io::sink())? < len {
			return Err(TIMImportError::Truncated);
		}

		palette_rows = Clut::layout((len / 2) as usize, clut_header.width).1;
		clut = Some(clut_header);
	}

	let image = SubHeader::read(&mut buf)?;

	Ok(TimInfo {
		depth: header.depth,
		clut: clut,
		palette_rows: palette_rows,
		image: image,
		width: header.depth.pixel_width(image.width),
		height: image.height as usize,
	})
}

/// Returns CLUT row `row` as 8 bit colors, or nothing if the file has no CLUT
#[cfg(feature = "import")]
pub fn palette_preview(data: &[u8], row: usize) -> Result<Vec<Rgb>, TIMImportError> {
	let mut buf = &data[..];
	let header = Header::read(&mut buf)?;

	if !header.has_clut() {
		return Ok(vec![]);
	}

	Ok(Clut::read(&mut buf)?.colors(row))
}

/// Encodes a paletted image as a 4 or 8 BPP TIM, returning the complete file
#[cfg(feature = "export")]
pub fn encode_tim(image: &IndexedImage, depth: Depth) -> Result<Vec<u8>, TIMExportError> {
	let tex = PSXTexture::from_indexed(image, depth)?;

	let mut out = Vec::with_capacity(8 + tex.img_header.size as usize +
		tex.clut.as_ref().map_or(0, |c| c.header.size as usize));
	tex.write(&mut out)?;

	debug!("Encoded {}x{} {} TIM, {} bytes", image.width, image.height, depth, out.len());
	Ok(out)
}

/// Encodes a truecolor image as a 4 or 8 BPP TIM. Images with more colors than the depth can
/// address are quantized to a 16 or 256 color adaptive palette first.
#[cfg(feature = "export")]
pub fn encode_rgb_tim(image: &RgbImage, depth: Depth) -> Result<Vec<u8>, TIMExportError> {
	let palette_len = depth.palette_len().ok_or(TIMExportError::Depth(depth))?;
	let indexed = IndexedImage::reduce(image, palette_len);

	debug!("{}x{} image reduced to {} colors", image.width, image.height, indexed.palette.len());
	encode_tim(&indexed, depth)
}

/// Encodes first, then writes the whole file in one go
#[cfg(feature = "export")]
pub fn write_tim(filepath: &str, image: &IndexedImage, depth: Depth) -> Result<(), TIMExportError> {
	let data = encode_tim(image, depth)?;
	fs::write(filepath, data)?;
	Ok(())
}
