use color_quant::NeuQuant;

use thiserror::Error;

use crate::{
	scale5to8,
	scale8to5
};

/// Largest palette an [`IndexedImage`] may carry.
pub const MAX_PALETTE_LEN: usize = 256;

// textures are small, so every pixel is sampled
const QUANTIZE_SAMPLE_FACTOR: i32 = 1;

#[derive(Debug, Error, PartialEq)]
pub enum TextureError {
	#[error("Expected {expected} pixels for the given dimensions, got {actual}")]
	PixelCount {
		expected: usize,
		actual: usize,
	},
	#[error("Palette has {0} colors, at most 256 are allowed")]
	PaletteSize(usize),
}

#[derive(Clone, Copy, Debug, Default, Eq, Hash, PartialEq)]
pub struct Rgb {
	pub red: u8,
	pub green: u8,
	pub blue: u8,
}

impl Rgb {
	pub const BLACK: Rgb = Rgb::new(0, 0, 0);

	pub const fn new(red: u8, green: u8, blue: u8) -> Rgb {
		Rgb {
			red: red,
			green: green,
			blue: blue,
		}
	}

	/// Expands a packed PlayStation color (5 bits per channel, red in the low bits).
	/// The semi-transparency bit is ignored.
	pub const fn from_bgr555(color: u16) -> Rgb {
		Rgb {
			red: scale5to8((color & 31) as u8),
			green: scale5to8(((color >> 5) & 31) as u8),
			blue: scale5to8(((color >> 10) & 31) as u8),
		}
	}

	/// Packs into a PlayStation color, truncating each channel to 5 bits. Bit 15 is always clear.
	pub const fn to_bgr555(&self) -> u16 {
		(scale8to5(self.red) as u16) | (scale8to5(self.green) as u16) << 5 |
			(scale8to5(self.blue) as u16) << 10
	}

	pub fn to_rgb888(&self) -> u32 {
		(self.red as u32) << 16 | (self.green as u32) << 8 | self.blue as u32
	}

	/// Returns a textual hex representation in the form of `#rrggbb`
	pub fn hex_rgb(&self) -> String {
		format!("#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
	}
}

/// A truecolor image, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct RgbImage {
	pub width: usize,
	pub height: usize,
	pub pixels: Vec<Rgb>,
}

impl RgbImage {
	pub fn new(width: usize, height: usize, pixels: Vec<Rgb>) -> Result<RgbImage, TextureError> {
		if pixels.len() != width * height {
			return Err(TextureError::PixelCount {
				expected: width * height,
				actual: pixels.len(),
			});
		}

		Ok(RgbImage {
			width: width,
			height: height,
			pixels: pixels,
		})
	}

	pub fn pixel(&self, x: usize, y: usize) -> Option<Rgb> {
		if x >= self.width {
			return None;
		}

		self.pixels.get((y * self.width) + x).copied()
	}

	/// Flattens the image into `r, g, b` byte triples
	pub fn to_rgb8(&self) -> Vec<u8> {
		let mut out = vec![0; self.pixels.len() * 3];

		for (i, c) in self.pixels.iter().enumerate() {
			out[i * 3] = c.red;
			out[i * 3 + 1] = c.green;
			out[i * 3 + 2] = c.blue;
		}

		out
	}

	/// Flattens the image into `r, g, b, a` byte quads using a constant alpha
	pub fn to_rgba8(&self, alpha: u8) -> Vec<u8> {
		let mut out = vec![0; self.pixels.len() * 4];

		for (i, c) in self.pixels.iter().enumerate() {
			out[i * 4] = c.red;
			out[i * 4 + 1] = c.green;
			out[i * 4 + 2] = c.blue;
			out[i * 4 + 3] = alpha;
		}

		out
	}
}

/// A paletted image with one palette index per pixel, row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct IndexedImage {
	pub width: usize,
	pub height: usize,
	pub palette: Vec<Rgb>,
	pub indices: Vec<u8>,
}

impl IndexedImage {
	pub fn new(width: usize, height: usize, palette: Vec<Rgb>, indices: Vec<u8>) -> Result<IndexedImage, TextureError> {
		if palette.len() > MAX_PALETTE_LEN {
			return Err(TextureError::PaletteSize(palette.len()));
		}

		if indices.len() != width * height {
			return Err(TextureError::PixelCount {
				expected: width * height,
				actual: indices.len(),
			});
		}

		Ok(IndexedImage {
			width: width,
			height: height,
			palette: palette,
			indices: indices,
		})
	}

	/// Builds an exact palette from a truecolor image, in first-seen order.
	/// Returns `None` when the image has more than 256 distinct colors.
	pub fn from_rgb(image: &RgbImage) -> Option<IndexedImage> {
		let mut palette = vec![];
		let mut indices = vec![0; image.pixels.len()];

		for (i, c) in image.pixels.iter().enumerate() {
			let index = match find_palette_index(&palette, c) {
				Some(index) => index,
				None => {
					if palette.len() == MAX_PALETTE_LEN {
						return None;
					}

					palette.push(*c);
					palette.len() - 1
				}
			};

			indices[i] = index as u8;
		}

		Some(IndexedImage {
			width: image.width,
			height: image.height,
			palette: palette,
			indices: indices,
		})
	}

	/// Builds a palette of at most `max_colors` entries. Images that already fit keep their exact
	/// colors, anything else goes through [`IndexedImage::quantize`].
	pub fn reduce(image: &RgbImage, max_colors: usize) -> IndexedImage {
		let max_colors = max_colors.clamp(1, MAX_PALETTE_LEN);

		match IndexedImage::from_rgb(image) {
			Some(indexed) if indexed.palette.len() <= max_colors => indexed,
			_ => IndexedImage::quantize(image, max_colors),
		}
	}

	/// Reduces a truecolor image to an adaptive palette of exactly `colors` entries (at most 256)
	/// with a NeuQuant network.
	pub fn quantize(image: &RgbImage, colors: usize) -> IndexedImage {
		let colors = colors.clamp(1, MAX_PALETTE_LEN);
		let rgba = image.to_rgba8(0xFF);
		let nq = NeuQuant::new(QUANTIZE_SAMPLE_FACTOR, colors, &rgba);

		let palette = nq.color_map_rgb()
			.chunks_exact(3)
			.map(|c| Rgb::new(c[0], c[1], c[2]))
			.collect();

		let indices = rgba.chunks_exact(4)
			.map(|px| nq.index_of(px) as u8)
			.collect();

		IndexedImage {
			width: image.width,
			height: image.height,
			palette: palette,
			indices: indices,
		}
	}

	/// Returns the (X, Y) coordinates of every instance of a specified palette index
	pub fn find_indices(&self, index: u8) -> Vec<(usize, usize)> {
		let mut found = vec![];

		for y in 0..self.height {
			for x in 0..self.width {
				if self.indices[(y * self.width) + x] == index {
					found.push((x, y));
				}
			}
		}

		found
	}

	/// Uses the palette and indices to build a truecolor image.
	/// Indices past the end of the palette resolve to black.
	pub fn to_rgb(&self) -> RgbImage {
		RgbImage {
			width: self.width,
			height: self.height,
			pixels: self.indices.iter()
				.map(|i| self.palette.get(*i as usize).copied().unwrap_or(Rgb::BLACK))
				.collect(),
		}
	}
}

/// Returns the index of the specified color, if present
pub fn find_palette_index(palette: &[Rgb], color: &Rgb) -> Option<usize> {
	palette.iter().position(|c| c == color)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_bgr555_expand() {
		assert_eq!(Rgb::from_bgr555(0x0000), Rgb::BLACK);
		assert_eq!(Rgb::from_bgr555(0x7FFF), Rgb::new(248, 248, 248));
		assert_eq!(Rgb::from_bgr555(0x001F), Rgb::new(248, 0, 0));
		assert_eq!(Rgb::from_bgr555(0x03E0), Rgb::new(0, 248, 0));
		assert_eq!(Rgb::from_bgr555(0x7C00), Rgb::new(0, 0, 248));
		// STP bit does not leak into any channel
		assert_eq!(Rgb::from_bgr555(0x8000), Rgb::BLACK);
	}

	#[test]
	fn test_bgr555_round_trip() {
		for c in 0..0x8000u16 {
			assert_eq!(Rgb::from_bgr555(c).to_bgr555(), c);
		}
	}

	#[test]
	fn test_quantize_bound() {
		for v in (0..=255u8).step_by(3) {
			let c = Rgb::new(v, 255 - v, v / 2);
			let back = Rgb::from_bgr555(c.to_bgr555());
			assert!(c.red - back.red <= 7);
			assert!(c.green - back.green <= 7);
			assert!(c.blue - back.blue <= 7);
		}
		assert_eq!(Rgb::new(255, 255, 255).to_bgr555() & 0x8000, 0);
	}

	#[test]
	fn test_hex_rgb() {
		assert_eq!(Rgb::new(8, 0xA0, 0xFF).hex_rgb(), "#08a0ff");
	}

	#[test]
	fn test_indexed_dimensions() {
		let err = IndexedImage::new(2, 2, vec![Rgb::BLACK], vec![0; 3]).unwrap_err();
		assert_eq!(err, TextureError::PixelCount { expected: 4, actual: 3 });
		assert!(IndexedImage::new(1, 1, vec![Rgb::BLACK; 257], vec![0]).is_err());
	}

	#[test]
	fn test_from_rgb() {
		let red = Rgb::new(255, 0, 0);
		let blue = Rgb::new(0, 0, 255);
		let img = RgbImage::new(3, 1, vec![red, blue, red]).unwrap();
		let indexed = IndexedImage::from_rgb(&img).unwrap();

		assert_eq!(indexed.palette, vec![red, blue]);
		assert_eq!(indexed.indices, vec![0, 1, 0]);
		assert_eq!(indexed.find_indices(0), vec![(0, 0), (2, 0)]);
		assert_eq!(indexed.to_rgb(), img);
	}

	#[test]
	fn test_from_rgb_too_many_colors() {
		let pixels = (0..257u32).map(|i| Rgb::new(i as u8, (i >> 8) as u8, 0)).collect();
		let img = RgbImage::new(257, 1, pixels).unwrap();
		assert!(IndexedImage::from_rgb(&img).is_none());
	}

	fn red_ramp(count: u32) -> RgbImage {
		let pixels = (0..count).map(|i| Rgb::new((i * 255 / (count - 1)) as u8, (i >> 8) as u8, 0)).collect();
		RgbImage::new(count as usize, 1, pixels).unwrap()
	}

	#[test]
	fn test_reduce_keeps_exact_palette() {
		let img = red_ramp(16);
		let indexed = IndexedImage::reduce(&img, 16);

		assert_eq!(indexed.palette.len(), 16);
		assert_eq!(indexed.to_rgb(), img);
	}

	#[test]
	fn test_reduce_to_16_colors() {
		let img = red_ramp(17);
		assert_eq!(IndexedImage::from_rgb(&img).unwrap().palette.len(), 17);

		let indexed = IndexedImage::reduce(&img, 16);
		assert_eq!(indexed.palette.len(), 16);
		assert_eq!(indexed.indices.len(), 17);
		assert!(indexed.indices.iter().all(|i| *i < 16));
	}

	#[test]
	fn test_reduce_to_256_colors() {
		let pixels: Vec<Rgb> = (0..300u32).map(|i| Rgb::new(i as u8, (i >> 8) as u8 * 128, (i * 7) as u8)).collect();
		let img = RgbImage::new(20, 15, pixels).unwrap();
		assert!(IndexedImage::from_rgb(&img).is_none());

		let indexed = IndexedImage::reduce(&img, 256);
		assert_eq!((indexed.width, indexed.height), (20, 15));
		assert_eq!(indexed.palette.len(), 256);
		assert_eq!(indexed.indices.len(), 300);
		assert!(IndexedImage::new(20, 15, indexed.palette.clone(), indexed.indices.clone()).is_ok());
	}

	#[test]
	fn test_flatten() {
		let img = RgbImage::new(1, 1, vec![Rgb::new(1, 2, 3)]).unwrap();
		assert_eq!(img.to_rgb8(), vec![1, 2, 3]);
		assert_eq!(img.to_rgba8(255), vec![1, 2, 3, 255]);
		assert_eq!(img.pixel(0, 0), Some(Rgb::new(1, 2, 3)));
		assert_eq!(img.pixel(1, 0), None);
	}
}
