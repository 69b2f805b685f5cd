use argh::FromArgs;

use image::ImageFormat;

use log::{
	error,
	info
};

use rayon::iter::{
	IntoParallelRefIterator,
	ParallelIterator
};

use std::{
	fs,
	io::{
		self,
		Cursor
	},
	path::{
		Path,
		PathBuf
	},
	process::ExitCode
};

use thiserror::Error;

use timkit_core::texture::{
	IndexedImage,
	Rgb,
	RgbImage,
	TextureError
};

use timkit_textures_bitmap::{
	read_bmp,
	write_bmp,
	BitmapExportError,
	BitmapImportError
};

use timkit_textures_playstation::{
	decode_tim,
	encode_rgb_tim,
	encode_tim,
	inspect_tim,
	palette_preview,
	tim::{
		Depth,
		TIMExportError,
		TIMImportError
	}
};

#[derive(Debug, Error)]
enum ConvertError {
	#[error("{failed} of {total} files failed")]
	Batch {
		failed: usize,
		total: usize,
	},
	#[error(transparent)]
	BitmapExport(#[from] BitmapExportError),
	#[error(transparent)]
	BitmapImport(#[from] BitmapImportError),
	#[error("Unsupported bit depth {0}, expected 4 or 8")]
	Depth(u32),
	#[error("Image of {width}x{height} cannot be stored as PNG")]
	Dimensions {
		width: usize,
		height: usize,
	},
	#[error(transparent)]
	Export(#[from] TIMExportError),
	#[error(transparent)]
	Image(#[from] image::ImageError),
	#[error(transparent)]
	Import(#[from] TIMImportError),
	#[error("I/O error: {source}")]
	IO {
		#[from]
		source: io::Error,
	},
	#[error("No file name in {0}")]
	Path(PathBuf),
	#[error(transparent)]
	Texture(#[from] TextureError),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum OutputFormat {
	Bmp,
	Png,
}

/// A conversion source. Paletted BMPs keep their palette.
enum Source {
	Indexed(IndexedImage),
	Rgb(RgbImage),
}

#[derive(FromArgs, Debug)]
/// Inspect and convert PlayStation TIM textures
struct TopLevel {
	#[argh(subcommand)]
	command: Commands,
}

#[derive(FromArgs, Debug)]
#[argh(subcommand)]
enum Commands {
	Info(InfoCmd),
	Palette(PaletteCmd),
	ToBmp(ToBmpCmd),
	ToPng(ToPngCmd),
	ToTim(ToTimCmd),
}

#[derive(FromArgs, Debug)]
/// Print the header summary of TIM files
#[argh(subcommand, name = "info")]
struct InfoCmd {
	/// TIM files to inspect
	#[argh(positional)]
	files: Vec<PathBuf>,
}

#[derive(FromArgs, Debug)]
/// Print one CLUT row of a TIM file as hex colors
#[argh(subcommand, name = "palette")]
struct PaletteCmd {
	/// TIM file
	#[argh(positional)]
	file: PathBuf,

	/// CLUT row to show [default: 0]
	#[argh(option, default = "0")]
	row: usize,
}

#[derive(FromArgs, Debug)]
/// Convert TIM files to 24 bit BMP
#[argh(subcommand, name = "to-bmp")]
struct ToBmpCmd {
	/// TIM files to convert
	#[argh(positional)]
	files: Vec<PathBuf>,

	/// CLUT row used for indexed textures [default: 0]
	#[argh(option, default = "0")]
	row: usize,

	/// output directory [default: next to each input]
	#[argh(option)]
	out: Option<PathBuf>,
}

#[derive(FromArgs, Debug)]
/// Convert TIM files to PNG
#[argh(subcommand, name = "to-png")]
struct ToPngCmd {
	/// TIM files to convert
	#[argh(positional)]
	files: Vec<PathBuf>,

	/// CLUT row used for indexed textures [default: 0]
	#[argh(option, default = "0")]
	row: usize,

	/// output directory [default: next to each input]
	#[argh(option)]
	out: Option<PathBuf>,
}

#[derive(FromArgs, Debug)]
/// Convert BMP, PNG or JPEG files to 4 or 8 BPP TIM, reducing the colors when needed
#[argh(subcommand, name = "to-tim")]
struct ToTimCmd {
	/// image files to convert
	#[argh(positional)]
	files: Vec<PathBuf>,

	/// target bits per pixel, 4 or 8 [default: 8]
	#[argh(option, default = "8")]
	bpp: u32,

	/// output directory [default: next to each input]
	#[argh(option)]
	out: Option<PathBuf>,
}

fn main() -> ExitCode {
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

	let cli: TopLevel = argh::from_env();

	let result = match cli.command {
		Commands::Info(cmd) => run_batch(&cmd.files, print_info),
		Commands::Palette(cmd) => print_palette(&cmd.file, cmd.row),
		Commands::ToBmp(cmd) => {
			let out = cmd.out.as_deref();
			run_batch(&cmd.files, |path| tim_to_image(path, cmd.row, out, OutputFormat::Bmp).map(|target| {
				info!("{} -> {}", path.display(), target.display());
			}))
		},
		Commands::ToPng(cmd) => {
			let out = cmd.out.as_deref();
			run_batch(&cmd.files, |path| tim_to_image(path, cmd.row, out, OutputFormat::Png).map(|target| {
				info!("{} -> {}", path.display(), target.display());
			}))
		},
		Commands::ToTim(cmd) => match Depth::from_bits_per_pixel(cmd.bpp) {
			Some(depth) if depth.palette_len().is_some() => {
				let out = cmd.out.as_deref();
				run_batch(&cmd.files, |path| image_to_tim(path, depth, out).map(|target| {
					info!("{} -> {}", path.display(), target.display());
				}))
			},
			_ => Err(ConvertError::Depth(cmd.bpp)),
		},
	};

	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("{}", e);
			ExitCode::FAILURE
		},
	}
}

/// Runs `op` over every file in parallel, carrying on past failures
fn run_batch<F>(files: &[PathBuf], op: F) -> Result<(), ConvertError>
where
	F: Fn(&Path) -> Result<(), ConvertError> + Sync,
{
	let failed = files.par_iter()
		.filter(|path| match op(path) {
			Ok(()) => false,
			Err(e) => {
				error!("{}: {}", path.display(), e);
				true
			},
		})
		.count();

	if files.len() > 1 {
		info!("{} of {} files done", files.len() - failed, files.len());
	}

	if failed > 0 {
		return Err(ConvertError::Batch {
			failed: failed,
			total: files.len(),
		});
	}

	Ok(())
}

fn output_path(path: &Path, out: Option<&Path>, extension: &str) -> Result<PathBuf, ConvertError> {
	let target = path.with_extension(extension);

	match out {
		Some(dir) => {
			let name = target.file_name().ok_or_else(|| ConvertError::Path(path.to_path_buf()))?;
			Ok(dir.join(name))
		},
		None => Ok(target),
	}
}

fn print_info(path: &Path) -> Result<(), ConvertError> {
	let info = inspect_tim(&fs::read(path)?)?;

	let mut report = format!("{}\n  depth: {}\n  size: {}x{} ({} words per row)\n  origin: ({}, {})\n",
		path.display(), info.depth, info.width, info.height, info.image.width, info.image.x, info.image.y);

	match info.clut {
		Some(clut) => report.push_str(&format!("  CLUT: {} rows, {}x{} at ({}, {})", info.palette_rows,
			clut.width, clut.height, clut.x, clut.y)),
		None => report.push_str("  CLUT: none"),
	}

	println!("{}", report);
	Ok(())
}

fn print_palette(path: &Path, row: usize) -> Result<(), ConvertError> {
	let colors = palette_preview(&fs::read(path)?, row)?;

	if colors.is_empty() {
		println!("{}: no CLUT", path.display());
		return Ok(());
	}

	for (i, chunk) in colors.chunks(16).enumerate() {
		let swatches: Vec<String> = chunk.iter().map(|c| c.hex_rgb()).collect();
		println!("{:3}: {}", i * 16, swatches.join(" "));
	}

	Ok(())
}

fn tim_to_image(path: &Path, row: usize, out: Option<&Path>, format: OutputFormat) -> Result<PathBuf, ConvertError> {
	let tim = decode_tim(&fs::read(path)?, row)?;

	let target = match format {
		OutputFormat::Bmp => {
			let target = output_path(path, out, "bmp")?;
			write_bmp(&target, &tim.image)?;
			target
		},
		OutputFormat::Png => {
			let target = output_path(path, out, "png")?;
			fs::write(&target, encode_png(&tim.image)?)?;
			target
		},
	};

	Ok(target)
}

fn encode_png(tex: &RgbImage) -> Result<Vec<u8>, ConvertError> {
	let dimensions = ConvertError::Dimensions {
		width: tex.width,
		height: tex.height,
	};

	if tex.width > u32::MAX as usize || tex.height > u32::MAX as usize {
		return Err(dimensions);
	}

	let buffer = image::RgbImage::from_raw(tex.width as u32, tex.height as u32, tex.to_rgb8())
		.ok_or(dimensions)?;

	let mut data = Cursor::new(vec![]);
	buffer.write_to(&mut data, ImageFormat::Png)?;
	Ok(data.into_inner())
}

/// Decodes any image format the `image` crate was built with into 8 bit RGB
fn decode_image(data: &[u8]) -> Result<RgbImage, ConvertError> {
	let rgb = image::load_from_memory(data)?.to_rgb8();
	let pixels = rgb.pixels().map(|p| Rgb::new(p[0], p[1], p[2])).collect();

	Ok(RgbImage::new(rgb.width() as usize, rgb.height() as usize, pixels)?)
}

fn read_source(path: &Path) -> Result<Source, ConvertError> {
	let is_bmp = path.extension().map_or(false, |e| e.eq_ignore_ascii_case("bmp"));

	if !is_bmp {
		return Ok(Source::Rgb(decode_image(&fs::read(path)?)?));
	}

	let bmp = read_bmp(path)?;

	match bmp.to_indexed() {
		Some(image) => Ok(Source::Indexed(image)),
		None => Ok(Source::Rgb(bmp.to_rgb())),
	}
}

/// Keeps the palette of a paletted source when its indices fit `depth`, otherwise the colors are
/// reduced to an adaptive palette
fn encode_source(source: Source, depth: Depth) -> Result<Vec<u8>, ConvertError> {
	let palette_len = depth.palette_len().ok_or(ConvertError::Depth(depth.bits_per_pixel()))?;

	let data = match source {
		Source::Indexed(ref image) if image.indices.iter().all(|i| (*i as usize) < palette_len) => {
			encode_tim(image, depth)?
		},
		Source::Indexed(image) => encode_rgb_tim(&image.to_rgb(), depth)?,
		Source::Rgb(image) => encode_rgb_tim(&image, depth)?,
	};

	Ok(data)
}

fn image_to_tim(path: &Path, depth: Depth, out: Option<&Path>) -> Result<PathBuf, ConvertError> {
	let data = encode_source(read_source(path)?, depth)?;

	let target = output_path(path, out, "tim")?;
	fs::write(&target, data)?;
	Ok(target)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_output_path() {
		let path = Path::new("textures/FACE.TIM");
		assert_eq!(output_path(path, None, "bmp").unwrap(), PathBuf::from("textures/FACE.bmp"));
		assert_eq!(output_path(path, Some(Path::new("out")), "bmp").unwrap(), PathBuf::from("out/FACE.bmp"));
		assert!(matches!(output_path(Path::new(".."), Some(Path::new("out")), "bmp"), Err(ConvertError::Path(_))));
	}

	#[test]
	fn test_batch_counts_failures() {
		let files = vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")];
		let result = run_batch(&files, |path| {
			if path == Path::new("b") {
				Err(ConvertError::Depth(2))
			} else {
				Ok(())
			}
		});

		assert!(matches!(result, Err(ConvertError::Batch { failed: 1, total: 3 })));
		assert!(run_batch(&files[..1], |_| Ok(())).is_ok());
	}

	fn gradient(width: usize, height: usize) -> RgbImage {
		let pixels = (0..width * height).map(|i| Rgb::new((i * 8) as u8, (i * 3) as u8, 255 - (i as u8))).collect();
		RgbImage::new(width, height, pixels).unwrap()
	}

	#[test]
	fn test_png_round_trip() {
		let image = gradient(5, 3);
		let png = encode_png(&image).unwrap();

		assert_eq!(&png[1..4], b"PNG");
		assert_eq!(decode_image(&png).unwrap(), image);
	}

	#[test]
	fn test_tim_to_png() {
		let palette = vec![Rgb::new(248, 0, 0), Rgb::new(0, 248, 0), Rgb::new(0, 0, 248)];
		let indexed = IndexedImage::new(4, 2, palette, vec![0, 1, 2, 0, 2, 1, 0, 1]).unwrap();
		let tim = decode_tim(&encode_tim(&indexed, Depth::BPP4).unwrap(), 0).unwrap();

		let back = decode_image(&encode_png(&tim.image).unwrap()).unwrap();
		assert_eq!(back, indexed.to_rgb());
	}

	#[test]
	fn test_truecolor_source_reduced() {
		// 64 colors into 16
		let data = encode_source(Source::Rgb(gradient(8, 8)), Depth::BPP4).unwrap();
		let tim = decode_tim(&data, 0).unwrap();

		assert_eq!((tim.image.width, tim.image.height), (8, 8));
		assert!(tim.indices.unwrap().iter().all(|i| *i < 16));
	}

	#[test]
	fn test_indexed_source() {
		let palette: Vec<Rgb> = (0..32u8).map(|i| Rgb::new(i * 8, 0, 0)).collect();

		// fits 4 BPP, palette kept as is
		let small = IndexedImage::new(4, 1, palette.clone(), vec![0, 3, 15, 1]).unwrap();
		let tim = decode_tim(&encode_source(Source::Indexed(small), Depth::BPP4).unwrap(), 0).unwrap();
		assert_eq!(tim.indices, Some(vec![0, 3, 15, 1]));

		// index 31 needs 8 BPP, so 4 BPP goes through the quantizer
		let wide = IndexedImage::new(4, 1, palette, vec![0, 31, 15, 1]).unwrap();
		assert!(encode_source(Source::Indexed(wide.clone()), Depth::BPP4).is_ok());
		let tim = decode_tim(&encode_source(Source::Indexed(wide), Depth::BPP8).unwrap(), 0).unwrap();
		assert_eq!(tim.indices, Some(vec![0, 31, 15, 1]));

		assert!(matches!(encode_source(Source::Rgb(gradient(1, 1)), Depth::BPP16), Err(ConvertError::Depth(16))));
	}
}
