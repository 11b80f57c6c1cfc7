//! cvdemo - small image-processing demonstrations.
//!
//! Each subcommand reads an image, applies one transform and writes the
//! result. Output format follows the file extension (png or jpg). `stream`
//! does the same for every frame of a camera, HTTP stream or image folder.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use image::{DynamicImage, GrayImage, RgbImage};
use imageproc::contrast::ThresholdType;
use imageproc::rect::Rect;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use attendance_scanner::config::DEFAULT_SOURCE;
use attendance_scanner::vision::{self, BlurKind, ThresholdSpec};
use attendance_scanner::{
    CameraSource, Controls, FrameSource, FrameStream, SnapshotWriter, SourceConfig,
    StreamTransform,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(name = "cvdemo", about = "Image-processing demonstrations")]
struct Args {
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, global = true, default_value = "auto", value_name = "MODE", value_parser = ui::UiMode::parse)]
    ui: ui::UiMode,

    #[command(subcommand)]
    command: Demo,
}

#[derive(Subcommand, Debug)]
enum Demo {
    /// Re-encode an image (format from the output extension)
    Copy { input: PathBuf, output: PathBuf },
    /// Convert color space
    Convert {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum, default_value = "gray")]
        to: ColorSpace,
    },
    /// Resize to an exact size
    Resize {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = 600)]
        width: u32,
        #[arg(long, default_value_t = 400)]
        height: u32,
    },
    /// Cut out a rectangle
    Crop {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_parser = parse_region, value_name = "X,Y,W,H")]
        region: Rect,
    },
    /// Box, gaussian or median blur
    Blur {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum, default_value = "box")]
        kind: BlurArg,
        /// Odd kernel size
        #[arg(long, default_value_t = 101)]
        kernel: u32,
    },
    /// Binarize a grayscale copy
    Threshold {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_enum, default_value = "fixed")]
        method: ThresholdArg,
        /// Level for fixed/inverted
        #[arg(long, default_value_t = 120)]
        level: u8,
        /// Window size for adaptive
        #[arg(long, default_value_t = 11)]
        block: u32,
        /// Subtracted from the local mean for adaptive
        #[arg(long, default_value_t = 5)]
        offset: i16,
        /// Median-filter the result with a 3x3 window
        #[arg(long)]
        denoise: bool,
    },
    /// Outline dark shapes and their bounding boxes
    Contours {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, default_value_t = 150)]
        level: u8,
        #[arg(long, default_value_t = 200.0)]
        min_area: f64,
    },
    /// Canny edges plus dilated and eroded variants
    Edges {
        input: PathBuf,
        /// Directory for edges.png, dilated.png and eroded.png
        output_dir: PathBuf,
        #[arg(long, default_value_t = 250.0)]
        low: f32,
        #[arg(long, default_value_t = 500.0)]
        high: f32,
    },
    /// Box the area matching a color
    ColorMask {
        input: PathBuf,
        output: PathBuf,
        #[arg(long, value_parser = parse_color, value_name = "R,G,B", default_value = "0,255,0")]
        color: [u8; 3],
        /// Also write the binary mask here
        #[arg(long)]
        mask: Option<PathBuf>,
        /// Flip horizontally first (webcam selfie view)
        #[arg(long)]
        mirror: bool,
    },
    /// Blur rectangular regions
    Anonymize {
        input: PathBuf,
        output: PathBuf,
        #[arg(long = "region", value_parser = parse_region, value_name = "X,Y,W,H", required = true)]
        regions: Vec<Rect>,
        #[arg(long, default_value_t = 50)]
        kernel: u32,
    },
    /// Draw lines, boxes and circles
    Draw {
        output: PathBuf,
        /// Draw on this image instead of a blank canvas
        #[arg(long)]
        background: Option<PathBuf>,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 360)]
        height: u32,
        /// TrueType font for the caption
        #[arg(long)]
        font: Option<PathBuf>,
        #[arg(long, default_value = "attendance-scanner")]
        caption: String,
    },
    /// Transform live frames and write each one as a numbered PNG
    Stream {
        /// Directory for frame_NNNNNN.png outputs
        output_dir: PathBuf,
        /// Device index, /dev/videoN, http(s) URL, stub://name, or image path
        #[arg(long, default_value = DEFAULT_SOURCE)]
        source: String,
        #[arg(long, value_enum, default_value = "passthrough")]
        transform: StreamArg,
        /// Mirror each frame horizontally (webcam selfie view)
        #[arg(long)]
        flip: bool,
        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<u64>,
        #[arg(long, default_value_t = 25)]
        fps: u32,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
        /// Window size for threshold
        #[arg(long, default_value_t = 21)]
        block: u32,
        /// Subtracted from the local mean for threshold
        #[arg(long, default_value_t = 1)]
        offset: i16,
        /// Target for color-box
        #[arg(long, value_parser = parse_color, value_name = "R,G,B", default_value = "0,255,0")]
        color: [u8; 3],
        /// Region for anonymize (repeatable)
        #[arg(long = "region", value_parser = parse_region, value_name = "X,Y,W,H")]
        regions: Vec<Rect>,
        /// Blur kernel for anonymize
        #[arg(long, default_value_t = 50)]
        kernel: u32,
        /// Do not read `q` from the terminal
        #[arg(long)]
        no_keys: bool,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StreamArg {
    Passthrough,
    Gray,
    Threshold,
    ColorBox,
    Anonymize,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ColorSpace {
    Gray,
    Hsv,
    Swap,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BlurArg {
    Box,
    Gaussian,
    Median,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ThresholdArg {
    Fixed,
    Inverted,
    Otsu,
    Adaptive,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(
        args.ui,
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    match args.command {
        Demo::Copy { input, output } => {
            let image = load(&ui, &input)?;
            save_rgb(&ui, &image, &output)?;
        }
        Demo::Convert { input, output, to } => {
            let image = load(&ui, &input)?;
            let _stage = ui.stage("Convert");
            match to {
                ColorSpace::Gray => save_gray(&ui, &vision::to_gray(&image), &output)?,
                ColorSpace::Hsv => save_rgb(&ui, &vision::to_hsv(&image), &output)?,
                ColorSpace::Swap => save_rgb(&ui, &vision::swap_channels(&image), &output)?,
            }
        }
        Demo::Resize {
            input,
            output,
            width,
            height,
        } => {
            let image = load(&ui, &input)?;
            let resized = vision::resize(&image, width, height)?;
            println!(
                "before: {}x{}  after: {}x{}",
                image.width(),
                image.height(),
                resized.width(),
                resized.height()
            );
            save_rgb(&ui, &resized, &output)?;
        }
        Demo::Crop {
            input,
            output,
            region,
        } => {
            let image = load(&ui, &input)?;
            let cropped = vision::crop(
                &image,
                non_negative(region.left())?,
                non_negative(region.top())?,
                region.width(),
                region.height(),
            )?;
            save_rgb(&ui, &cropped, &output)?;
        }
        Demo::Blur {
            input,
            output,
            kind,
            kernel,
        } => {
            let image = load(&ui, &input)?;
            let kind = match kind {
                BlurArg::Box => BlurKind::Box,
                BlurArg::Gaussian => BlurKind::Gaussian,
                BlurArg::Median => BlurKind::Median,
            };
            let blurred = {
                let _stage = ui.stage(&format!("{:?} blur, kernel {}", kind, kernel));
                vision::blur(&image, kind, kernel)?
            };
            save_rgb(&ui, &blurred, &output)?;
        }
        Demo::Threshold {
            input,
            output,
            method,
            level,
            block,
            offset,
            denoise,
        } => {
            let gray = vision::to_gray(&load(&ui, &input)?);
            let spec = match method {
                ThresholdArg::Fixed => ThresholdSpec::Fixed {
                    level,
                    kind: ThresholdType::Binary,
                },
                ThresholdArg::Inverted => ThresholdSpec::Fixed {
                    level,
                    kind: ThresholdType::BinaryInverted,
                },
                ThresholdArg::Otsu => ThresholdSpec::Otsu,
                ThresholdArg::Adaptive => ThresholdSpec::AdaptiveMean { block, offset },
            };
            let is_otsu = matches!(spec, ThresholdSpec::Otsu);
            let (used, mut binary) = {
                let mut stage = ui.stage("Threshold");
                let result = vision::apply_threshold(&gray, spec)?;
                stage.detail(format!("level {}", result.0));
                result
            };
            if denoise {
                binary = imageproc::filter::median_filter(&binary, 1, 1);
            }
            if is_otsu {
                println!("otsu level: {}", used);
            }
            save_gray(&ui, &binary, &output)?;
        }
        Demo::Contours {
            input,
            output,
            level,
            min_area,
        } => {
            let mut image = load(&ui, &input)?;
            let regions = {
                let mut stage = ui.stage("Find contours");
                let regions = vision::find_regions(&vision::to_gray(&image), level, min_area);
                stage.detail(format!("{} region(s)", regions.len()));
                regions
            };
            for region in &regions {
                println!(
                    "area {:>8.1}  box {},{} {}x{}",
                    region.area,
                    region.bounds.left(),
                    region.bounds.top(),
                    region.bounds.width(),
                    region.bounds.height()
                );
            }
            vision::draw_regions(&mut image, &regions);
            save_rgb(&ui, &image, &output)?;
        }
        Demo::Edges {
            input,
            output_dir,
            low,
            high,
        } => {
            let gray = vision::to_gray(&load(&ui, &input)?);
            let maps = {
                let _stage = ui.stage("Canny + morphology");
                vision::edge_maps(&gray, low, high)?
            };
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("create {}", output_dir.display()))?;
            save_gray(&ui, &maps.edges, &output_dir.join("edges.png"))?;
            save_gray(&ui, &maps.dilated, &output_dir.join("dilated.png"))?;
            save_gray(&ui, &maps.eroded, &output_dir.join("eroded.png"))?;
        }
        Demo::ColorMask {
            input,
            output,
            color,
            mask,
            mirror,
        } => {
            let mut image = load(&ui, &input)?;
            if mirror {
                image::imageops::flip_horizontal_in_place(&mut image);
            }
            if let Some(mask_path) = &mask {
                save_gray(&ui, &vision::color_mask(&image, color), mask_path)?;
            }
            match vision::highlight_color(&mut image, color) {
                Some(bounds) => println!(
                    "match: {},{} {}x{}",
                    bounds.left(),
                    bounds.top(),
                    bounds.width(),
                    bounds.height()
                ),
                None => println!("no pixels match {:?}", color),
            }
            save_rgb(&ui, &image, &output)?;
        }
        Demo::Anonymize {
            input,
            output,
            regions,
            kernel,
        } => {
            let mut image = load(&ui, &input)?;
            let blurred = {
                let _stage = ui.stage("Blur regions");
                vision::anonymize(&mut image, &regions, kernel)
            };
            println!("blurred {} of {} region(s)", blurred, regions.len());
            save_rgb(&ui, &image, &output)?;
        }
        Demo::Draw {
            output,
            background,
            width,
            height,
            font,
            caption,
        } => {
            let mut image = match &background {
                Some(path) => load(&ui, path)?,
                None => RgbImage::from_pixel(width, height, image::Rgb([255, 255, 255])),
            };
            let font = match &font {
                Some(path) => Some(load_font(path)?),
                None => None,
            };
            vision::draw_test_card(&mut image, font.as_ref(), &caption);
            save_rgb(&ui, &image, &output)?;
        }
        Demo::Stream {
            output_dir,
            source,
            transform,
            flip,
            max_frames,
            fps,
            width,
            height,
            block,
            offset,
            color,
            regions,
            kernel,
            no_keys,
        } => {
            let transform = match transform {
                StreamArg::Passthrough => StreamTransform::Passthrough,
                StreamArg::Gray => StreamTransform::Gray,
                StreamArg::Threshold => StreamTransform::Threshold { block, offset },
                StreamArg::ColorBox => StreamTransform::ColorBox { target: color },
                StreamArg::Anonymize => StreamTransform::Anonymize { regions, kernel },
            };
            transform.validate()?;

            let mut camera = CameraSource::new(SourceConfig {
                url: source.clone(),
                target_fps: fps,
                width,
                height,
            })?;
            {
                let _stage = ui.stage(&format!("Open {}", source));
                camera
                    .connect()
                    .with_context(|| format!("could not open source {}", source))?;
            }
            let controls = if no_keys {
                Controls::headless().with_ctrlc()?
            } else {
                Controls::interactive()?
            };
            let writer = SnapshotWriter::create(&output_dir)?;
            let summary = FrameStream::new(camera, transform, writer)
                .with_flip(flip)
                .with_max_frames(max_frames)
                .with_controls(controls)
                .run()?;
            println!("{}", summary);
        }
    }
    Ok(())
}

fn load(ui: &ui::Ui, path: &Path) -> Result<RgbImage> {
    let mut stage = ui.stage("Load image");
    let image = image::open(path)
        .with_context(|| format!("read image {}", path.display()))?
        .into_rgb8();
    stage.detail(format!("{}x{}", image.width(), image.height()));
    Ok(image)
}

fn save_rgb(ui: &ui::Ui, image: &RgbImage, path: &Path) -> Result<()> {
    let _stage = ui.stage(&format!("Write {}", path.display()));
    image
        .save(path)
        .with_context(|| format!("write image {}", path.display()))
}

fn save_gray(ui: &ui::Ui, image: &GrayImage, path: &Path) -> Result<()> {
    let _stage = ui.stage(&format!("Write {}", path.display()));
    DynamicImage::ImageLuma8(image.clone())
        .save(path)
        .with_context(|| format!("write image {}", path.display()))
}

fn load_font(path: &Path) -> Result<ab_glyph::FontVec> {
    let bytes = std::fs::read(path).with_context(|| format!("read font {}", path.display()))?;
    ab_glyph::FontVec::try_from_vec(bytes)
        .map_err(|e| anyhow!("invalid font {}: {}", path.display(), e))
}

fn non_negative(value: i32) -> Result<u32> {
    u32::try_from(value).map_err(|_| anyhow!("coordinates must be non-negative, got {}", value))
}

fn parse_numbers<const N: usize>(value: &str) -> Result<[i64; N], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(format!("expected {} comma-separated numbers, got '{}'", N, value));
    }
    let mut out = [0i64; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part
            .parse()
            .map_err(|_| format!("'{}' is not a whole number", part))?;
    }
    Ok(out)
}

fn parse_region(value: &str) -> Result<Rect, String> {
    let [x, y, w, h] = parse_numbers::<4>(value)?;
    let coord = |v: i64| i32::try_from(v).map_err(|_| format!("{} is out of range", v));
    let size = |v: i64| match u32::try_from(v) {
        Ok(v) if v > 0 => Ok(v),
        _ => Err(format!("region size must be positive, got {}", v)),
    };
    Ok(Rect::at(coord(x)?, coord(y)?).of_size(size(w)?, size(h)?))
}

fn parse_color(value: &str) -> Result<[u8; 3], String> {
    let channels = parse_numbers::<3>(value)?;
    let mut out = [0u8; 3];
    for (slot, channel) in out.iter_mut().zip(channels) {
        *slot = u8::try_from(channel).map_err(|_| format!("{} is not in 0..=255", channel))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regions_and_colors_parse() {
        let rect = parse_region("56, 200, 394, 400").unwrap();
        assert_eq!((rect.left(), rect.top(), rect.width(), rect.height()), (56, 200, 394, 400));
        assert!(parse_region("1,2,3").is_err());
        assert!(parse_region("1,2,0,4").is_err());
        assert_eq!(parse_color("0,255,0").unwrap(), [0, 255, 0]);
        assert!(parse_color("0,256,0").is_err());
    }

    #[test]
    fn cli_parses_subcommands() {
        let args = Args::try_parse_from([
            "cvdemo", "blur", "in.png", "out.png", "--kind", "median", "--kernel", "5",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Demo::Blur {
                kind: BlurArg::Median,
                kernel: 5,
                ..
            }
        ));
        assert!(Args::try_parse_from(["cvdemo", "anonymize", "in.png", "out.png"]).is_err());
    }

    #[test]
    fn stream_defaults_match_live_threshold_demo() {
        let args = Args::try_parse_from([
            "cvdemo", "stream", "frames/", "--source", "stub://cam", "--transform", "threshold",
            "--flip",
        ])
        .unwrap();
        match args.command {
            Demo::Stream {
                source,
                transform,
                flip,
                block,
                offset,
                max_frames,
                ..
            } => {
                assert_eq!(source, "stub://cam");
                assert!(matches!(transform, StreamArg::Threshold));
                assert!(flip);
                assert_eq!((block, offset), (21, 1));
                assert_eq!(max_frames, None);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
