//! Animation encoding
//!
//! GIF is encoded in-process with the `image` crate. Animated WebP goes
//! through ffmpeg/libwebp, fed from a private staging directory per job so
//! concurrent jobs never share frame files.

use crate::formats::AnimationFormat;
use crate::service::AnimationEncoder;
use crate::tools::{summarize_output, ToolCommand};
use dds_shared::{ConfigError, JobError};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, Frame, RgbaImage};
use std::ffi::OsString;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FFMPEG: &str = "ffmpeg";

const WEBP_QUALITY: &str = "85";
const WEBP_COMPRESSION_LEVEL: &str = "6";

pub struct FrameEncoder {
    ffmpeg: Option<ToolCommand>,
}

impl FrameEncoder {
    /// Encoder without ffmpeg; WebP jobs fail with `ToolNotFound`.
    pub fn gif_only() -> Self {
        Self { ffmpeg: None }
    }

    pub fn with_ffmpeg(ffmpeg: ToolCommand) -> Self {
        Self {
            ffmpeg: Some(ffmpeg),
        }
    }

    /// Resolves what `format` needs up front, so a missing ffmpeg stops the
    /// run before any job starts.
    pub fn discover(format: AnimationFormat) -> Result<Self, ConfigError> {
        if !format.needs_ffmpeg() {
            return Ok(Self::gif_only());
        }
        let path = which::which(FFMPEG).map_err(|_| ConfigError::ToolNotFound {
            tool: FFMPEG.to_string(),
            hint: "animated WebP needs ffmpeg with libwebp on PATH (or use --animation-format gif)"
                .to_string(),
        })?;
        debug!(path = %path.display(), "Found ffmpeg");
        Ok(Self::with_ffmpeg(ToolCommand::new(FFMPEG, path)))
    }
}

impl AnimationEncoder for FrameEncoder {
    fn encode(
        &self,
        frames: &[PathBuf],
        delay_ms: u32,
        format: AnimationFormat,
        output: &Path,
    ) -> Result<(), JobError> {
        let images = load_frames(frames)?;
        match format {
            AnimationFormat::Gif => encode_gif(images, delay_ms, output),
            AnimationFormat::Webp => {
                let ffmpeg = self.ffmpeg.as_ref().ok_or_else(|| JobError::ToolNotFound {
                    tool: FFMPEG.to_string(),
                })?;
                encode_webp(ffmpeg, &images, delay_ms, output)
            }
        }
    }
}

/// Decodes every frame to RGBA. All frames must match the first one's size.
pub fn load_frames(frames: &[PathBuf]) -> Result<Vec<RgbaImage>, JobError> {
    let first = frames.first().ok_or(JobError::EmptySequence)?;
    let mut images = Vec::with_capacity(frames.len());
    let mut expected = None;

    for path in frames {
        let image = image::open(path)
            .map_err(|e| JobError::image(path, e))?
            .to_rgba8();
        let size = image.dimensions();
        match expected {
            None => expected = Some(size),
            Some(expected) if expected != size => {
                debug!(first = %first.display(), "Frame size differs from first frame");
                return Err(JobError::FrameSizeMismatch {
                    path: path.clone(),
                    expected,
                    actual: size,
                });
            }
            Some(_) => {}
        }
        images.push(image);
    }

    Ok(images)
}

/// Looping GIF with the same delay on every frame.
pub fn encode_gif(frames: Vec<RgbaImage>, delay_ms: u32, output: &Path) -> Result<(), JobError> {
    if frames.is_empty() {
        return Err(JobError::EmptySequence);
    }

    let file = File::create(output).map_err(|e| JobError::io(output, e))?;
    let mut writer = BufWriter::new(file);
    {
        let mut encoder = GifEncoder::new(&mut writer);
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| JobError::image(output, e))?;
        let delay = Delay::from_numer_denom_ms(delay_ms, 1);
        encoder
            .encode_frames(
                frames
                    .into_iter()
                    .map(|buffer| Frame::from_parts(buffer, 0, 0, delay)),
            )
            .map_err(|e| JobError::image(output, e))?;
    }
    writer.flush().map_err(|e| JobError::io(output, e))
}

fn webp_arguments(pattern: &Path, delay_ms: u32, output: &Path) -> Vec<OsString> {
    vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-framerate".into(),
        format!("1000/{}", delay_ms).into(),
        "-i".into(),
        pattern.as_os_str().to_owned(),
        "-c:v".into(),
        "libwebp".into(),
        "-lossless".into(),
        "0".into(),
        "-compression_level".into(),
        WEBP_COMPRESSION_LEVEL.into(),
        "-q:v".into(),
        WEBP_QUALITY.into(),
        "-loop".into(),
        "0".into(),
        output.as_os_str().to_owned(),
    ]
}

/// Animated WebP with alpha through ffmpeg. Frames are restaged as
/// `frame_%04d.png` so ffmpeg's image2 demuxer sees a gapless sequence.
pub fn encode_webp(
    ffmpeg: &ToolCommand,
    frames: &[RgbaImage],
    delay_ms: u32,
    output: &Path,
) -> Result<(), JobError> {
    if frames.is_empty() {
        return Err(JobError::EmptySequence);
    }

    let staging = tempfile::Builder::new()
        .prefix("dds-converter-frames-")
        .tempdir()
        .map_err(|e| JobError::io(std::env::temp_dir(), e))?;

    for (index, frame) in frames.iter().enumerate() {
        let path = staging.path().join(format!("frame_{:04}.png", index));
        frame.save(&path).map_err(|e| JobError::image(&path, e))?;
    }

    let pattern = staging.path().join("frame_%04d.png");
    let run = ffmpeg.run(webp_arguments(&pattern, delay_ms, output))?;
    if !run.success {
        return Err(JobError::ToolFailed {
            tool: FFMPEG.to_string(),
            exit_code: run.exit_code,
            stderr: summarize_output(&run.stderr),
        });
    }
    if !output.exists() {
        return Err(JobError::MissingOutput {
            path: output.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifDecoder;
    use image::{AnimationDecoder, Rgba};
    use std::io::BufReader;
    use tempfile::TempDir;

    fn write_frame(dir: &Path, name: &str, size: (u32, u32), shade: u8) -> PathBuf {
        let path = dir.join(name);
        RgbaImage::from_pixel(size.0, size.1, Rgba([shade, 0, 255 - shade, 255]))
            .save(&path)
            .unwrap();
        path
    }

    #[test]
    fn test_gif_of_three_frames() {
        let temp = TempDir::new().unwrap();
        let frames: Vec<PathBuf> = (0..3)
            .map(|i| write_frame(temp.path(), &format!("anim_{}.png", i), (4, 4), i * 100))
            .collect();
        let output = temp.path().join("anim.gif");

        FrameEncoder::gif_only()
            .encode(&frames, 100, AnimationFormat::Gif, &output)
            .unwrap();

        let decoder = GifDecoder::new(BufReader::new(File::open(&output).unwrap())).unwrap();
        let decoded = decoder.into_frames().collect_frames().unwrap();
        assert_eq!(decoded.len(), 3);
        assert_eq!(decoded[0].buffer().dimensions(), (4, 4));
        let (numer, denom) = decoded[1].delay().numer_denom_ms();
        assert_eq!(numer / denom, 100);
    }

    #[test]
    fn test_frame_size_mismatch() {
        let temp = TempDir::new().unwrap();
        let frames = vec![
            write_frame(temp.path(), "a_1.png", (4, 4), 0),
            write_frame(temp.path(), "a_2.png", (8, 4), 0),
        ];
        let err = load_frames(&frames).unwrap_err();
        match err {
            JobError::FrameSizeMismatch { expected, actual, .. } => {
                assert_eq!(expected, (4, 4));
                assert_eq!(actual, (8, 4));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_sequence() {
        assert!(matches!(load_frames(&[]), Err(JobError::EmptySequence)));
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            encode_gif(Vec::new(), 100, &temp.path().join("x.gif")),
            Err(JobError::EmptySequence)
        ));
    }

    #[test]
    fn test_undecodable_frame() {
        let temp = TempDir::new().unwrap();
        let bogus = temp.path().join("bogus_1.png");
        std::fs::write(&bogus, b"not a png").unwrap();
        assert!(matches!(load_frames(&[bogus]), Err(JobError::Image { .. })));
    }

    #[test]
    fn test_webp_without_ffmpeg() {
        let temp = TempDir::new().unwrap();
        let frames = vec![write_frame(temp.path(), "a_1.png", (2, 2), 0)];
        let err = FrameEncoder::gif_only()
            .encode(&frames, 100, AnimationFormat::Webp, &temp.path().join("a.webp"))
            .unwrap_err();
        assert!(matches!(err, JobError::ToolNotFound { .. }));
    }

    #[test]
    fn test_webp_arguments() {
        let args = webp_arguments(Path::new("/tmp/s/frame_%04d.png"), 40, Path::new("/out/a.webp"));
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        let framerate = args.iter().position(|a| a == "-framerate").unwrap();
        assert_eq!(args[framerate + 1], "1000/40");
        assert_eq!(args.last().unwrap(), "/out/a.webp");
        assert!(args.windows(2).any(|w| w == ["-loop", "0"]));
    }

    #[cfg(unix)]
    #[test]
    fn test_webp_with_fake_ffmpeg() {
        let temp = TempDir::new().unwrap();
        let script = temp.path().join("fake_ffmpeg.sh");
        // Checks the staged frames exist, then writes the last argument.
        std::fs::write(
            &script,
            "for a; do last=\"$a\"; done\n\
             for a; do case \"$a\" in *frame_%04d.png) dir=$(dirname \"$a\") ;; esac; done\n\
             [ -f \"$dir/frame_0001.png\" ] || exit 7\n\
             printf 'RIFF' > \"$last\"\n",
        )
        .unwrap();
        let ffmpeg = ToolCommand::with_launcher(FFMPEG, "sh", &script);

        let frames = vec![
            write_frame(temp.path(), "a_1.png", (2, 2), 0),
            write_frame(temp.path(), "a_2.png", (2, 2), 9),
        ];
        let output = temp.path().join("a.webp");
        FrameEncoder::with_ffmpeg(ffmpeg)
            .encode(&frames, 100, AnimationFormat::Webp, &output)
            .unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"RIFF");
    }
}
