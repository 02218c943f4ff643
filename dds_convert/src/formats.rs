//! Output and animation formats

use dds_shared::ConfigError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Target of a DDS conversion. The requested name is kept as the output
/// extension, so `jpg` and `jpeg` stay distinct on disk.
///
/// Parsed from the command line through [`FromStr`], case-insensitively and
/// with an optional leading dot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Png,
    Jpg,
    Jpeg,
    Bmp,
    Tga,
    Dds,
    Tiff,
    Hdr,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 8] = [
        OutputFormat::Png,
        OutputFormat::Jpg,
        OutputFormat::Jpeg,
        OutputFormat::Bmp,
        OutputFormat::Tga,
        OutputFormat::Dds,
        OutputFormat::Tiff,
        OutputFormat::Hdr,
    ];

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Png => "png",
            OutputFormat::Jpg => "jpg",
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Bmp => "bmp",
            OutputFormat::Tga => "tga",
            OutputFormat::Dds => "dds",
            OutputFormat::Tiff => "tiff",
            OutputFormat::Hdr => "hdr",
        }
    }

    /// Value passed to `texconv -ft`. texconv names its output after the
    /// canonical type, so `jpeg` and `tiff` are written as `.jpg` and `.tif`.
    pub fn texconv_file_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "jpg",
            OutputFormat::Tiff => "tif",
            other => other.extension(),
        }
    }

    /// Value passed to `texconv -f`. Radiance HDR needs a float target.
    pub fn pixel_format(self) -> &'static str {
        match self {
            OutputFormat::Hdr => "R32G32B32A32_FLOAT",
            _ => "R8G8B8A8_UNORM",
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().trim_start_matches('.').to_lowercase();
        OutputFormat::ALL
            .into_iter()
            .find(|f| f.extension() == wanted)
            .ok_or_else(|| ConfigError::UnsupportedFormat(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AnimationFormat {
    Gif,
    Webp,
}

impl AnimationFormat {
    pub fn extension(self) -> &'static str {
        match self {
            AnimationFormat::Gif => "gif",
            AnimationFormat::Webp => "webp",
        }
    }

    /// Whether encoding needs ffmpeg on PATH.
    pub fn needs_ffmpeg(self) -> bool {
        matches!(self, AnimationFormat::Webp)
    }
}

impl fmt::Display for AnimationFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for AnimationFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_lowercase().as_str() {
            "gif" => Ok(AnimationFormat::Gif),
            "webp" => Ok(AnimationFormat::Webp),
            _ => Err(ConfigError::UnsupportedAnimationFormat(s.to_string())),
        }
    }
}
