//! Output Path Mapping
//!
//! Maps every input file to a path under the output root, keeping the
//! directory layout relative to the input root minus the first
//! `strip_segments` components, and swapping the extension.
//!
//! ```text
//! input/icons/weapons/sword.dds  --strip 0-->  output/icons/weapons/sword.png
//! input/icons/weapons/sword.dds  --strip 1-->  output/weapons/sword.png
//! ```

use crate::app_error::ConfigError;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathMapping {
    input_root: PathBuf,
    output_root: PathBuf,
    strip_segments: usize,
}

impl PathMapping {
    pub fn new(input_root: &Path, output_root: &Path, strip_segments: usize) -> Self {
        Self {
            input_root: absolute_or_self(input_root),
            output_root: absolute_or_self(output_root),
            strip_segments,
        }
    }

    pub fn input_root(&self) -> &Path {
        &self.input_root
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn strip_segments(&self) -> usize {
        self.strip_segments
    }

    /// Path components of `file` relative to the input root.
    fn relative_components<'a>(&self, file: &'a Path) -> Vec<Component<'a>> {
        let relative = file.strip_prefix(&self.input_root).unwrap_or(file);
        relative
            .components()
            .filter(|c| matches!(c, Component::Normal(_)))
            .collect()
    }

    /// Output path for `file` with its extension replaced by `extension`.
    ///
    /// Fails when stripping would remove the file name itself.
    pub fn map(&self, file: &Path, extension: &str) -> Result<PathBuf, ConfigError> {
        let components = self.relative_components(file);

        if self.strip_segments >= components.len() {
            return Err(ConfigError::StripSegmentsOutOfRange {
                strip: self.strip_segments,
                available: components.len(),
                path: file.to_path_buf(),
            });
        }

        let mut output = self.output_root.clone();
        for component in &components[self.strip_segments..] {
            output.push(component);
        }
        output.set_extension(extension);
        Ok(output)
    }
}

fn absolute_or_self(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

/// Rejects a plan where two sources share an output, or an output would
/// overwrite one of the sources.
pub fn check_output_collisions<'a, I>(pairs: I) -> Result<(), ConfigError>
where
    I: IntoIterator<Item = (&'a Path, &'a Path)>,
{
    let pairs: Vec<(&Path, &Path)> = pairs.into_iter().collect();
    let mut seen: HashMap<&Path, &Path> = HashMap::with_capacity(pairs.len());

    for &(source, output) in &pairs {
        if source == output {
            return Err(ConfigError::OverwritesInput {
                path: source.to_path_buf(),
            });
        }
        if let Some(first) = seen.insert(output, source) {
            return Err(ConfigError::OutputCollision {
                output: output.to_path_buf(),
                first: first.to_path_buf(),
                second: source.to_path_buf(),
            });
        }
    }

    Ok(())
}
