//! Frame sequence grouping
//!
//! `walk_01.png`, `walk_02.png`, ... `walk_12.png` in one directory form the
//! sequence `walk`. Frames are ordered by the integer value of the suffix, so
//! `walk_9` comes before `walk_10` regardless of zero padding. Only the stem
//! is looked at, so `walk_3.dds` joins the same sequence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Ordered frames sharing a directory and a name prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sequence {
    pub dir: PathBuf,
    pub name: String,
    pub frames: Vec<PathBuf>,
}

impl Sequence {
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Stand-in source path used for output mapping and reporting:
    /// `<dir>/<name>.png`.
    pub fn representative_path(&self) -> PathBuf {
        self.dir.join(format!("{}.png", self.name))
    }
}

#[derive(Debug, Default)]
pub struct Grouping {
    /// Sorted by directory, then name.
    pub sequences: Vec<Sequence>,
    /// Files whose name is not `name_number.extension`.
    pub mismatches: Vec<PathBuf>,
}

/// Splits a file stem into its name prefix and numeric suffix.
///
/// A single `_` between the two is dropped, so `tooltip_001` and
/// `tooltip001` both yield `("tooltip", 1)`.
pub fn parse_frame_name(path: &Path) -> Option<(String, u64)> {
    let stem = path.file_stem()?.to_str()?;
    let digits_start = stem
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, _)| i)?;

    let (prefix, digits) = stem.split_at(digits_start);
    let prefix = prefix.strip_suffix('_').unwrap_or(prefix);
    if prefix.is_empty() {
        return None;
    }
    let number = digits.parse::<u64>().ok()?;
    Some((prefix.to_string(), number))
}

pub fn group_sequences<I>(paths: I) -> Grouping
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut groups: BTreeMap<(PathBuf, String), Vec<(u64, PathBuf)>> = BTreeMap::new();
    let mut mismatches = Vec::new();

    for path in paths {
        match parse_frame_name(&path) {
            Some((name, number)) => {
                let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
                groups.entry((dir, name)).or_default().push((number, path));
            }
            None => mismatches.push(path),
        }
    }

    let sequences = groups
        .into_iter()
        .map(|((dir, name), mut members)| {
            members.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.file_name().cmp(&b.1.file_name())));
            Sequence {
                dir,
                name,
                frames: members.into_iter().map(|(_, path)| path).collect(),
            }
        })
        .collect();

    mismatches.sort();
    Grouping {
        sequences,
        mismatches,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn names(seq: &Sequence) -> Vec<String> {
        seq.frames
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_parse_frame_name() {
        assert_eq!(
            parse_frame_name(Path::new("tooltip_001.png")),
            Some(("tooltip".to_string(), 1))
        );
        assert_eq!(
            parse_frame_name(Path::new("fx.glow_12.png")),
            Some(("fx.glow".to_string(), 12))
        );
        assert_eq!(
            parse_frame_name(Path::new("frame7.png")),
            Some(("frame".to_string(), 7))
        );
        assert_eq!(parse_frame_name(Path::new("tooltip.png")), None);
        assert_eq!(parse_frame_name(Path::new("_001.png")), None);
        assert_eq!(parse_frame_name(Path::new("001.png")), None);
        assert_eq!(parse_frame_name(Path::new("icon_2x.png")), None);
    }

    #[test]
    fn test_twelve_frames_in_numeric_order() {
        let paths: Vec<PathBuf> = (1..=12)
            .rev()
            .map(|i| PathBuf::from(format!("/in/ui/tooltip_{:03}.png", i)))
            .collect();
        let grouping = group_sequences(paths);

        assert_eq!(grouping.sequences.len(), 1);
        let seq = &grouping.sequences[0];
        assert_eq!(seq.name, "tooltip");
        assert_eq!(seq.len(), 12);
        assert_eq!(names(seq)[0], "tooltip_001.png");
        assert_eq!(names(seq)[11], "tooltip_012.png");
    }

    #[test]
    fn test_nine_before_ten() {
        let paths = ["tooltip_10.png", "tooltip_9.png", "tooltip_11.png"]
            .iter()
            .map(|n| PathBuf::from("/in").join(n))
            .collect::<Vec<_>>();
        let grouping = group_sequences(paths);
        assert_eq!(
            names(&grouping.sequences[0]),
            ["tooltip_9.png", "tooltip_10.png", "tooltip_11.png"]
        );
    }

    #[test]
    fn test_mismatches_and_directories() {
        let paths = vec![
            PathBuf::from("/in/a/anim_1.png"),
            PathBuf::from("/in/b/anim_1.png"),
            PathBuf::from("/in/b/anim_2.png"),
            PathBuf::from("/in/b/background.png"),
        ];
        let grouping = group_sequences(paths);

        assert_eq!(grouping.mismatches, vec![PathBuf::from("/in/b/background.png")]);
        assert_eq!(grouping.sequences.len(), 2);
        assert_eq!(grouping.sequences[0].dir, PathBuf::from("/in/a"));
        assert_eq!(grouping.sequences[0].len(), 1);
        assert_eq!(grouping.sequences[1].len(), 2);
    }

    #[test]
    fn test_duplicate_values_keep_both() {
        let paths = vec![
            PathBuf::from("/in/anim_1.png"),
            PathBuf::from("/in/anim_01.png"),
            PathBuf::from("/in/anim_0.png"),
        ];
        let grouping = group_sequences(paths);
        assert_eq!(
            names(&grouping.sequences[0]),
            ["anim_0.png", "anim_01.png", "anim_1.png"]
        );
    }

    #[test]
    fn test_representative_path() {
        let seq = Sequence {
            dir: PathBuf::from("/in/fx"),
            name: "spark.big".to_string(),
            frames: vec![],
        };
        assert_eq!(seq.representative_path(), PathBuf::from("/in/fx/spark.big.png"));
        assert!(seq.is_empty());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn frames_sorted_by_numeric_value(
            numbers in prop::collection::hash_set(0u64..100_000, 1..40),
            pad in 0usize..6,
        ) {
            let paths: Vec<PathBuf> = numbers
                .iter()
                .map(|n| PathBuf::from(format!("/in/seq_{:0width$}.png", n, width = pad)))
                .collect();
            let grouping = group_sequences(paths);

            prop_assert_eq!(grouping.sequences.len(), 1);
            let parsed: Vec<u64> = grouping.sequences[0]
                .frames
                .iter()
                .map(|p| parse_frame_name(p).unwrap().1)
                .collect();
            let mut expected: Vec<u64> = numbers.into_iter().collect();
            expected.sort_unstable();
            prop_assert_eq!(parsed, expected);
        }
    }
}
