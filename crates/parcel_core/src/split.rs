use std::ops::Range;

use crate::errors::{Error, Result};

/// Most parts a single multipart upload may have (S3's limit).
pub const MAX_PART_COUNT: u64 = 10_000;

/// One contiguous slice of the source, identified by its 1-based index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Part {
    pub index: u32,
    pub offset: u64,
    pub length: u64,
}

impl Part {
    #[inline]
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.length
    }
}

/// Partitions `total_size` bytes into parts of at most `max_part_size` bytes.
///
/// An empty source still yields a single zero-length part; a multipart upload cannot be
/// completed without at least one part.
#[derive(Clone, Copy, Debug)]
pub struct PartSplitter {
    total_size: u64,
    max_part_size: u64,
    count: u32,
}

impl PartSplitter {
    pub fn new(total_size: u64, max_part_size: u64) -> Result<Self> {
        if max_part_size == 0 {
            return Err(Error::InvalidConfiguration(String::from(
                "max_part_size must be positive",
            )));
        }
        let count = total_size.div_ceil(max_part_size).max(1);
        if count > MAX_PART_COUNT {
            return Err(Error::InvalidConfiguration(format!(
                "{total_size} bytes in parts of {max_part_size} bytes needs {count} parts, \
                 more than the limit of {MAX_PART_COUNT}"
            )));
        }
        Ok(Self {
            total_size,
            max_part_size,
            count: count as u32,
        })
    }

    #[inline]
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    #[inline]
    pub fn len(&self) -> u32 {
        self.count
    }

    /// Always false: even an empty source has one part.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn iter(&self) -> Parts {
        Parts {
            splitter: *self,
            next_index: 1,
        }
    }
}

impl IntoIterator for &PartSplitter {
    type Item = Part;
    type IntoIter = Parts;

    fn into_iter(self) -> Parts {
        self.iter()
    }
}

#[derive(Clone, Debug)]
pub struct Parts {
    splitter: PartSplitter,
    next_index: u32,
}

impl Iterator for Parts {
    type Item = Part;

    fn next(&mut self) -> Option<Part> {
        let PartSplitter {
            total_size,
            max_part_size,
            count,
        } = self.splitter;
        if self.next_index > count {
            return None;
        }
        let offset = u64::from(self.next_index - 1) * max_part_size;
        let length = max_part_size.min(total_size - offset);
        let part = Part {
            index: self.next_index,
            offset,
            length,
        };
        self.next_index += 1;
        Some(part)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.splitter.count + 1 - self.next_index) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for Parts {}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::single_byte(1, 1, 1)]
    #[case::smaller_than_part(3, 10, 1)]
    #[case::exact_fit(10, 5, 2)]
    #[case::remainder(11, 5, 3)]
    #[case::one_byte_parts(7, 1, 7)]
    #[case::twelve_million(12_000_000, 5_000_000, 3)]
    #[case::five_mib_parts(64 * 1024 * 1024 + 17, 5 * 1024 * 1024, 13)]
    fn partitions_exactly(
        #[case] total_size: u64,
        #[case] max_part_size: u64,
        #[case] expected_count: u32,
    ) {
        let splitter = PartSplitter::new(total_size, max_part_size).unwrap();
        assert_eq!(splitter.len(), expected_count);

        let parts: Vec<Part> = splitter.iter().collect();
        assert_eq!(parts.len(), expected_count as usize);

        let mut expected_offset = 0;
        for (i, part) in parts.iter().enumerate() {
            assert_eq!(part.index as usize, i + 1);
            assert_eq!(part.offset, expected_offset);
            assert!(part.length > 0);
            assert!(part.length <= max_part_size);
            expected_offset = part.range().end;
        }
        assert_eq!(expected_offset, total_size);
        assert_eq!(parts.iter().map(|p| p.length).sum::<u64>(), total_size);

        // every part but the last is full
        for part in &parts[..parts.len() - 1] {
            assert_eq!(part.length, max_part_size);
        }
    }

    #[test]
    fn twelve_million_lengths() {
        let lengths: Vec<u64> = PartSplitter::new(12_000_000, 5_000_000)
            .unwrap()
            .iter()
            .map(|p| p.length)
            .collect();
        assert_eq!(lengths, vec![5_000_000, 5_000_000, 2_000_000]);
    }

    #[test]
    fn empty_source_yields_one_empty_part() {
        let splitter = PartSplitter::new(0, 5).unwrap();
        assert_eq!(splitter.len(), 1);
        assert_eq!(
            splitter.iter().collect::<Vec<_>>(),
            vec![Part {
                index: 1,
                offset: 0,
                length: 0
            }]
        );
    }

    #[test]
    fn restartable() {
        let splitter = PartSplitter::new(23, 4).unwrap();
        let first: Vec<Part> = splitter.iter().collect();
        let second: Vec<Part> = (&splitter).into_iter().collect();
        assert_eq!(first, second);

        let mut parts = splitter.iter();
        assert_eq!(parts.len(), 6);
        parts.next();
        assert_eq!(parts.len(), 5);
        let resumed = parts.clone().collect::<Vec<_>>();
        assert_eq!(resumed, first[1..]);
    }

    #[test]
    fn rejects_zero_part_size() {
        assert!(matches!(
            PartSplitter::new(10, 0),
            Err(Error::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn rejects_too_many_parts() {
        assert!(PartSplitter::new(MAX_PART_COUNT, 1).is_ok());
        assert!(matches!(
            PartSplitter::new(MAX_PART_COUNT + 1, 1),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
