//! Randomized content and name generation.
//!
//! Bucket names come from a prefix template plus random lowercase text and
//! are cut to the 63-character S3 limit. Bodies are random ASCII text so that
//! byte offsets and string offsets coincide in verification.

use rand::RngExt;

/// One kibibyte.
pub const KB: usize = 1024;
/// One mebibyte.
pub const MB: usize = 1024 * KB;

/// Longest legal bucket name.
pub const MAX_BUCKET_NAME_LEN: usize = 63;

/// Characters legal in bucket names.
pub const TEXT: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Characters used for object bodies and tag content.
pub const TEXT_STRING: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

// ---------------------------------------------------------------------------
// Random primitives
// ---------------------------------------------------------------------------

fn random_from(alphabet: &[u8], len: usize) -> String {
    let mut buf = vec![0u8; len];
    let mut rng = rand::rng();
    rng.fill(&mut buf[..]);
    buf.iter()
        .map(|b| char::from(alphabet[usize::from(*b) % alphabet.len()]))
        .collect()
}

/// Uniform-enough value in `0..bound`. `bound` must be non-zero.
fn random_below(bound: u64) -> u64 {
    let mut buf = [0u8; 8];
    let mut rng = rand::rng();
    rng.fill(&mut buf);
    u64::from_le_bytes(buf) % bound
}

/// Random lowercase alphanumeric text, safe for bucket names.
#[must_use]
pub fn random_text(len: usize) -> String {
    random_from(TEXT, len)
}

/// Random mixed-case alphanumeric text, used for object bodies.
#[must_use]
pub fn random_text_string(len: usize) -> String {
    random_from(TEXT_STRING, len)
}

// ---------------------------------------------------------------------------
// Bucket names
// ---------------------------------------------------------------------------

/// Replace the `{random}` placeholder of a prefix template.
#[must_use]
pub fn expand_prefix(template: &str) -> String {
    template.replace("{random}", &random_text(30))
}

fn cut(mut name: String, len: usize) -> String {
    name.truncate(len);
    name
}

/// Prefix plus a short random suffix, never longer than 63 characters.
#[must_use]
pub fn bucket_name(prefix: &str) -> String {
    cut(format!("{prefix}{}", random_text(5)), MAX_BUCKET_NAME_LEN)
}

/// Prefix padded with random text and cut to exactly `len` characters.
#[must_use]
pub fn bucket_name_with_len(prefix: &str, len: usize) -> String {
    let pad = len.saturating_sub(prefix.len());
    cut(format!("{prefix}{}", random_text(pad)), len)
}

/// Name of length `len` when the prefix is shorter, otherwise the prefix cut
/// to `len - 1` characters.
#[must_use]
pub fn padded_bucket_name(prefix: &str, len: usize) -> String {
    if prefix.len() < len {
        format!("{prefix}{}", random_text(len - prefix.len()))
    } else {
        cut(prefix.to_owned(), len.saturating_sub(1))
    }
}

// ---------------------------------------------------------------------------
// Parts
// ---------------------------------------------------------------------------

/// Sizes of consecutive parts of `part_size` bytes covering `size` bytes.
///
/// # Examples
///
/// ```
/// use ksan_s3_harness::generate::part_sizes;
///
/// assert_eq!(part_sizes(12, 5), vec![5, 5, 2]);
/// assert_eq!(part_sizes(1, 5), vec![1]);
/// ```
#[must_use]
pub fn part_sizes(size: usize, part_size: usize) -> Vec<usize> {
    let part_size = part_size.max(1);
    (0..size)
        .step_by(part_size)
        .map(|offset| part_size.min(size - offset))
        .collect()
}

/// Random body of `size` bytes split into `part_size` chunks.
#[must_use]
pub fn make_part_data(size: usize, part_size: usize) -> Vec<String> {
    part_sizes(size, part_size)
        .into_iter()
        .map(random_text_string)
        .collect()
}

// ---------------------------------------------------------------------------
// Byte ranges
// ---------------------------------------------------------------------------

/// Inclusive byte range, as used by `Range` and `x-amz-copy-source-range`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First byte offset.
    pub start: u64,
    /// Last byte offset (inclusive).
    pub end: u64,
}

impl ByteRange {
    /// Range covering `start..=end`.
    #[must_use]
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Number of bytes covered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Always false; a `ByteRange` covers at least one byte.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Header form, `bytes=start-end`.
    #[must_use]
    pub fn header(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }

    /// The covered bytes of `data`.
    ///
    /// # Panics
    ///
    /// Panics if the range exceeds `data`.
    #[must_use]
    pub fn slice<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let start = usize::try_from(self.start).unwrap_or(usize::MAX);
        let end = usize::try_from(self.end).unwrap_or(usize::MAX);
        &data[start..=end]
    }
}

/// Consecutive ranges of `step` bytes; the last one stops at the final byte.
#[must_use]
pub fn step_ranges(size: u64, step: u64) -> Vec<ByteRange> {
    let step = step.max(1);
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < size {
        let end = (start + step).min(size) - 1;
        ranges.push(ByteRange::new(start, end));
        start += step;
    }
    ranges
}

/// Random non-empty range inside an object of `size` bytes.
///
/// Offsets favour the head of the object (the last 1000 bytes are only
/// reachable as range tails) so that long reads stay likely. Returns `None`
/// for an empty object.
#[must_use]
pub fn random_range(size: u64) -> Option<ByteRange> {
    if size == 0 {
        return None;
    }
    let offset_bound = size.saturating_sub(1000).max(1);
    let start = random_below(offset_bound);
    let len = random_below(size - start) + 1;
    Some(ByteRange::new(start, start + len - 1))
}

/// `count` random ranges inside an object of `size` bytes.
#[must_use]
pub fn random_ranges(size: u64, count: usize) -> Vec<ByteRange> {
    (0..count).filter_map(|_| random_range(size)).collect()
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// Ten random tags with keys of `key_len` and values of `value_len` chars.
#[must_use]
pub fn make_tag_list(key_len: usize, value_len: usize) -> Vec<(String, String)> {
    (0..10)
        .map(|_| (random_text_string(key_len), random_text_string(value_len)))
        .collect()
}

/// `n` tags of the form `("0", "0"), ("1", "1"), ...`.
#[must_use]
pub fn simple_tag_set(n: usize) -> Vec<(String, String)> {
    (0..n).map(|i| (i.to_string(), i.to_string())).collect()
}
