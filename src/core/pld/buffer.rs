use std::ops::Range;
use std::path::Path;

use super::encoding::{encode_ascii_fit, encode_gbk_fit};
use crate::models::LabelBoxError;

/// One `.pld` template held in memory.
///
/// The buffer length never changes: every write goes through
/// [`PldBuffer::overwrite`], which replaces a range with bytes of the same width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PldBuffer {
    bytes: Vec<u8>,
}

impl PldBuffer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn read(path: &Path) -> Result<Self, LabelBoxError> {
        let bytes = std::fs::read(path).map_err(|e| {
            LabelBoxError::Io(std::io::Error::new(
                e.kind(),
                format!("读取模板失败 {}: {}", path.display(), e),
            ))
        })?;
        Ok(Self::new(bytes))
    }

    /// Write the buffer to `path`, creating parent directories
    pub fn write(&self, path: &Path) -> Result<(), LabelBoxError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn contains(&self, needle: &[u8]) -> bool {
        super::scanner::find_bytes(&self.bytes, needle).is_some()
    }

    /// Fixed-width overwrite primitive.
    ///
    /// The range is clamped to the buffer; `replacement` must already be exactly
    /// as wide as the clamped range, otherwise nothing is written and `false`
    /// is returned.
    pub fn overwrite(&mut self, range: Range<usize>, replacement: &[u8]) -> bool {
        let end = range.end.min(self.bytes.len());
        let start = range.start.min(end);
        if end - start != replacement.len() {
            return false;
        }
        self.bytes[start..end].copy_from_slice(replacement);
        true
    }

    /// Overwrite with ASCII text, padded with spaces or truncated to the range width
    pub fn overwrite_ascii_fit(&mut self, range: Range<usize>, text: &str) -> bool {
        let width = range.end.min(self.bytes.len()).saturating_sub(range.start);
        self.overwrite(range, &encode_ascii_fit(text, width))
    }

    /// Overwrite with GBK text, padded or truncated on a character boundary
    pub fn overwrite_gbk_fit(&mut self, range: Range<usize>, text: &str) -> bool {
        let width = range.end.min(self.bytes.len()).saturating_sub(range.start);
        self.overwrite(range, &encode_gbk_fit(text, width))
    }
}

impl From<Vec<u8>> for PldBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overwrite_requires_same_width() {
        let mut buf = PldBuffer::new(b"0123456789".to_vec());
        assert!(!buf.overwrite(2..5, b"ab"));
        assert_eq!(buf.as_bytes(), b"0123456789");
        assert!(buf.overwrite(2..5, b"abc"));
        assert_eq!(buf.as_bytes(), b"01abc56789");
    }

    #[test]
    fn test_ascii_fit_preserves_length() {
        let mut buf = PldBuffer::new(b"*987654321*".to_vec());
        buf.overwrite_ascii_fit(1..10, "123456");
        assert_eq!(buf.as_bytes(), b"*123456   *");
        buf.overwrite_ascii_fit(1..10, "12345678901234");
        assert_eq!(buf.as_bytes(), b"*123456789*");
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn test_range_clamped_to_buffer() {
        let mut buf = PldBuffer::new(b"abcdef".to_vec());
        assert!(buf.overwrite_gbk_fit(3..100, "XYZW"));
        assert_eq!(buf.as_bytes(), b"abcXYZ");
    }

    #[test]
    fn test_read_write_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/北京箱唛.pld");
        let buf = PldBuffer::new(vec![0, 1, 2, 0xFF]);
        buf.write(&path).unwrap();
        assert_eq!(PldBuffer::read(&path).unwrap(), buf);
    }

    #[test]
    fn test_read_missing_file_errors() {
        let dir = TempDir::new().unwrap();
        let err = PldBuffer::read(&dir.path().join("nope.pld")).unwrap_err();
        assert!(matches!(err, LabelBoxError::Io(_)));
    }
}
