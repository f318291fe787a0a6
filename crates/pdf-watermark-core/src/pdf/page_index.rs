//! Page index newtype for bounds-checked 0-based page access.

use std::fmt;

use crate::error::Error;

/// A 0-based page index known to be within a document's page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PageIndex(u32);

impl PageIndex {
    /// Get the index as usize for Rust collections.
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Try to create a PageIndex from a 0-based page number.
    ///
    /// Returns an error if the page number exceeds the total page count.
    pub fn try_from_page_num(page_num: usize, total_pages: usize) -> Result<Self, Error> {
        if page_num >= total_pages {
            return Err(Error::PdfInvalidPage {
                page: page_num,
                total: total_pages,
            });
        }

        let index = u32::try_from(page_num).map_err(|_| Error::PdfInvalidPage {
            page: page_num,
            total: total_pages,
        })?;

        Ok(Self(index))
    }

    /// The page watermark overlays are sized from: the third page, or the
    /// last page when the document is shorter.
    pub fn reference(total_pages: usize) -> Result<Self, Error> {
        if total_pages == 0 {
            return Err(Error::PdfNoPages);
        }
        Self::try_from_page_num(2.min(total_pages - 1), total_pages)
    }
}

impl fmt::Display for PageIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_try_from_page_num_valid() {
        let idx = PageIndex::try_from_page_num(5, 10).unwrap();
        assert_eq!(idx.as_usize(), 5);
    }

    #[test]
    fn test_try_from_page_num_out_of_range() {
        let result = PageIndex::try_from_page_num(10, 5);
        assert!(result.is_err());
    }

    #[test]
    fn test_reference_page() {
        assert_eq!(PageIndex::reference(1).unwrap().as_usize(), 0);
        assert_eq!(PageIndex::reference(2).unwrap().as_usize(), 1);
        assert_eq!(PageIndex::reference(3).unwrap().as_usize(), 2);
        assert_eq!(PageIndex::reference(40).unwrap().as_usize(), 2);
        assert!(matches!(PageIndex::reference(0), Err(Error::PdfNoPages)));
    }

    #[test]
    fn test_display() {
        let idx = PageIndex::try_from_page_num(7, 8).unwrap();
        assert_eq!(format!("{idx}"), "7");
    }
}
