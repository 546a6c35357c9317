//! Buffer behaviour configuration.

use crate::constants::DEFAULT_PAGE_SIZE;
#[cfg(unix)]
use crate::constants::MAP_GRANULE;

/// Tunable buffer behaviour, fixed at construction.
///
/// Built with chainable setters:
///
/// ```ignore
/// let strategy = Strategy::default().page_size(2).clone_on_write(true);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Strategy {
    /// Region granularity hint for extend and reserve, in bytes.
    /// 0 means unbounded: one region per request.
    pub page_size: usize,
    /// Copy bytes into fresh regions on cross-buffer writes instead of
    /// sharing source regions with a refcount bump.
    pub clone_on_write: bool,
    /// Bound cross-buffer fragment granularity by this buffer's
    /// `page_size` instead of preserving source fragmentation.
    pub fragment_as_target: bool,
    /// Reject the insert operations.
    pub rejects_insert: bool,
    /// Reject `extend`.
    pub rejects_extend: bool,
    /// Reject `rewind`.
    pub rejects_rewind: bool,
    /// Reject `seek`.
    pub rejects_seek: bool,
    /// Reject `trim`.
    pub rejects_trim: bool,
    /// Reject the write operations.
    pub rejects_write: bool,
    /// Reject the overwrite operations.
    pub rejects_overwrite: bool,
}

impl Default for Strategy {
    fn default() -> Strategy {
        Strategy {
            page_size: DEFAULT_PAGE_SIZE,
            clone_on_write: false,
            fragment_as_target: false,
            rejects_insert: false,
            rejects_extend: false,
            rejects_rewind: false,
            rejects_seek: false,
            rejects_trim: false,
            rejects_write: false,
            rejects_overwrite: false,
        }
    }
}

impl Strategy {
    /// Set the region granularity hint.
    pub fn page_size(self, page_size: usize) -> Self {
        Strategy { page_size, ..self }
    }

    /// Set copy-instead-of-share for cross-buffer writes.
    pub fn clone_on_write(self, clone_on_write: bool) -> Self {
        Strategy {
            clone_on_write,
            ..self
        }
    }

    /// Set target-bounded fragment granularity.
    pub fn fragment_as_target(self, fragment_as_target: bool) -> Self {
        Strategy {
            fragment_as_target,
            ..self
        }
    }

    /// Gate the insert operations.
    pub fn rejects_insert(self, rejects_insert: bool) -> Self {
        Strategy {
            rejects_insert,
            ..self
        }
    }

    /// Gate `extend`.
    pub fn rejects_extend(self, rejects_extend: bool) -> Self {
        Strategy {
            rejects_extend,
            ..self
        }
    }

    /// Gate `rewind`.
    pub fn rejects_rewind(self, rejects_rewind: bool) -> Self {
        Strategy {
            rejects_rewind,
            ..self
        }
    }

    /// Gate `seek`.
    pub fn rejects_seek(self, rejects_seek: bool) -> Self {
        Strategy {
            rejects_seek,
            ..self
        }
    }

    /// Gate `trim`.
    pub fn rejects_trim(self, rejects_trim: bool) -> Self {
        Strategy {
            rejects_trim,
            ..self
        }
    }

    /// Gate the write operations.
    pub fn rejects_write(self, rejects_write: bool) -> Self {
        Strategy {
            rejects_write,
            ..self
        }
    }

    /// Gate the overwrite operations.
    pub fn rejects_overwrite(self, rejects_overwrite: bool) -> Self {
        Strategy {
            rejects_overwrite,
            ..self
        }
    }

    /// The fixed strategy of the file-backed buffer.
    #[cfg(unix)]
    pub(crate) fn mapped() -> Strategy {
        Strategy::default()
            .page_size(MAP_GRANULE)
            .clone_on_write(true)
            .fragment_as_target(true)
            .rejects_insert(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_permissive() {
        let s = Strategy::default();
        assert_eq!(s.page_size, DEFAULT_PAGE_SIZE);
        assert!(!s.clone_on_write);
        assert!(!s.rejects_insert);
        assert!(!s.rejects_write);
    }

    #[test]
    fn setters_chain() {
        let s = Strategy::default()
            .page_size(2)
            .clone_on_write(true)
            .rejects_trim(true);
        assert_eq!(s.page_size, 2);
        assert!(s.clone_on_write);
        assert!(s.rejects_trim);
        assert!(!s.rejects_seek);
    }
}
