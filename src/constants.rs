//! Crate-wide sizing constants.

use static_assertions::const_assert;

/// Default region granularity for heap buffers, in bytes.
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Alignment unit for file-backed map windows, in bytes.
pub const MAP_GRANULE: usize = 4096;

/// Upper bound on a single discovered line, in bytes. A line that would
/// be longer is reported truncated at this length.
pub const MAX_LINE_LEN: usize = 16 * 1024 * 1024;

/// Cap on the number of ranges submitted to a single gather write.
pub(crate) const MAX_GATHER_RANGES: usize = 1024;

const_assert!(MAP_GRANULE.is_power_of_two());
const_assert!(DEFAULT_PAGE_SIZE > 0);
const_assert!(MAX_GATHER_RANGES > 0);
