//! Offset based pages over a full result set.
//!
//! Directories return matches in no particular order and without a usable
//! cursor, so a page is cut from the complete, explicitly sorted result of
//! one search. Every request pays for a full retrieval of the matches.
use serde::Serialize;

use crate::error::Error;

/// Largest page a caller may request.
pub const MAX_LIMIT: usize = 100;

/// Page size when the caller does not choose one.
pub const DEFAULT_LIMIT: usize = 10;

/// Which part of a listing to return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
	/// Items to skip
	pub skip: usize,
	/// Items to return at most
	pub limit: usize,
}

impl Default for PageRequest {
	fn default() -> Self {
		Self { skip: 0, limit: DEFAULT_LIMIT }
	}
}

impl PageRequest {
	/// Create a checked request.
	pub fn new(skip: usize, limit: usize) -> Result<Self, Error> {
		let request = Self { skip, limit };
		request.validate()?;
		Ok(request)
	}

	/// Reject limits outside `1..=MAX_LIMIT`. Out of range limits are never
	/// clamped.
	pub fn validate(&self) -> Result<(), Error> {
		if (1..=MAX_LIMIT).contains(&self.limit) {
			Ok(())
		} else {
			Err(Error::Validation(format!(
				"limit must be between 1 and {MAX_LIMIT}, got {}",
				self.limit
			)))
		}
	}
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
	/// The items of the page, at most `limit`
	pub items: Vec<T>,
	/// Number of matches regardless of `skip` and `limit`
	pub total: usize,
	/// Items skipped
	pub skip: usize,
	/// Requested page size
	pub limit: usize,
	/// Number of pages of `limit` items needed for all matches
	pub pages: usize,
}

/// Cut a page from all matches. Items are ordered by the given sort key,
/// compared without regard to case, and ties are broken by the full key so
/// that repeated calls over the same data return the same page.
pub fn paginate<T, F>(
	mut matches: Vec<T>,
	request: PageRequest,
	sort_key: F,
) -> Result<Page<T>, Error>
where
	F: Fn(&T) -> (&str, &str),
{
	request.validate()?;
	matches.sort_by_cached_key(|item| {
		let (primary, tiebreak) = sort_key(item);
		(primary.to_lowercase(), tiebreak.to_lowercase(), primary.to_owned())
	});

	let total = matches.len();
	let items: Vec<T> = matches.into_iter().skip(request.skip).take(request.limit).collect();
	let pages = total.div_ceil(request.limit);
	Ok(Page { items, total, skip: request.skip, limit: request.limit, pages })
}
