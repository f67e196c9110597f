use std::fmt;

use crate::error::Error;

/// Inclusive range of sequence numbers to peek
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PeekWindow {
    /// From the queue head to its current end
    #[default]
    Unbounded,
    /// `min..=max`
    Bounded { min: u64, max: u64 },
}

impl PeekWindow {
    pub fn bounded(min: u64, max: u64) -> Result<Self, Error> {
        let window = PeekWindow::Bounded { min, max };
        window.validate()?;
        Ok(window)
    }

    /// Reject inverted bounds, including windows built from the variant directly
    pub fn validate(&self) -> Result<(), Error> {
        match self {
            PeekWindow::Bounded { min, max } if min > max => Err(Error::validation(format!(
                "Min sequence number ({}) must not exceed max sequence number ({}).",
                min, max
            ))),
            _ => Ok(()),
        }
    }

    /// Both bounds or neither; a single bound is malformed
    pub fn from_bounds(min: Option<u64>, max: Option<u64>) -> Result<Self, Error> {
        match (min, max) {
            (None, None) => Ok(PeekWindow::Unbounded),
            (Some(min), Some(max)) => Self::bounded(min, max),
            _ => Err(Error::validation(
                "Enter both min and max sequence numbers, or neither.",
            )),
        }
    }

    /// Sequence the first peek starts at; None means the queue head
    pub fn start(&self) -> Option<u64> {
        match self {
            PeekWindow::Unbounded => None,
            PeekWindow::Bounded { min, .. } => Some(*min),
        }
    }

    /// Size of the next page request given the cursor, or None to stop.
    ///
    /// Bounded windows request the remaining span (`max - min` before the
    /// first page, `max - last_seq` after), capped at `page_cap`. A
    /// degenerate `min == max` window requests its single message.
    pub fn next_page_size(&self, last_seq: Option<u64>, page_cap: usize) -> Option<usize> {
        match self {
            PeekWindow::Unbounded => Some(page_cap),
            PeekWindow::Bounded { min, max } => {
                let remaining = match last_seq {
                    None => max.saturating_sub(*min).max(1),
                    Some(last) => max.saturating_sub(last),
                };
                if remaining == 0 {
                    return None;
                }
                Some(remaining.min(page_cap as u64) as usize)
            }
        }
    }

    /// True once the cursor has reached the upper bound
    pub fn is_exhausted_by(&self, last_seq: u64) -> bool {
        match self {
            PeekWindow::Unbounded => false,
            PeekWindow::Bounded { max, .. } => last_seq >= *max,
        }
    }

    pub fn contains(&self, seq: u64) -> bool {
        match self {
            PeekWindow::Unbounded => true,
            PeekWindow::Bounded { min, max } => (*min..=*max).contains(&seq),
        }
    }
}

impl fmt::Display for PeekWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeekWindow::Unbounded => write!(f, "all"),
            PeekWindow::Bounded { min, max } => write!(f, "{}..={}", min, max),
        }
    }
}
