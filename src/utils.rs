//! Checked conversions for the counts reported by the driver.

use std::convert::TryFrom;
use crate::error::{ Error, ErrorKind, Result };

/// Converts an `i32` or `i64` count to a `usize` if the range and the value
/// permits. Constructs an error message based on `msg` otherwise.
/// ```
/// # use feedshape::utils::int_to_usize_with_msg;
/// # use feedshape::error::Result;
/// #
/// # fn main() -> Result<()> {
/// assert!(int_to_usize_with_msg(-1_i32, "matched count")
///         .unwrap_err()
///         .to_string()
///         .contains("matched count (-1) is negative"));
///
/// assert_eq!(int_to_usize_with_msg(3_i64, "matched count")?, 3);
/// # Ok(())
/// # }
/// ```
pub fn int_to_usize_with_msg<T: Into<i64>>(x: T, msg: &str) -> Result<usize> {
    let n: i64 = x.into();

    if n < 0 {
        return Err(Error::new(
            ErrorKind::IntConversionUnderflow,
            format!("{} ({}) is negative", msg, n)
        ));
    }

    usize::try_from(n).map_err(|_| Error::new(
        ErrorKind::IntConversionOverflow,
        format!("{} ({}) overflows usize", msg, n)
    ))
}
