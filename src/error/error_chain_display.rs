/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use std::{
	error::Error as StdError,
	fmt::{self, Display},
};

/// Renders an error together with everything in its [`source`](`StdError::source`) chain.
///
/// The alternate flag (`{:#}`) keeps everything on one line which is what per-rule report lines use:
///
/// ```text
/// Mail service rejected the request: invalid query
/// ```
///
/// Without it, the output spans multiple lines:
///
/// ```text
/// Mail service rejected the request
///
/// Caused by:
///   1: invalid query
/// ```
pub struct ErrorChainDisplay<'a>(pub &'a dyn StdError);

impl Display for ErrorChainDisplay<'_> {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		let one_line = f.alternate();
		let mut current_err = self.0;
		write!(f, "{current_err}")?;

		let mut counter = 0;
		while let Some(source) = current_err.source() {
			current_err = source;
			counter += 1;

			if one_line {
				write!(f, ": {current_err}")?;
				continue;
			}

			if counter == 1 {
				write!(f, "\n\nCaused by:")?;
			}

			write!(f, "\n\t{counter}: {current_err}")?;
		}

		Ok(())
	}
}
