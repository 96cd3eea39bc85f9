//! Greedy word wrap into a bounded box.

use crate::Error;

/// Fill a box with left-justified text, wrapping and truncating as necessary.
///
/// Words are whitespace-delimited and re-joined with single spaces; lines are
/// separated by `\n`. `measure(candidate, spacing)` returns the pixel size of
/// the (possibly multi-line) candidate text.
///
/// - Words are appended to the current line while it still measures within
///   `width`. A line always keeps at least one word, so a single word wider
///   than `width` is emitted on its own line rather than dropped.
/// - `height` is a soft bound: once the accumulated text is taller than
///   `height`, no further lines are started and the text fit so far is returned.
/// - If everything fits, the result has no trailing newline.
///
/// # Errors
///
/// [`Error::Layout`] if a line holding more than one word still measures wider
/// than `width` after backing off the overflowing word. That means `measure`
/// returned different sizes for the same text, not a data problem.
///
/// # Example
///
/// ```
/// use inkdash::fill_box;
///
/// // 10px per character, 12px per line
/// let measure = |t: &str, _spacing: u32| {
///     let w = t.lines().map(|l| l.len()).max().unwrap_or(0) as u32 * 10;
///     let h = t.split('\n').count() as u32 * 12;
///     (w, h)
/// };
///
/// let text = fill_box("one two three four", measure, 90, 100, 2).unwrap();
/// assert_eq!(text, "one two\nthree\nfour");
/// ```
pub fn fill_box<M>(text: &str, measure: M, width: u32, height: u32, spacing: u32) -> Result<String, Error>
where
    M: Fn(&str, u32) -> (u32, u32),
{
    let words: Vec<&str> = text.split_whitespace().collect();
    let mut fit = String::new();
    let mut next = 0;

    tracing::trace!("Box size: {}x{}", width, height);

    while next < words.len() {
        // Index where the current line starts within `fit`
        let line_start = fit.len();
        let mut line_words = 0;

        while next < words.len() {
            let mut candidate = fit.clone();
            if line_words > 0 {
                candidate.push(' ');
            }
            candidate.push_str(words[next]);

            if line_words > 0 && measure(&candidate[line_start..], spacing).0 > width {
                break;
            }

            fit = candidate;
            line_words += 1;
            next += 1;
        }

        if line_words > 1 && measure(&fit[line_start..], spacing).0 > width {
            return Err(Error::Layout(format!(
                "line {:?} is wider than {}px",
                &fit[line_start..],
                width
            )));
        }

        if next == words.len() {
            break;
        }

        fit.push('\n');

        if measure(&fit, spacing).1 > height {
            // Soft height limit: keep what fits, drop the dangling newline
            fit.pop();
            break;
        }
    }

    Ok(fit)
}
