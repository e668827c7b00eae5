//! Masks and screens
//!
//! A mask narrows the assets one term is computed for. A screen narrows the
//! rows of the final table. Both keep a cell only where the filter is True;
//! False and Missing both drop it.

use crate::error::{PipelineError, Result};
use crate::pipeline::value::Tri;
use crate::pipeline::window::Buffer;

/// Set every cell of `buffer` where `mask` is not True to missing
pub fn apply_mask(buffer: &mut Buffer, mask: &Buffer) -> Result<()> {
    let mask = mask.as_boolean()?;
    if mask.len() != buffer.len() {
        return Err(PipelineError::InvalidTerm(format!(
            "mask covers {} cells, term has {}",
            mask.len(),
            buffer.len()
        )));
    }
    for (index, flag) in mask.iter().enumerate() {
        if !flag.is_true() {
            buffer.set_missing(index);
        }
    }
    Ok(())
}

/// Keep the candidate cells whose screen value is True
pub fn apply_screen(candidates: Vec<usize>, screen: &[Tri]) -> Vec<usize> {
    candidates
        .into_iter()
        .filter(|&index| screen.get(index).map_or(false, |t| t.is_true()))
        .collect()
}
