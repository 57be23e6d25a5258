//! Node footprint estimation for the static layouts.
//!
//! The renderer owns the real card size; static layouts only need a stable
//! estimate so columns pack without overlap.

use crate::task::Task;

/// Approximate glyph width at the card body font size.
const GLYPH_WIDTH: f32 = 8.0;
/// Horizontal card padding.
const CARD_PADDING: f32 = 32.0;
/// Header, badges and footer.
const CARD_CHROME: f32 = 60.0;
const TITLE_LINE: f32 = 20.0;
const BODY_LINE: f32 = 16.0;
const MAX_BODY_LINES: usize = 3;
const SUBTASK_HEADER: f32 = 24.0;
const SUBTASK_ROW: f32 = 18.0;
const MAX_SUBTASK_ROWS: usize = 10;

fn wrapped_lines(text: &str, chars_per_line: usize) -> usize {
    let len = text.chars().count();
    len.div_ceil(chars_per_line.max(1))
}

/// Estimated rendered height of a task card `node_width` pixels wide.
pub fn estimate_node_height(task: &Task, node_width: f32) -> f32 {
    let chars_per_line = ((node_width - CARD_PADDING) / GLYPH_WIDTH).floor().max(1.0) as usize;

    let title_lines = wrapped_lines(&task.title, chars_per_line).max(1);
    let body_lines = wrapped_lines(&task.description, chars_per_line).min(MAX_BODY_LINES);

    let mut height = CARD_CHROME + title_lines as f32 * TITLE_LINE + body_lines as f32 * BODY_LINE;
    if !task.subtasks.is_empty() {
        height += SUBTASK_HEADER + task.subtasks.len().min(MAX_SUBTASK_ROWS) as f32 * SUBTASK_ROW;
    }
    height
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Subtask;

    #[test]
    fn test_minimal_card() {
        let task = Task::new(1, "");
        assert_eq!(estimate_node_height(&task, 280.0), CARD_CHROME + TITLE_LINE);
    }

    #[test]
    fn test_grows_with_subtasks_and_text() {
        let plain = Task::new(1, "Short");
        let mut rich = Task::new(2, "Short");
        rich.description = "x".repeat(200);
        rich.subtasks = (0..4)
            .map(|i| Subtask {
                id: i,
                ..Subtask::default()
            })
            .collect();
        let plain_h = estimate_node_height(&plain, 280.0);
        let rich_h = estimate_node_height(&rich, 280.0);
        assert_eq!(
            rich_h - plain_h,
            MAX_BODY_LINES as f32 * BODY_LINE + SUBTASK_HEADER + 4.0 * SUBTASK_ROW
        );
    }

    #[test]
    fn test_subtask_rows_capped() {
        let mut task = Task::new(1, "Many");
        task.subtasks = (0..50).map(|i| Subtask { id: i, ..Subtask::default() }).collect();
        let h = estimate_node_height(&task, 280.0);
        assert_eq!(
            h,
            CARD_CHROME + TITLE_LINE + SUBTASK_HEADER + MAX_SUBTASK_ROWS as f32 * SUBTASK_ROW
        );
    }
}
