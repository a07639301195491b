//! Plain-text rendering of grids and solver tables.
//!
//! Rows run from the top (`y = height - 1`) down; each cell is a 5-wide,
//! left-aligned column. Nothing here prints.

use std::fmt::Write;

use crate::field::Field;
use crate::grid::{GridWorld, Position};
use crate::policy::{ActionValueTable, PolicyTable, ValueTable};

const CELL: usize = 5;

/// Renders every row of `grid`, asking `cell` for the text of Empty cells.
fn render(grid: &GridWorld, title: &str, mut cell: impl FnMut(Position) -> String) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{title}:");
    for y in (0..grid.height()).rev() {
        out.push_str("| ");
        for x in 0..grid.width() {
            let position = Position::new(x, y);
            let text = match grid.field(position) {
                Field::Empty => cell(position),
                Field::Reward => "WIN".to_string(),
                Field::NegReward => "DEAD".to_string(),
                Field::Obstacle => "[]".to_string(),
                Field::OutOfBounds => String::new(),
            };
            let _ = write!(out, "{:<width$} | ", text, width = CELL);
        }
        out.push('\n');
    }
    out
}

/// The landscape with the agent marked `A`.
pub fn format_grid(grid: &GridWorld) -> String {
    let agent = grid.agent_position();
    let mut out = render(grid, "Grid", |p| if p == agent { "A".into() } else { ".".into() });
    let _ = writeln!(
        out,
        "agent {agent}  actions {}  reward {:.2}{}",
        grid.action_counter(),
        grid.current_reward(),
        if grid.is_terminated() { "  (terminated)" } else { "" }
    );
    out
}

pub fn format_values(grid: &GridWorld, values: &ValueTable, precision: usize) -> String {
    render(grid, "Values", |p| format!("{:.precision$}", values.get(p)))
}

pub fn format_policy(grid: &GridWorld, policy: &PolicyTable) -> String {
    render(grid, "Policy", |p| policy.get(p).map_or_else(|| "-".into(), |a| a.to_string()))
}

/// Best action value per cell.
pub fn format_q_values(grid: &GridWorld, q: &ActionValueTable, precision: usize) -> String {
    render(grid, "Action values", |p| format!("{:.precision$}", q.max_value(p)))
}
