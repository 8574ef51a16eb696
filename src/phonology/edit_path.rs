use serde::Serialize;

/// What an edit step does to get from one sequence to the other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditOperation {
    /// Symbols are equal
    None,
    Change,
    /// A symbol of the target sequence with no counterpart in the source
    Insert,
    /// A symbol of the source sequence with no counterpart in the target
    Delete,
}

/// One step of a minimum edit path
#[derive(Debug, Clone, PartialEq)]
pub struct EditStep<T> {
    pub from: Option<T>,
    pub to: Option<T>,
    pub from_index: usize,
    pub to_index: usize,
    /// Cost of this step alone
    pub step_distance: u32,
    /// Cost of the path up to and including this step
    pub total_distance: u32,
    pub operation: EditOperation,
}

impl<T> EditStep<T> {
    pub fn new(from: Option<T>, to: Option<T>, operation: EditOperation, step_distance: u32) -> Self {
        Self {
            from,
            to,
            from_index: 0,
            to_index: 0,
            step_distance,
            total_distance: step_distance,
            operation,
        }
    }
}

/// Costs of the individual edit operations
pub trait EditComparator<T> {
    /// Step for aligning `from` with `to`: `None` if they're the same, `Change` otherwise
    fn compare(&self, from: &T, to: &T) -> EditStep<T>;

    fn insert(&self, to: &T) -> EditStep<T>;

    fn delete(&self, from: &T) -> EditStep<T>;
}

/// Every change, insertion and deletion costs 1
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEditComparator;

impl<T: Clone + PartialEq> EditComparator<T> for DefaultEditComparator {
    fn compare(&self, from: &T, to: &T) -> EditStep<T> {
        if from == to {
            EditStep::new(Some(from.clone()), Some(to.clone()), EditOperation::None, 0)
        } else {
            EditStep::new(Some(from.clone()), Some(to.clone()), EditOperation::Change, 1)
        }
    }

    fn insert(&self, to: &T) -> EditStep<T> {
        EditStep::new(None, Some(to.clone()), EditOperation::Insert, 1)
    }

    fn delete(&self, from: &T) -> EditStep<T> {
        EditStep::new(Some(from.clone()), None, EditOperation::Delete, 1)
    }
}

#[derive(Clone, Copy)]
struct Cell {
    operation: EditOperation,
    step: u32,
    total: u32,
}

/// Finds the cheapest way of turning one sequence into another
///
/// Classic dynamic-programming edit distance, keeping the whole matrix so the path
/// can be traced back. When two candidate steps cost the same, deletion is
/// preferred over insertion and insertion over alignment.
#[derive(Debug, Clone, Default)]
pub struct MinimumEditPath<C> {
    comparator: C,
}

impl<C> MinimumEditPath<C> {
    pub fn new(comparator: C) -> Self {
        Self { comparator }
    }

    pub fn comparator(&self) -> &C {
        &self.comparator
    }
}

impl<C> MinimumEditPath<C> {
    /// The steps of a minimum edit path from `from` to `to`, in sequence order
    pub fn path<T>(&self, from: &[T], to: &[T]) -> Vec<EditStep<T>>
    where
        T: Clone,
        C: EditComparator<T>,
    {
        let rows = from.len() + 1;
        let columns = to.len() + 1;
        let mut cells: Vec<Cell> = Vec::with_capacity(rows * columns);
        let at = |i: usize, j: usize| i * columns + j;

        cells.push(Cell {
            operation: EditOperation::None,
            step: 0,
            total: 0,
        });
        for (j, t) in to.iter().enumerate() {
            let step = self.comparator.insert(t).step_distance;
            let total = cells[j].total + step;
            cells.push(Cell {
                operation: EditOperation::Insert,
                step,
                total,
            });
        }

        for (i, f) in from.iter().enumerate() {
            let row = i + 1;
            let step = self.comparator.delete(f).step_distance;
            let total = cells[at(i, 0)].total + step;
            cells.push(Cell {
                operation: EditOperation::Delete,
                step,
                total,
            });
            for (j, t) in to.iter().enumerate() {
                let column = j + 1;
                let delete_step = self.comparator.delete(f).step_distance;
                let delete = Cell {
                    operation: EditOperation::Delete,
                    step: delete_step,
                    total: cells[at(row - 1, column)].total + delete_step,
                };
                let insert_step = self.comparator.insert(t).step_distance;
                let insert = Cell {
                    operation: EditOperation::Insert,
                    step: insert_step,
                    total: cells[at(row, column - 1)].total + insert_step,
                };
                let compared = self.comparator.compare(f, t);
                let edit = Cell {
                    operation: compared.operation,
                    step: compared.step_distance,
                    total: cells[at(row - 1, column - 1)].total + compared.step_distance,
                };

                let mut winner = edit;
                if winner.total >= insert.total {
                    winner = insert;
                }
                if winner.total >= delete.total {
                    winner = delete;
                }
                cells.push(winner);
            }
        }

        let mut steps = Vec::new();
        let (mut i, mut j) = (from.len(), to.len());
        while i > 0 || j > 0 {
            let cell = cells[at(i, j)];
            let step = match cell.operation {
                EditOperation::Delete => {
                    i -= 1;
                    EditStep {
                        from: Some(from[i].clone()),
                        to: None,
                        from_index: i,
                        to_index: j.saturating_sub(1),
                        step_distance: cell.step,
                        total_distance: cell.total,
                        operation: cell.operation,
                    }
                }
                EditOperation::Insert => {
                    j -= 1;
                    EditStep {
                        from: None,
                        to: Some(to[j].clone()),
                        from_index: i.saturating_sub(1),
                        to_index: j,
                        step_distance: cell.step,
                        total_distance: cell.total,
                        operation: cell.operation,
                    }
                }
                EditOperation::None | EditOperation::Change => {
                    i -= 1;
                    j -= 1;
                    EditStep {
                        from: Some(from[i].clone()),
                        to: Some(to[j].clone()),
                        from_index: i,
                        to_index: j,
                        step_distance: cell.step,
                        total_distance: cell.total,
                        operation: cell.operation,
                    }
                }
            };
            steps.push(step);
        }
        steps.reverse();
        steps
    }

    /// Total cost of the minimum edit path
    pub fn distance<T>(&self, from: &[T], to: &[T]) -> u32
    where
        T: Clone,
        C: EditComparator<T>,
    {
        self.path(from, to).last().map_or(0, |step| step.total_distance)
    }

    /// Merges each adjacent delete/insert pair into a single change, where changing
    /// costs no more than three times the pair
    pub fn collapse<T>(&self, path: Vec<EditStep<T>>) -> Vec<EditStep<T>>
    where
        T: Clone,
        C: EditComparator<T>,
    {
        let mut collapsed: Vec<EditStep<T>> = Vec::with_capacity(path.len());
        for step in path {
            let Some(last) = collapsed.last_mut() else {
                collapsed.push(step);
                continue;
            };
            let pair = last.step_distance + step.step_distance;
            match (last.operation, step.operation) {
                (EditOperation::Delete, EditOperation::Insert) => {
                    if let (Some(from), Some(to)) = (&last.from, &step.to) {
                        if self.comparator.compare(from, to).step_distance <= 3 * pair {
                            last.operation = EditOperation::Change;
                            last.to = step.to;
                            last.to_index = step.to_index;
                            last.step_distance = pair;
                            continue;
                        }
                    }
                }
                (EditOperation::Insert, EditOperation::Delete) => {
                    if let (Some(from), Some(to)) = (&step.from, &last.to) {
                        if self.comparator.compare(from, to).step_distance <= 3 * pair {
                            last.operation = EditOperation::Change;
                            last.from = step.from;
                            last.from_index = step.from_index;
                            last.step_distance = pair;
                            continue;
                        }
                    }
                }
                _ => {}
            }
            collapsed.push(step);
        }
        collapsed
    }
}

/// Character-wise minimum edit path between two strings
pub fn string_path<C: EditComparator<char>>(
    editor: &MinimumEditPath<C>,
    from: &str,
    to: &str,
) -> Vec<EditStep<char>> {
    let from: Vec<char> = from.chars().collect();
    let to: Vec<char> = to.chars().collect();
    editor.path(&from, &to)
}
