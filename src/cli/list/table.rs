//! Whitespace-aligned tables for listings. Headers never contain whitespace so
//! the output stays easy to consume with `awk` or `cut`.

use std::fmt::{self, Write};

pub(crate) struct Row {
    cells: Vec<String>,
}

impl Row {
    fn is_awk_safe(&self) -> bool {
        !self
            .cells
            .iter()
            .any(|cell| cell.contains(char::is_whitespace))
    }
}

impl From<Vec<String>> for Row {
    fn from(cells: Vec<String>) -> Self {
        Row { cells }
    }
}

impl From<Vec<&str>> for Row {
    fn from(cells: Vec<&str>) -> Self {
        Row {
            cells: cells.into_iter().map(str::to_owned).collect(),
        }
    }
}

pub(crate) struct Table {
    header: Option<Row>,
    body: Vec<Row>,
    columns: Option<usize>,
    print_header: bool,
}

impl Table {
    pub(crate) fn new() -> Table {
        Table {
            header: None,
            body: Vec::new(),
            columns: None,
            print_header: true,
        }
    }

    fn check_columns(&mut self, row: &Row) {
        let columns = *self.columns.get_or_insert(row.cells.len());

        assert_eq!(
            columns,
            row.cells.len(),
            "all rows of a table must have the same number of columns"
        );
    }

    pub(crate) fn print_header(&mut self, print_header: bool) {
        self.print_header = print_header;
    }

    pub(crate) fn add_row<R: Into<Row>>(&mut self, row: R) {
        let row = row.into();

        self.check_columns(&row);

        self.body.push(row);
    }

    pub(crate) fn set_header<R: Into<Row>>(&mut self, header: R) {
        let header = header.into();

        self.check_columns(&header);

        assert!(header.is_awk_safe(), "table header contains whitespace");

        self.header.replace(header);
    }

    fn visible_rows(&self) -> impl Iterator<Item = &Row> {
        let header = if self.print_header {
            self.header.as_ref()
        } else {
            None
        };

        header.into_iter().chain(self.body.iter())
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths = vec![0usize; self.columns.unwrap_or(0)];

        for row in self.header.iter().chain(self.body.iter()) {
            for (width, cell) in widths.iter_mut().zip(&row.cells) {
                *width = (*width).max(cell.len());
            }
        }

        widths
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let widths = self.column_widths();

        for row in self.visible_rows() {
            for (i, (cell, width)) in row.cells.iter().zip(&widths).enumerate() {
                if i != 0 {
                    f.write_str("  ")?;
                }

                write!(f, "{:<width$}", cell, width = *width)?;
            }

            f.write_char('\n')?;
        }

        Ok(())
    }
}

pub(crate) trait IntoTable: Into<Table> + Sized {
    fn into_table(self) -> Table {
        self.into()
    }
}

impl<T> IntoTable for T where T: Into<Table> + Sized {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_are_aligned() {
        let mut tab = Table::new();

        tab.set_header(vec!["KEY", "MODEL"]);
        tab.add_row(vec!["fast", "org/a-long-model"]);
        tab.add_row(vec!["deepseek-chat", "org/b"]);

        assert_eq!(
            tab.to_string(),
            "KEY            MODEL           \n\
             fast           org/a-long-model\n\
             deepseek-chat  org/b           \n"
        );
    }

    #[test]
    #[should_panic(expected = "same number of columns")]
    fn test_rejects_ragged_rows() {
        let mut tab = Table::new();

        tab.set_header(vec!["KEY", "MODEL"]);
        tab.add_row(vec!["fast"]);
    }
}
