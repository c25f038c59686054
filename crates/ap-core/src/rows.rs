//! Row sources: the ordered rows of one measurement.
//!
//! Parsing files into rows happens elsewhere; the aggregator only needs
//! column-wise access through [`RowSource`].

use ap_common::{Error, Result};

/// Borrowed view of one column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Column<'a> {
    /// Numeric values; `None` is missing (NaN is normalized to `None`).
    Numeric(&'a [Option<f64>]),
    Text(&'a [Option<String>]),
}

impl<'a> Column<'a> {
    pub fn len(&self) -> usize {
        match self {
            Column::Numeric(v) => v.len(),
            Column::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Numeric values, borrowed for the lifetime of the source rather than
    /// of this view.
    pub fn as_numeric(self) -> Option<&'a [Option<f64>]> {
        match self {
            Column::Numeric(v) => Some(v),
            Column::Text(_) => None,
        }
    }
}

/// Column-wise access to an ordered set of rows.
pub trait RowSource {
    /// Column names in source order.
    fn column_names(&self) -> Vec<String>;

    fn row_count(&self) -> usize;

    fn column(&self, name: &str) -> Option<Column<'_>>;
}

/// One input cell for [`MemoryRows::push_row`].
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Missing,
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Number(v)
    }
}

impl From<Option<f64>> for Cell {
    fn from(v: Option<f64>) -> Self {
        v.map_or(Cell::Missing, Cell::Number)
    }
}

impl From<&str> for Cell {
    fn from(v: &str) -> Self {
        Cell::Text(v.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ColumnData {
    Numeric(Vec<Option<f64>>),
    Text(Vec<Option<String>>),
}

impl ColumnData {
    fn view(&self) -> Column<'_> {
        match self {
            ColumnData::Numeric(v) => Column::Numeric(v),
            ColumnData::Text(v) => Column::Text(v),
        }
    }

    fn push(&mut self, cell: Cell) {
        match cell {
            Cell::Missing => match self {
                ColumnData::Numeric(v) => v.push(None),
                ColumnData::Text(v) => v.push(None),
            },
            Cell::Number(x) => match self {
                ColumnData::Numeric(v) => v.push((!x.is_nan()).then_some(x)),
                ColumnData::Text(v) => v.push(Some(x.to_string())),
            },
            Cell::Text(s) => {
                // a text cell demotes the whole column
                if let ColumnData::Numeric(nums) = self {
                    let texts = nums.iter().map(|x| x.map(|x| x.to_string())).collect();
                    *self = ColumnData::Text(texts);
                }
                if let ColumnData::Text(v) = self {
                    v.push(Some(s));
                }
            }
        }
    }
}

/// In-memory rows, built row by row or column by column.
///
/// A column is numeric until a text cell arrives in it, after which it is
/// text for good.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MemoryRows {
    names: Vec<String>,
    columns: Vec<ColumnData>,
    rows: usize,
}

impl MemoryRows {
    /// Empty source with the given header.
    pub fn new<I, S>(header: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = header.into_iter().map(Into::into).collect();
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(Error::Config(format!("duplicate column '{}'", name)));
            }
        }
        let columns = names
            .iter()
            .map(|_| ColumnData::Numeric(Vec::new()))
            .collect();
        Ok(Self {
            names,
            columns,
            rows: 0,
        })
    }

    /// Append one row; its width must match the header.
    pub fn push_row<I, C>(&mut self, row: I) -> Result<()>
    where
        I: IntoIterator<Item = C>,
        C: Into<Cell>,
    {
        let cells: Vec<Cell> = row.into_iter().map(Into::into).collect();
        if cells.len() != self.names.len() {
            return Err(Error::Config(format!(
                "row {} has {} cells, header has {}",
                self.rows,
                cells.len(),
                self.names.len()
            )));
        }
        for (column, cell) in self.columns.iter_mut().zip(cells) {
            column.push(cell);
        }
        self.rows += 1;
        Ok(())
    }

    /// Append a numeric column; its length must match the existing rows
    /// (any length when the source has no columns yet).
    pub fn with_numeric(mut self, name: impl Into<String>, values: Vec<Option<f64>>) -> Result<Self> {
        let values = values
            .into_iter()
            .map(|v| v.filter(|x| !x.is_nan()))
            .collect::<Vec<_>>();
        self.add_column(name.into(), ColumnData::Numeric(values))?;
        Ok(self)
    }

    /// Append a text column; its length must match the existing rows.
    pub fn with_text(mut self, name: impl Into<String>, values: Vec<Option<String>>) -> Result<Self> {
        self.add_column(name.into(), ColumnData::Text(values))?;
        Ok(self)
    }

    fn add_column(&mut self, name: String, data: ColumnData) -> Result<()> {
        let len = data.view().len();
        if self.names.contains(&name) {
            return Err(Error::Config(format!("duplicate column '{}'", name)));
        }
        if !self.names.is_empty() && len != self.rows {
            return Err(Error::Config(format!(
                "column '{}' has {} values, source has {} rows",
                name, len, self.rows
            )));
        }
        self.rows = len;
        self.names.push(name);
        self.columns.push(data);
        Ok(())
    }
}

impl RowSource for MemoryRows {
    fn column_names(&self) -> Vec<String> {
        self.names.clone()
    }

    fn row_count(&self) -> usize {
        self.rows
    }

    fn column(&self, name: &str) -> Option<Column<'_>> {
        let idx = self.names.iter().position(|n| n == name)?;
        Some(self.columns[idx].view())
    }
}
