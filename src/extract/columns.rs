//! Statically declared report columns and header matching

use crate::extract::Cell;
use std::fmt;

/// How a column's cells are read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Trimmed string; missing cells read as empty
    Text,

    /// Float-tolerant integer; missing or non-numeric cells read as 0
    Integer,
}

/// Header text and read kind of a report column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub header: &'static str,
    pub kind: ColumnKind,
}

/// Columns that must be present in the metric-ton section header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Column {
    ProductId,
    ProductName,
    DeliveryBasisName,
    Volume,
    Total,
    Count,
}

impl Column {
    /// Every required column, in declaration order
    pub const ALL: [Column; 6] = [
        Column::ProductId,
        Column::ProductName,
        Column::DeliveryBasisName,
        Column::Volume,
        Column::Total,
        Column::Count,
    ];

    pub fn descriptor(&self) -> ColumnDescriptor {
        match self {
            Self::ProductId => ColumnDescriptor {
                header: "Код\nИнструмента",
                kind: ColumnKind::Text,
            },
            Self::ProductName => ColumnDescriptor {
                header: "Наименование\nИнструмента",
                kind: ColumnKind::Text,
            },
            Self::DeliveryBasisName => ColumnDescriptor {
                header: "Базис\nпоставки",
                kind: ColumnKind::Text,
            },
            Self::Volume => ColumnDescriptor {
                header: "Объем\nДоговоров\nв единицах\nизмерения",
                kind: ColumnKind::Integer,
            },
            // The report itself spells this header with "Обьем"
            Self::Total => ColumnDescriptor {
                header: "Обьем\nДоговоров,\nруб.",
                kind: ColumnKind::Integer,
            },
            Self::Count => ColumnDescriptor {
                header: "Количество\nДоговоров,\nшт.",
                kind: ColumnKind::Integer,
            },
        }
    }

    pub fn header(&self) -> &'static str {
        self.descriptor().header
    }

    pub fn kind(&self) -> ColumnKind {
        self.descriptor().kind
    }

    fn slot(&self) -> usize {
        match self {
            Self::ProductId => 0,
            Self::ProductName => 1,
            Self::DeliveryBasisName => 2,
            Self::Volume => 3,
            Self::Total => 4,
            Self::Count => 5,
        }
    }

    fn from_header(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|column| column.header() == text)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.header().replace('\n', " "))
    }
}

/// Column positions resolved from a header row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    indices: [usize; 6],
}

impl ColumnMap {
    /// Matches header cells (trimmed, exact text) to the required columns
    ///
    /// Order does not matter. If a header appears more than once the last
    /// occurrence wins.
    ///
    /// # Returns
    ///
    /// * `Ok(ColumnMap)` - Every required column was found
    /// * `Err(Vec<Column>)` - The columns that were not found
    pub fn from_header_row(row: &[Cell]) -> Result<Self, Vec<Column>> {
        let mut found: [Option<usize>; 6] = [None; 6];

        for (index, cell) in row.iter().enumerate() {
            if let Some(column) = cell.as_text().and_then(|t| Column::from_header(t.trim())) {
                found[column.slot()] = Some(index);
            }
        }

        let missing: Vec<Column> = Column::ALL
            .into_iter()
            .filter(|column| found[column.slot()].is_none())
            .collect();

        if !missing.is_empty() {
            return Err(missing);
        }

        let mut indices = [0usize; 6];
        for column in Column::ALL {
            if let Some(index) = found[column.slot()] {
                indices[column.slot()] = index;
            }
        }

        Ok(Self { indices })
    }

    /// Cell index of the given column
    pub fn index_of(&self, column: Column) -> usize {
        self.indices[column.slot()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> Cell {
        Cell::Text(s.to_string())
    }

    fn header_row() -> Vec<Cell> {
        vec![
            Cell::Empty,
            text("Код\nИнструмента"),
            text("Наименование\nИнструмента"),
            text("Базис\nпоставки"),
            text("Объем\nДоговоров\nв единицах\nизмерения"),
            text("Обьем\nДоговоров,\nруб."),
            text("Изменение рыночной\nцены к цене\nпредыдуего\nдня"),
            text("Количество\nДоговоров,\nшт."),
        ]
    }

    #[test]
    fn test_full_header_maps_indices() {
        let map = ColumnMap::from_header_row(&header_row()).unwrap();
        assert_eq!(map.index_of(Column::ProductId), 1);
        assert_eq!(map.index_of(Column::ProductName), 2);
        assert_eq!(map.index_of(Column::DeliveryBasisName), 3);
        assert_eq!(map.index_of(Column::Volume), 4);
        assert_eq!(map.index_of(Column::Total), 5);
        assert_eq!(map.index_of(Column::Count), 7);
    }

    #[test]
    fn test_header_order_independent() {
        let mut row = header_row();
        row.reverse();
        let map = ColumnMap::from_header_row(&row).unwrap();
        assert_eq!(map.index_of(Column::Count), 0);
        assert_eq!(map.index_of(Column::ProductId), 6);
    }

    #[test]
    fn test_header_cells_are_trimmed() {
        let mut row = header_row();
        row[1] = text("  Код\nИнструмента \n");
        assert!(ColumnMap::from_header_row(&row).is_ok());
    }

    #[test]
    fn test_missing_columns_reported() {
        let mut row = header_row();
        row.remove(7);
        row.remove(3);

        let missing = ColumnMap::from_header_row(&row).unwrap_err();
        assert_eq!(missing, vec![Column::DeliveryBasisName, Column::Count]);
    }

    #[test]
    fn test_descriptor_kinds() {
        assert_eq!(Column::ProductId.kind(), ColumnKind::Text);
        assert_eq!(Column::Volume.kind(), ColumnKind::Integer);
        assert_eq!(Column::Count.kind(), ColumnKind::Integer);
    }

    #[test]
    fn test_display_flattens_newlines() {
        assert_eq!(Column::ProductId.to_string(), "Код Инструмента");
    }
}
