use super::{Row, StoreError, TabularStore};
use crate::models::SheetCell;
use crate::schema::sheet_cells::dsl as cells;
use crate::schema::CREATE_SHEET_CELLS;

use diesel::dsl::max;
use diesel::prelude::*;
use log::debug;
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Sheets kept cell by cell in a local SQLite database.
pub struct SqliteStore {
    connection: Mutex<SqliteConnection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let connection = SqliteConnection::establish(path)?;
        diesel::sql_query(CREATE_SHEET_CELLS).execute(&connection)?;
        Ok(SqliteStore {
            connection: Mutex::new(connection),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        SqliteStore::open(":memory:")
    }

    fn connection(&self) -> MutexGuard<'_, SqliteConnection> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn to_index(value: u32) -> Result<i32, StoreError> {
    if value == 0 || value > i32::max_value() as u32 {
        return Err(StoreError::Malformed(format!(
            "sheet coordinates start at 1, got {}",
            value
        )));
    }
    Ok(value as i32)
}

impl TabularStore for SqliteStore {
    fn read_all(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        let connection = self.connection();
        let loaded = cells::sheet_cells
            .filter(cells::sheet.eq(table))
            .order((cells::row_index.asc(), cells::column_index.asc()))
            .load::<SheetCell>(&*connection)?;

        let mut grid: BTreeMap<i32, BTreeMap<i32, String>> = BTreeMap::new();
        for cell in loaded {
            grid.entry(cell.row_index)
                .or_insert_with(BTreeMap::new)
                .insert(cell.column_index, cell.value);
        }
        let headers = match grid.remove(&1) {
            Some(headers) => headers,
            None => return Ok(Vec::new()),
        };
        let last_row = grid.keys().next_back().cloned().unwrap_or(1);

        // Rows with no cells at all still occupy a position in the sheet.
        Ok((2..=last_row)
            .map(|row_index| {
                let row = grid.get(&row_index);
                headers
                    .iter()
                    .map(|(column, header)| {
                        let value = row
                            .and_then(|row| row.get(column))
                            .cloned()
                            .unwrap_or_default();
                        (header.trim().to_owned(), value)
                    })
                    .collect()
            })
            .collect())
    }

    fn write_cell(
        &self,
        table: &str,
        row: u32,
        column: u32,
        value: &str,
    ) -> Result<(), StoreError> {
        let (row, column) = (to_index(row)?, to_index(column)?);
        let connection = self.connection();
        debug!("{} row {} column {} <- {:?}", table, row, column, value);
        let updated = diesel::update(
            cells::sheet_cells
                .filter(cells::sheet.eq(table))
                .filter(cells::row_index.eq(row))
                .filter(cells::column_index.eq(column)),
        )
        .set(cells::value.eq(value))
        .execute(&*connection)?;
        if updated == 0 {
            diesel::insert_into(cells::sheet_cells)
                .values((
                    cells::sheet.eq(table),
                    cells::row_index.eq(row),
                    cells::column_index.eq(column),
                    cells::value.eq(value),
                ))
                .execute(&*connection)?;
        }
        Ok(())
    }

    fn append_row(&self, table: &str, values: &[String]) -> Result<(), StoreError> {
        let connection = self.connection();
        connection.transaction::<_, diesel::result::Error, _>(|| {
            let last_row = cells::sheet_cells
                .filter(cells::sheet.eq(table))
                .select(max(cells::row_index))
                .first::<Option<i32>>(&*connection)?;
            let row = last_row.unwrap_or(0) + 1;
            debug!("{} appending row {}", table, row);
            for (offset, value) in values.iter().enumerate() {
                diesel::insert_into(cells::sheet_cells)
                    .values((
                        cells::sheet.eq(table),
                        cells::row_index.eq(row),
                        cells::column_index.eq(offset as i32 + 1),
                        cells::value.eq(value.as_str()),
                    ))
                    .execute(&*connection)?;
            }
            Ok(())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::tests::strings;

    fn seeded() -> SqliteStore {
        let store = SqliteStore::in_memory().unwrap();
        store
            .append_row("Usuarios", &strings(&["Email", "Nome", "Nivel"]))
            .unwrap();
        store
            .append_row("Usuarios", &strings(&["ana@example.org", "Ana", "AV1"]))
            .unwrap();
        store
    }

    #[test]
    fn appended_rows_are_read_back_by_header() {
        let store = seeded();
        store
            .append_row("Usuarios", &strings(&["bia@example.org", "Bia"]))
            .unwrap();
        let rows = store.read_all("Usuarios").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["Nome"], "Ana");
        assert_eq!(rows[1]["Email"], "bia@example.org");
        assert_eq!(rows[1]["Nivel"], "");
    }

    #[test]
    fn write_cell_updates_and_inserts() {
        let store = seeded();
        store.write_cell("Usuarios", 2, 2, "Ana Paula").unwrap();
        store.write_cell("Usuarios", 2, 3, "").unwrap();
        store.write_cell("Usuarios", 4, 1, "gap@example.org").unwrap();
        let rows = store.read_all("Usuarios").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0]["Nome"], "Ana Paula");
        assert_eq!(rows[0]["Nivel"], "");
        assert_eq!(rows[1]["Email"], "");
        assert_eq!(rows[2]["Email"], "gap@example.org");
    }

    #[test]
    fn tables_are_independent() {
        let store = seeded();
        assert!(store.read_all("Diretores").unwrap().is_empty());
        store
            .append_row("Diretores", &strings(&["Email", "Departamento"]))
            .unwrap();
        assert!(store.read_all("Diretores").unwrap().is_empty());
        assert_eq!(store.read_all("Usuarios").unwrap().len(), 1);
    }

    #[test]
    fn zero_coordinates_are_rejected() {
        let store = seeded();
        assert!(store.write_cell("Usuarios", 0, 1, "x").is_err());
        assert!(store.write_cell("Usuarios", 1, 0, "x").is_err());
    }
}
