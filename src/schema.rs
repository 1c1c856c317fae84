table! {
    sheet_cells (id) {
        id -> Integer,
        sheet -> Text,
        row_index -> Integer,
        column_index -> Integer,
        value -> Text,
    }
}

pub const CREATE_SHEET_CELLS: &str = "CREATE TABLE IF NOT EXISTS sheet_cells (
    id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
    sheet TEXT NOT NULL,
    row_index INTEGER NOT NULL,
    column_index INTEGER NOT NULL,
    value TEXT NOT NULL,
    UNIQUE (sheet, row_index, column_index)
)";
