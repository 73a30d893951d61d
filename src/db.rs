use rusqlite::Connection;
use std::path::Path;

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let db_path = workspace.join("rollcall.sqlite3");
    let conn = Connection::open(db_path)?;
    conn.execute("PRAGMA foreign_keys = ON", [])?;

    // staff_code is stored normalized (trimmed, upper-cased); lookups
    // normalize the probe the same way, which makes resolution
    // case-insensitive without COLLATE tricks.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff(
            id TEXT PRIMARY KEY,
            staff_code TEXT NOT NULL UNIQUE,
            last_name TEXT NOT NULL,
            first_name TEXT NOT NULL,
            role TEXT,
            active INTEGER NOT NULL,
            sort_order INTEGER NOT NULL,
            updated_at TEXT
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_sort ON staff(sort_order)",
        [],
    )?;

    // day is the UTC calendar date of checked_in_at_ms. The UNIQUE pair is
    // what collapses a double-scan race into one row.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS staff_attendance(
            id TEXT PRIMARY KEY,
            staff_id TEXT NOT NULL,
            day TEXT NOT NULL,
            checked_in_at TEXT NOT NULL,
            checked_in_at_ms INTEGER NOT NULL,
            status TEXT NOT NULL,
            UNIQUE(staff_id, day),
            FOREIGN KEY(staff_id) REFERENCES staff(id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_attendance_staff ON staff_attendance(staff_id)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_staff_attendance_day ON staff_attendance(day)",
        [],
    )?;

    // Workspaces created before roles existed lack the column. Add if needed.
    ensure_staff_role(&conn)?;

    Ok(conn)
}

fn ensure_staff_role(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "staff", "role")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE staff ADD COLUMN role TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}
