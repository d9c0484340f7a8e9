// Daily usage events of the Tableau site, exported from the Admin Insights
// view and archived into the warehouse `usage_events` table.

use std::error::Error;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use duckdb::Connection;
use jiff::civil::Date;
use jiff::{Timestamp, Zoned};
use log::info;

use crate::api::tableau::session::TableauSession;
use crate::api::tableau::views::View;

// Column headers of the usage export, in the order they are archived.
const EXPECTED_COLUMNS: [&str; 5] = [
    "Event Id",
    "Event Date",
    "Event Type",
    "User Name",
    "Item Name",
];

pub struct TableauUsageArchive {
    pub base_dir: String,
    pub duckdb_path: String,
}

impl TableauUsageArchive {
    /// Return the csv filename for the day.  Does not check if the file exists.
    pub fn filename(&self, date: &Date) -> String {
        self.base_dir.to_owned()
            + "/Raw/"
            + &date.year().to_string()
            + "/usage_"
            + &date.to_string()
            + ".csv"
    }

    /// Normalized file ready to be inserted into the warehouse.
    pub fn tmp_filename(&self, date: &Date) -> String {
        self.base_dir.to_owned() + "/tmp/usage_" + &date.to_string() + ".csv"
    }

    /// Export the view data as csv and save today's raw file.
    pub fn download_file(
        &self,
        session: &TableauSession,
        view: &View,
    ) -> Result<(), Box<dyn Error>> {
        let body = view.data(session)?;
        let today: Date = Zoned::now().date();
        let path = self.filename(&today);
        let dir = Path::new(&path).parent().unwrap();
        fs::create_dir_all(dir)?;
        let mut out = File::create(&path)?;
        io::copy(&mut body.as_bytes(), &mut out)?;
        info!("Downloaded usage data to {}", path);
        Ok(())
    }

    /// Rewrite the raw export with snake_case headers and an appended
    /// `ingested_at` column.  Returns the number of data rows written.
    pub fn normalize_file(&self, date: &Date) -> Result<usize, Box<dyn Error>> {
        let raw_path = self.filename(date);
        let mut rdr = csv::Reader::from_path(&raw_path)?;
        let headers = rdr.headers()?.clone();
        let mut indices: Vec<usize> = Vec::new();
        for column in EXPECTED_COLUMNS {
            let position = headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(column))
                .ok_or_else(|| format!("column '{}' not found in {}", column, raw_path))?;
            indices.push(position);
        }

        let out_path = self.tmp_filename(date);
        fs::create_dir_all(Path::new(&out_path).parent().unwrap())?;
        let mut wtr = csv::Writer::from_path(&out_path)?;
        wtr.write_record([
            "event_id",
            "event_date",
            "event_type",
            "user_name",
            "item_name",
            "ingested_at",
        ])?;

        let ingested_at = Timestamp::now().strftime("%Y-%m-%d %H:%M:%S").to_string();
        let mut count = 0;
        for result in rdr.records() {
            let record = result?;
            let mut row: Vec<&str> = indices
                .iter()
                .map(|&i| record.get(i).unwrap_or(""))
                .collect();
            row.push(&ingested_at);
            wtr.write_record(&row)?;
            count += 1;
        }
        wtr.flush()?;

        Ok(count)
    }

    /// Insert the normalized file for the day and drop superseded ingestions.
    /// Returns (rows inserted, duplicate rows deleted).
    pub fn update_duckdb(&self, date: &Date) -> Result<(usize, usize), Box<dyn Error>> {
        info!("inserting usage events for {} ...", date);
        let conn = Connection::open(&self.duckdb_path)?;
        conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS usage_events (
    event_id VARCHAR NOT NULL,
    event_date DATE,
    event_type VARCHAR,
    user_name VARCHAR,
    item_name VARCHAR,
    ingested_at TIMESTAMP NOT NULL
);
            "#,
        )?;

        let insert = format!(
            r#"
INSERT INTO usage_events
    SELECT event_id, event_date, event_type, user_name, item_name, ingested_at
    FROM read_csv('{}', header = true, columns = {{
        'event_id': 'VARCHAR',
        'event_date': 'DATE',
        'event_type': 'VARCHAR',
        'user_name': 'VARCHAR',
        'item_name': 'VARCHAR',
        'ingested_at': 'TIMESTAMP'
    }});
            "#,
            self.tmp_filename(date)
        );
        let num_inserted = conn.execute(&insert, [])?;
        let num_deleted = remove_duplicate_ingestions(&conn)?;

        info!(
            "num_rows_inserted: {}. num_deleted_records: {}.",
            num_inserted, num_deleted
        );
        Ok((num_inserted, num_deleted))
    }
}

/// The insert keeps every ingestion of an event; this keeps only the latest
/// one per event id.  Returns the number of rows deleted.
pub fn remove_duplicate_ingestions(conn: &Connection) -> Result<usize, Box<dyn Error>> {
    conn.execute_batch(
        r#"
CREATE OR REPLACE TEMP TABLE _latest_event_ingestions AS
    SELECT
        event_id
    ,   MAX(ingested_at) AS latest_ingestion
    ,   COUNT(DISTINCT ingested_at) AS num_ingestions
    FROM usage_events
    GROUP BY 1
    HAVING num_ingestions > 1
;
        "#,
    )?;
    let num_deleted = conn.execute(
        r#"
DELETE FROM usage_events AS tou
USING _latest_event_ingestions AS lei
WHERE tou.event_id = lei.event_id
AND tou.ingested_at < lei.latest_ingestion;
        "#,
        [],
    )?;
    Ok(num_deleted)
}

#[cfg(test)]
mod tests {
    use std::error::Error;
    use std::fs;
    use std::path::Path;

    use duckdb::Connection;
    use jiff::civil::date;

    use super::*;

    const RAW_CSV: &str = "\
Event Id,Event Date,Event Type,User Name,Item Name
e1,2024-08-05,Access View,analyst@example.com,Seller Invoice
e2,2024-08-05,Publish Workbook,admin@example.com,Seller Invoices
";

    fn archive_in(dir: &Path) -> TableauUsageArchive {
        TableauUsageArchive {
            base_dir: dir.to_str().unwrap().to_string(),
            duckdb_path: dir.join("usage.duckdb").to_str().unwrap().to_string(),
        }
    }

    #[test]
    fn normalize_appends_ingestion_column() -> Result<(), Box<dyn Error>> {
        let dir = std::env::temp_dir().join("taurus_test_usage_normalize");
        let _ = fs::remove_dir_all(&dir);
        let archive = archive_in(&dir);

        let day = date(2024, 8, 5);
        let raw_path = archive.filename(&day);
        fs::create_dir_all(Path::new(&raw_path).parent().unwrap())?;
        fs::write(&raw_path, RAW_CSV)?;

        let count = archive.normalize_file(&day)?;
        assert_eq!(count, 2);

        let mut rdr = csv::Reader::from_path(archive.tmp_filename(&day))?;
        assert_eq!(
            rdr.headers()?,
            &csv::StringRecord::from(vec![
                "event_id",
                "event_date",
                "event_type",
                "user_name",
                "item_name",
                "ingested_at",
            ])
        );
        let rows: Vec<csv::StringRecord> = rdr.records().collect::<Result<_, _>>()?;
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "e1");
        assert!(!rows[0][5].is_empty());

        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn update_duckdb_inserts_normalized_rows() -> Result<(), Box<dyn Error>> {
        let dir = std::env::temp_dir().join("taurus_test_usage_update");
        let _ = fs::remove_dir_all(&dir);
        let archive = archive_in(&dir);

        let day = date(2024, 8, 5);
        let raw_path = archive.filename(&day);
        fs::create_dir_all(Path::new(&raw_path).parent().unwrap())?;
        fs::write(&raw_path, RAW_CSV)?;
        archive.normalize_file(&day)?;

        let (num_inserted, num_deleted) = archive.update_duckdb(&day)?;
        assert_eq!(num_inserted, 2);
        assert_eq!(num_deleted, 0);

        fs::remove_dir_all(&dir)?;
        Ok(())
    }

    #[test]
    fn duplicate_ingestions_keep_the_latest() -> Result<(), Box<dyn Error>> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            r#"
CREATE TABLE usage_events (
    event_id VARCHAR NOT NULL,
    event_date DATE,
    event_type VARCHAR,
    user_name VARCHAR,
    item_name VARCHAR,
    ingested_at TIMESTAMP NOT NULL
);
INSERT INTO usage_events VALUES
    ('e1', DATE '2024-08-05', 'Access View', 'analyst@example.com', 'Seller Invoice',
     TIMESTAMP '2024-08-06 01:00:00'),
    ('e1', DATE '2024-08-05', 'Access View', 'analyst@example.com', 'Seller Invoice',
     TIMESTAMP '2024-08-07 01:00:00'),
    ('e2', DATE '2024-08-05', 'Publish Workbook', 'admin@example.com', 'Seller Invoices',
     TIMESTAMP '2024-08-06 01:00:00');
            "#,
        )?;

        let num_deleted = remove_duplicate_ingestions(&conn)?;
        assert_eq!(num_deleted, 1);

        let remaining: usize =
            conn.query_row("SELECT count(*) FROM usage_events;", [], |row| row.get(0))?;
        assert_eq!(remaining, 2);
        let latest: String = conn.query_row(
            "SELECT strftime(ingested_at, '%Y-%m-%d') FROM usage_events WHERE event_id = 'e1';",
            [],
            |row| row.get(0),
        )?;
        assert_eq!(latest, "2024-08-07");
        Ok(())
    }

    #[ignore]
    #[test]
    fn download_usage_data() -> Result<(), Box<dyn Error>> {
        dotenvy::from_path(Path::new(".env/test.env")).unwrap();
        let session = TableauSession::from_env()?;
        let view = View::get(&session, "d398510b-7ed4-40c7-a560-d08464033063")?;
        let archive = crate::db::prod_db::ProdDb::tableau_usage();
        archive.download_file(&session, &view)?;
        session.sign_out()?;
        Ok(())
    }
}
