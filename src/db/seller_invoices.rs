// Batch generation of the weekly 3PN seller invoices: one PDF per distinct
// (vendor, seller, week) combination with shipped quantity, exported from the
// invoice view and filed under {output root}/{vendor}/{seller}/.

use std::error::Error;
use std::fs::{self, File};
use std::io;
use std::path::Path;

use duckdb::Connection;
use itertools::Itertools;
use jiff::civil::Date;
use jiff::ToSpan;
use log::{debug, error, info};

use crate::api::tableau::session::TableauSession;
use crate::api::tableau::views::{View, ViewFilter};

// Filter names have to match exactly with those defined on the invoice
// report, including casing.
pub const WEEK_FILTER_NAME: &str = "Week";
pub const SELLER_FILTER_NAME: &str = "Seller";
pub const VENDOR_FILTER_NAME: &str = "Brand";

const BASE_FILE_NAME: &str = "Seller Invoice";

/// One (vendor, seller, week) triple requiring an invoice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterCombination {
    pub vendor: String,
    pub seller: String,
    pub week: Date,
}

/// Optional restrictions on which combinations to enumerate.  With none
/// supplied, every historical combination is returned.
#[derive(Debug, Clone, Default)]
pub struct ComboFilter {
    pub vendor_names: Option<Vec<String>>,
    pub seller_names: Option<Vec<String>>,
    pub start_week: Option<Date>,
    pub end_week: Option<Date>,
}

/// The rendering capability the driver needs: produce the invoice document
/// for one set of view filters.
pub trait InvoiceRenderer {
    fn render_pdf(&self, filters: &[ViewFilter]) -> Result<Vec<u8>, Box<dyn Error>>;
}

/// Renders through the live view of an authenticated session.
pub struct ViewRenderer<'a> {
    pub session: &'a TableauSession,
    pub view: &'a View,
}

impl InvoiceRenderer for ViewRenderer<'_> {
    fn render_pdf(&self, filters: &[ViewFilter]) -> Result<Vec<u8>, Box<dyn Error>> {
        self.view.pdf(self.session, filters)
    }
}

pub struct SellerInvoiceArchive {
    pub base_dir: String,
    pub duckdb_path: String,
}

impl SellerInvoiceArchive {
    /// Folder for one combination.  The vendor and seller segments are not
    /// sanitized; a '/' in either name nests an extra directory level.
    pub fn folder(&self, combo: &FilterCombination) -> String {
        format!("{}/{}/{}", self.base_dir, combo.vendor, combo.seller)
    }

    /// Full path of the invoice pdf for one combination.  Only the file name
    /// component has '/' replaced with '-'.
    pub fn filename(&self, combo: &FilterCombination) -> String {
        let name = format!(
            "{} - {} - {} - {}",
            BASE_FILE_NAME, combo.vendor, combo.seller, combo.week
        )
        .replace('/', "-");
        format!("{}/{}.pdf", self.folder(combo), name)
    }

    /// The distinct (vendor, seller, week) combinations requiring an invoice,
    /// ordered by vendor, seller, week.
    pub fn distinct_combinations(
        &self,
        filter: &ComboFilter,
    ) -> Result<Vec<FilterCombination>, Box<dyn Error>> {
        let conn = Connection::open(&self.duckdb_path)?;
        distinct_combinations(&conn, filter)
    }

    /// Generate one invoice per combination, strictly in order.  Returns the
    /// number of documents written.  The first render or write failure aborts
    /// the whole run; documents already written stay on disk, and a re-run
    /// overwrites them at the same paths.
    pub fn generate(
        &self,
        renderer: &dyn InvoiceRenderer,
        combos: &[FilterCombination],
    ) -> Result<u32, Box<dyn Error>> {
        let mut num_invoices_created: u32 = 0;

        for combo in combos {
            debug!("combination: {:?}", combo);
            let filters = vec![
                ViewFilter::new(WEEK_FILTER_NAME, combo.week.to_string()),
                ViewFilter::new(SELLER_FILTER_NAME, combo.seller.as_str()),
                ViewFilter::new(VENDOR_FILTER_NAME, combo.vendor.as_str()),
            ];
            let pdf = renderer.render_pdf(&filters)?;

            let folder = self.folder(combo);
            if let Err(e) = fs::create_dir_all(&folder) {
                error!("failed to create directory {}: {}", folder, e);
                return Err(Box::new(e));
            }
            let path = self.filename(combo);
            if let Err(e) = write_bytes(&path, &pdf) {
                error!("failed to write {}: {}", path, e);
                return Err(Box::new(e));
            }
            info!("Created Invoice {}", path);
            num_invoices_created += 1;
        }

        info!("Created {} invoice(s).", num_invoices_created);
        Ok(num_invoices_created)
    }
}

fn write_bytes(path: &str, bytes: &[u8]) -> Result<(), io::Error> {
    let mut out = File::create(Path::new(path))?;
    io::copy(&mut &bytes[..], &mut out)?;
    Ok(())
}

// Preparatory steps of the combination query.  Temp tables are scoped to the
// connection and dropped with it.  The offset lookup covers old shipments
// that don't carry a warehouse id; the final query falls back to UTC when
// neither source matches.
const COMBOS_PREP_SQL: &str = r#"
CREATE OR REPLACE TEMP TABLE _addresses_timezones AS
    SELECT DISTINCT
        sadd.id AS address_id
    ,   wh.utc_offset AS utc_offset
    FROM shipping.addresses sadd
    JOIN shipping.shipments ship ON sadd.id = ship.ship_from_address_id
        AND ship._fivetran_deleted IS DISTINCT FROM TRUE
    JOIN marketplace.customer_addresses cadd ON sadd.city = cadd.city
        AND cadd._fivetran_deleted IS DISTINCT FROM TRUE
    JOIN marketplace.warehouses wh ON cadd.warehouse_id = wh.id
        AND wh._fivetran_deleted IS DISTINCT FROM TRUE
    WHERE sadd._fivetran_deleted IS DISTINCT FROM TRUE
;

CREATE OR REPLACE TEMP TABLE _product_info AS
    SELECT DISTINCT
        sa.seller_sku
    ,   FIRST_VALUE(COALESCE(tvend.name, cvend.vendor_name) IGNORE NULLS) OVER (
            PARTITION BY sa.seller_sku
            ORDER BY prod.deleted_at DESC, prod.created_at DESC
        ) AS brand
    FROM threepn.seller_asins sa
    JOIN threepn.asins asin ON sa.asin_id = asin.id
        AND asin._fivetran_deleted IS DISTINCT FROM TRUE
    LEFT JOIN threepn.vendors tvend ON asin.vendor_id = tvend.id
        AND tvend._fivetran_deleted IS DISTINCT FROM TRUE
    LEFT JOIN marketplace.threepn_map tpmap ON sa.id = tpmap.seller_asin_id
    LEFT JOIN marketplace.products prod ON tpmap.product_id = prod.id
        AND prod._fivetran_deleted IS DISTINCT FROM TRUE
    LEFT JOIN marketplace.vendors cvend ON prod.vendor_id = cvend.id
        AND cvend._fivetran_deleted IS DISTINCT FROM TRUE
    WHERE sa._fivetran_deleted IS DISTINCT FROM TRUE
;

CREATE OR REPLACE TEMP TABLE _final AS
    SELECT
        pi.brand
    ,   sell.name AS seller_name
    ,   DATE_TRUNC('week',
            ship.start_time + to_hours(COALESCE(wh.utc_offset, addtz.utc_offset, 0))
        )::DATE AS week
    FROM shipping.shipments ship
    JOIN shipping.shipment_items si ON ship.id = si.shipment_id
        AND si._fivetran_deleted IS DISTINCT FROM TRUE
    JOIN shipping.seller_skus sku ON si.seller_sku_id = sku.id
        AND sku._fivetran_deleted IS DISTINCT FROM TRUE
    JOIN threepn.seller_keys sk ON ship.seller_key_id = sk.id
        AND sk._fivetran_deleted IS DISTINCT FROM TRUE
    JOIN threepn.sellers sell ON sk.seller_id = sell.id
        AND sell._fivetran_deleted IS DISTINCT FROM TRUE
    LEFT JOIN _addresses_timezones addtz ON ship.ship_from_address_id = addtz.address_id
    LEFT JOIN marketplace.warehouses wh ON ship.warehouse_id = wh.id
        AND wh._fivetran_deleted IS DISTINCT FROM TRUE
    LEFT JOIN _product_info pi ON sku.sku = pi.seller_sku
    WHERE ship._fivetran_deleted IS DISTINCT FROM TRUE
    AND ship.seller_key_id IS NOT NULL -- 3PN only
    AND ship.shipment_status_id NOT IN (4, 8) -- 'Cancelled', 'Deleted'
    AND pi.brand IS NOT NULL
;
"#;

/// The final select over the prepared temp tables, with one `AND` clause per
/// supplied optional filter.
pub fn combos_select(filter: &ComboFilter) -> String {
    let mut query = String::from(
        r#"
SELECT DISTINCT
    fin.brand
,   fin.seller_name
,   fin.week
FROM _final fin
WHERE TRUE"#,
    );
    if let Some(vendors) = &filter.vendor_names {
        query.push_str(&format!("\nAND fin.brand IN ({})", quoted_list(vendors)));
    }
    if let Some(sellers) = &filter.seller_names {
        query.push_str(&format!(
            "\nAND fin.seller_name IN ({})",
            quoted_list(sellers)
        ));
    }
    if let Some(start_week) = filter.start_week {
        query.push_str(&format!("\nAND fin.week >= '{}'", start_week));
    }
    if let Some(end_week) = filter.end_week {
        query.push_str(&format!("\nAND fin.week <= '{}'", end_week));
    }
    query.push_str("\nORDER BY fin.brand, fin.seller_name, fin.week;");
    query
}

/// The whole combination script, for logging and inspection.
pub fn combos_query(filter: &ComboFilter) -> String {
    format!("{}\n{}", COMBOS_PREP_SQL, combos_select(filter))
}

/// Run the combination script on an open warehouse connection, preserving the
/// result order.
pub fn distinct_combinations(
    conn: &Connection,
    filter: &ComboFilter,
) -> Result<Vec<FilterCombination>, Box<dyn Error>> {
    debug!("combination query: {}", combos_query(filter));
    conn.execute_batch(COMBOS_PREP_SQL)?;

    let select = combos_select(filter);
    let mut stmt = conn.prepare(&select)?;
    let combos_iter = stmt.query_map([], |row| {
        let n = 719528 + row.get::<usize, i32>(2)?;
        Ok(FilterCombination {
            vendor: row.get::<usize, String>(0)?,
            seller: row.get::<usize, String>(1)?,
            week: Date::ZERO.checked_add(n.days()).unwrap(),
        })
    })?;

    let mut combos: Vec<FilterCombination> = Vec::new();
    for combo in combos_iter {
        combos.push(combo?);
    }
    Ok(combos)
}

fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn quoted_list(names: &[String]) -> String {
    names.iter().map(|n| quote(n)).join(", ")
}
