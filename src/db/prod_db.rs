use std::env;

use crate::db::seller_invoices::SellerInvoiceArchive;
use crate::db::tableau_usage::TableauUsageArchive;

pub struct ProdDb {}

impl ProdDb {
    pub fn seller_invoices() -> SellerInvoiceArchive {
        SellerInvoiceArchive {
            base_dir: archive_dir() + "/SellerInvoices",
            duckdb_path: warehouse_path(),
        }
    }

    pub fn tableau_usage() -> TableauUsageArchive {
        TableauUsageArchive {
            base_dir: archive_dir() + "/TableauUsage",
            duckdb_path: warehouse_path(),
        }
    }
}

fn archive_dir() -> String {
    env::var("TABLEAU_ARCHIVE_DIR")
        .unwrap_or_else(|_| "/home/tableau/Downloads/Archive".to_string())
}

fn warehouse_path() -> String {
    env::var("WAREHOUSE_DUCKDB_PATH")
        .unwrap_or_else(|_| "/home/tableau/Downloads/Archive/DuckDB/warehouse.duckdb".to_string())
}
