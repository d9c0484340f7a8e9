pub mod prod_db;
pub mod seller_invoices;
pub mod tableau_usage;
