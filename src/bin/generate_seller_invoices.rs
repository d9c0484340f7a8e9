use std::{error::Error, path::Path};

use clap::Parser;
use jiff::civil::Date;
use log::info;

use taurus::api::tableau::session::TableauSession;
use taurus::api::tableau::views::View;
use taurus::db::prod_db::ProdDb;
use taurus::db::seller_invoices::{ComboFilter, ViewRenderer};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Tableau view id to be used as the invoice
    #[arg(short, long, default_value = "ad13d3e8-bf32-4884-9578-21d7319b3fd1")]
    invoice_view_id: String,

    /// Full path to destination directory to save invoices
    #[arg(short, long)]
    output_folder: String,

    /// Comma-separated list of vendor names for which to generate invoices
    #[arg(short, long, value_delimiter = ',')]
    vendor_names: Option<Vec<String>>,

    /// Comma-separated list of seller names for which to generate invoices
    #[arg(short, long, value_delimiter = ',')]
    seller_names: Option<Vec<String>>,

    /// Starting week for which to generate invoices in format YYYY-MM-DD.
    /// Date should be a Monday.
    #[arg(short = 'w', long)]
    start_week: Option<Date>,

    /// Ending week for which to generate invoices in format YYYY-MM-DD.
    /// Date should be a Monday.
    #[arg(short = 'e', long)]
    end_week: Option<Date>,

    /// Environment name, e.g., test, prod
    #[arg(long, default_value = "prod")]
    env: String,
}

fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str())).unwrap();

    let mut archive = ProdDb::seller_invoices();
    archive.base_dir = args.output_folder;

    let filter = ComboFilter {
        vendor_names: args.vendor_names,
        seller_names: args.seller_names,
        start_week: args.start_week,
        end_week: args.end_week,
    };
    let combos = archive.distinct_combinations(&filter)?;
    info!("Found {} seller/vendor/week combination(s)", combos.len());

    let session = TableauSession::from_env()?;
    let view = View::get(&session, &args.invoice_view_id)?;
    let renderer = ViewRenderer {
        session: &session,
        view: &view,
    };
    archive.generate(&renderer, &combos)?;
    session.sign_out()?;

    Ok(())
}
