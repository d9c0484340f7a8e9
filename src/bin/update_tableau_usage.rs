use std::{error::Error, path::Path};

use clap::Parser;
use jiff::Zoned;

use taurus::api::tableau::session::TableauSession;
use taurus::api::tableau::views::View;
use taurus::db::prod_db::ProdDb;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// View id of the usage events export
    #[arg(short, long, default_value = "d398510b-7ed4-40c7-a560-d08464033063")]
    usage_view_id: String,

    /// Environment name, e.g., test, prod
    #[arg(long, default_value = "prod")]
    env: String,
}

/// Run this job daily, after the Admin Insights refresh.
fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    dotenvy::from_path(Path::new(format!(".env/{}.env", args.env).as_str())).unwrap();

    let archive = ProdDb::tableau_usage();
    let session = TableauSession::from_env()?;
    let view = View::get(&session, &args.usage_view_id)?;
    archive.download_file(&session, &view)?;
    session.sign_out()?;

    let today = Zoned::now().date();
    archive.normalize_file(&today)?;
    archive.update_duckdb(&today)?;

    Ok(())
}
