use std::{error::Error, path::Path};

use clap::Parser;

use taurus::api::tableau::datasources::{extract_hyper, Datasource};
use taurus::api::tableau::session::TableauSession;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Id of the datasource to download
    #[arg(short, long)]
    datasource_id: String,

    /// Full path to destination directory to save the datasource
    #[arg(short, long)]
    output_folder: String,

    /// Extract the hyper file from the downloaded tdsx bundle
    #[arg(long)]
    extract_hyper: bool,

    /// Delete the tdsx bundle after extraction
    #[arg(long)]
    delete_zip_file: bool,

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

    let session = TableauSession::from_env()?;
    let datasource = Datasource::get(&session, &args.datasource_id)?;
    let zip_path = datasource.download(&session, Path::new(&args.output_folder))?;
    session.sign_out()?;

    if args.extract_hyper {
        extract_hyper(
            &zip_path,
            Path::new(&args.output_folder),
            None,
            args.delete_zip_file,
        )?;
    }

    Ok(())
}
