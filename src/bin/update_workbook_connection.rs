use std::{error::Error, path::Path};

use clap::Parser;

use taurus::api::tableau::session::TableauSession;
use taurus::api::tableau::workbooks::{ConnectionUpdate, Workbook};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Id of the workbook whose connection to update
    #[arg(short, long)]
    workbook_id: String,

    /// Id of the connection to update
    #[arg(short, long)]
    connection_id: String,

    /// New server address for the connection
    #[arg(long)]
    server_address: Option<String>,

    /// New server port for the connection
    #[arg(long)]
    server_port: Option<String>,

    /// New user name for the connection
    #[arg(short, long)]
    user_name: Option<String>,

    /// New password for the connection
    #[arg(short, long)]
    password: Option<String>,

    /// Embed the password in the connection
    #[arg(long, action = clap::ArgAction::Set, default_value_t = true)]
    embed_password: bool,

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
    let workbook = Workbook::get(&session, &args.workbook_id)?;
    let update = ConnectionUpdate {
        server_address: args.server_address,
        server_port: args.server_port,
        user_name: args.user_name,
        password: args.password,
        embed_password: args.embed_password,
    };
    workbook.update_connection(&session, &args.connection_id, &update)?;
    session.sign_out()?;

    Ok(())
}
