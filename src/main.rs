// Entry point for the por-bridge command line tool
use clap::Parser;
use log::{error, LevelFilter};
use por_bridge::{execute, Opt, GLOBAL_CONFIG};
use std::process;

fn main() {
    env_logger::builder().filter_level(LevelFilter::Info).init();

    let opt = Opt::parse();

    // settings come from POR_CONFIG and POR_* overrides, see config::settings
    let config = GLOBAL_CONFIG.get();
    match execute(&opt, &config) {
        Ok(output) => println!("{output}"),
        Err(e) => {
            error!("Error: {e}");
            process::exit(1);
        }
    }
}
