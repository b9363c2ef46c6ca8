//! Renders the `gauntlet(1)` manual page into `OUT_DIR`.

use std::env;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::CommandFactory;
use clap_mangen::Man;

#[path = "src/cli/mod.rs"]
mod cli;

const MAN_PAGE: &str = "gauntlet.1";

fn main() -> Result<(), Box<dyn Error>> {
    let mut cargo = io::stdout();
    for watched in ["build.rs", "src/cli/mod.rs"] {
        writeln!(cargo, "cargo:rerun-if-changed={watched}")?;
    }

    let Some(out_dir) = env::var_os("OUT_DIR").map(PathBuf::from) else {
        return Err(Box::new(io::Error::new(
            io::ErrorKind::NotFound,
            "OUT_DIR is not set; run through cargo",
        )));
    };

    let command = cli::Cli::command().name("gauntlet");
    let mut page = Vec::new();
    Man::new(command).render(&mut page)?;
    fs::write(out_dir.join(MAN_PAGE), page)?;
    Ok(())
}
