//! Build script rendering the `streamplex` manual page and shell completions
//! from the CLI definition.

use std::{
    fs,
    path::{Path, PathBuf},
};

use clap::{CommandFactory, ValueEnum};
use clap_complete::{Shell, generate_to};
use clap_mangen::Man;

#[path = "src/cli.rs"]
#[allow(dead_code, reason = "only the command definition is needed here")]
mod cli;

const BIN_NAME: &str = "streamplex";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("cargo:rerun-if-changed=src/cli.rs");

    let out_root = PathBuf::from("target");
    render_man(&out_root.join("generated-man"))?;
    render_completions(&out_root.join("generated-completions"))?;
    Ok(())
}

fn render_man(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    let mut page = Vec::new();
    Man::new(cli::Cli::command()).render(&mut page)?;
    fs::write(dir.join(format!("{BIN_NAME}.1")), page)?;
    Ok(())
}

fn render_completions(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(dir)?;
    let mut cmd = cli::Cli::command();
    for shell in Shell::value_variants() {
        generate_to(*shell, &mut cmd, BIN_NAME, dir)?;
    }
    Ok(())
}
