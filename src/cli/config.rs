use std::path::Path;

use crate::error::Result;
use crate::settings::{load_config, save_config, ConverterConfig};

pub fn init(path: &str) -> Result<()> {
    save_config(&ConverterConfig::default(), Path::new(path))?;
    println!("Wrote {path}");
    Ok(())
}

pub fn show(config: Option<&str>) -> Result<()> {
    let cfg = match config {
        Some(path) => load_config(Path::new(path))?,
        None => ConverterConfig::default(),
    };
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}
