use std::io::{self, Write};

use serde::Serialize;

use crate::app::{DataResult, DeleteResult, FindResult, ImportResult, ShowResult};

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_find(result: &FindResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_show(result: &ShowResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_data(result: &DataResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_import(result: &ImportResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_delete(result: &DeleteResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
