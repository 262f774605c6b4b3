//! Output formatting: human-readable (colored glyphs, tables) or `--json`.

use console::style;
use serde::Serialize;
use std::fmt::Display;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy)]
enum OutputFormat {
    Human,
    Json,
}

pub struct OutputWriter {
    format: OutputFormat,
}

impl OutputWriter {
    pub fn new(json: bool) -> Self {
        Self { format: if json { OutputFormat::Json } else { OutputFormat::Human } }
    }

    pub fn is_json(&self) -> bool {
        matches!(self.format, OutputFormat::Json)
    }

    pub fn success(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => println!("{} {}", style("\u{2713}").green().bold(), message),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"status": "success", "message": message.to_string()}))
            }
        }
    }

    pub fn info(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => println!("{} {}", style("i").blue().bold(), message),
            OutputFormat::Json => {
                println!("{}", serde_json::json!({"status": "info", "message": message.to_string()}))
            }
        }
    }

    pub fn warning(&self, message: impl Display) {
        match self.format {
            OutputFormat::Human => eprintln!("{} {}", style("!").yellow().bold(), message),
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"status": "warning", "message": message.to_string()}))
            }
        }
    }

    /// A single spec §7 diagnostic line: `E\t<path>\t<message>`.
    pub fn error_line(&self, path: &str, message: impl Display) {
        match self.format {
            OutputFormat::Human => eprintln!("E\t{path}\t{message}"),
            OutputFormat::Json => {
                eprintln!("{}", serde_json::json!({"status": "error", "path": path, "message": message.to_string()}))
            }
        }
    }

    /// A spec §7 success line: `<tag>\t<path>` (`U`/`A`/`D`).
    pub fn entry_line(&self, tag: char, path: &str) {
        match self.format {
            OutputFormat::Human => println!("{tag}\t{path}"),
            OutputFormat::Json => println!("{}", serde_json::json!({"op": tag.to_string(), "path": path})),
        }
    }

    pub fn table<T: Tabled>(&self, data: Vec<T>) {
        if data.is_empty() {
            if !self.is_json() {
                println!("{}", style("(no entries)").dim());
            } else {
                println!("[]");
            }
            return;
        }
        match self.format {
            OutputFormat::Human => {
                let mut table = Table::new(data);
                table.with(Style::rounded());
                println!("{table}");
            }
            OutputFormat::Json => {
                // Tabled's derive already gives us Serialize-compatible rows
                // in every caller of this method; they choose `data()` when
                // JSON needs richer structure than a table row can express.
                println!("(table omitted in --json mode; use a structured command)");
            }
        }
    }

    pub fn data<T: Serialize>(&self, data: &T) -> anyhow::Result<()> {
        println!("{}", serde_json::to_string_pretty(data)?);
        Ok(())
    }

    pub fn kv(&self, key: impl Display, value: impl Display) {
        match self.format {
            OutputFormat::Human => println!("{}: {}", style(key).bold(), value),
            OutputFormat::Json => println!("{}", serde_json::json!({key.to_string(): value.to_string()})),
        }
    }

    pub fn section(&self, title: impl Display) {
        if !self.is_json() {
            println!("\n{}", style(title).bold().underlined());
        }
    }
}
