//! ArcSQL - interactive SQL shell
//!
//! Usage:
//!   arcsql [DSN]
//!   arcsql --config connections.toml [NAME]

use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing_subscriber::EnvFilter;

use arcsql::connection::MemoryLogger;
use arcsql::{Connection, ConnectionConfig, ConnectionRegistry, Value};

/// Print welcome banner
fn print_banner(conn: &Connection) {
    println!(
        r#"
   _              ____   ___  _
  / \   _ __ ___ / ___| / _ \| |
 / _ \ | '__/ __|\___ \| | | | |
/ ___ \| | | (__  ___) | |_| | |___
/_/   \_\_|  \___||____/ \__\_\_____|

 Connected to `{}` ({})
 Type '.help' for help, '.quit' to exit
"#,
        conn.name(),
        conn.driver(arcsql::Role::Write).dialect()
    );
}

/// Print help message
fn print_help() {
    println!(
        r#"
Commands:
  .help              Show this help message
  .quit              Exit
  .begin             Begin a transaction (nested when one is open)
  .commit            Commit the current transaction level
  .rollback          Roll back the current transaction level
  .rollback all      Roll back the whole transaction
  .level             Show the transaction level
  .savepoints on|off Use save points for nested levels
  .log on|off        Print every executed query
  .clear             Clear screen

Statements end with ';' and may span several lines.
"#
    );
}

/// Format query results as a table
fn format_results(columns: &[String], rows: &[Vec<Value>]) -> String {
    if columns.is_empty() && rows.is_empty() {
        return String::new();
    }

    // Calculate column widths
    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();

    for row in rows {
        for (i, value) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(value.to_string().len());
            }
        }
    }

    let mut output = String::new();

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w + 2))
        .collect::<Vec<_>>()
        .join("+");
    let separator = format!("+{}+\n", separator);

    // Header
    output.push_str(&separator);
    let header: String = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!(" {:^width$} ", c, width = *w))
        .collect::<Vec<_>>()
        .join("|");
    output.push_str(&format!("|{}|\n", header));
    output.push_str(&separator);

    // Rows
    for row in rows {
        let row_str: String = row
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!(" {:>width$} ", v.to_string(), width = *w))
            .collect::<Vec<_>>()
            .join("|");
        output.push_str(&format!("|{}|\n", row_str));
    }

    if !rows.is_empty() {
        output.push_str(&separator);
    }

    output.push_str(&format!("{} row(s) returned\n", rows.len()));

    output
}

/// Print and forget collected query log lines
fn flush_log(log: &MemoryLogger) {
    for line in log.entries() {
        eprintln!("-- {}", line);
    }
    log.clear();
}

/// Execute a SQL statement
fn execute_sql(sql: &str, conn: &mut Connection) {
    let sql = sql.trim().trim_end_matches(';');
    if sql.is_empty() {
        return;
    }

    match conn.execute_sql(sql) {
        Ok(mut stmt) => {
            if stmt.column_count() > 0 {
                let columns = stmt.columns().to_vec();
                let rows = stmt.fetch_all();
                print!("{}", format_results(&columns, &rows));
            } else {
                println!("{} row(s) affected", stmt.row_count());
            }
        }
        Err(e) => eprintln!("Error: {}", e),
    }
}

fn on_off(arg: Option<&&str>) -> Option<bool> {
    match arg.copied() {
        Some("on") => Some(true),
        Some("off") => Some(false),
        _ => None,
    }
}

/// Handle dot commands; returns false when the shell should exit
fn handle_special_command(cmd: &str, conn: &mut Connection) -> bool {
    let parts: Vec<&str> = cmd.split_whitespace().collect();

    let outcome = match parts.first().copied() {
        Some(".help") => {
            print_help();
            Ok(())
        }
        Some(".quit") | Some(".exit") => return false,
        Some(".begin") => conn.begin(),
        Some(".commit") => conn.commit().map(|done| {
            if !done {
                println!("No transaction is open.");
            }
        }),
        Some(".rollback") => {
            let result = if parts.get(1) == Some(&"all") {
                conn.rollback_all()
            } else {
                conn.rollback()
            };
            result.map(|done| {
                if !done {
                    println!("No transaction is open.");
                }
            })
        }
        Some(".level") => {
            println!("Transaction level: {}", conn.transaction_level());
            Ok(())
        }
        Some(".savepoints") => {
            match on_off(parts.get(1)) {
                Some(enable) => {
                    conn.enable_savepoints(enable);
                    println!(
                        "Save points {}",
                        if conn.is_savepoints_enabled() { "on" } else { "off" }
                    );
                }
                None => eprintln!("Usage: .savepoints on|off"),
            }
            Ok(())
        }
        Some(".log") => {
            match on_off(parts.get(1)) {
                Some(enable) => conn.enable_query_logging(enable),
                None => eprintln!("Usage: .log on|off"),
            }
            Ok(())
        }
        Some(".clear") => {
            print!("\x1B[2J\x1B[1;1H");
            io::stdout().flush().ok();
            Ok(())
        }
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            eprintln!("Type '.help' for available commands.");
            Ok(())
        }
        None => Ok(()),
    };

    if let Err(e) = outcome {
        eprintln!("Error: {}", e);
    }
    true
}

/// Main REPL loop
fn run_repl(conn: &mut Connection, log: &MemoryLogger) -> anyhow::Result<()> {
    let mut rl = DefaultEditor::new().context("failed to initialize line editor")?;

    print_banner(conn);

    let mut input_buffer = String::new();

    loop {
        let prompt = if input_buffer.is_empty() { "arcsql> " } else { "   ...> " };
        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();

                if input_buffer.is_empty() && trimmed.starts_with('.') {
                    let _ = rl.add_history_entry(trimmed);
                    if !handle_special_command(trimmed, conn) {
                        break;
                    }
                    flush_log(log);
                    continue;
                }

                if trimmed.is_empty() {
                    continue;
                }

                input_buffer.push_str(&line);
                input_buffer.push('\n');

                // Statement is complete once it ends with a semicolon
                if trimmed.ends_with(';') {
                    let sql = std::mem::take(&mut input_buffer);
                    let _ = rl.add_history_entry(sql.trim());
                    execute_sql(&sql, conn);
                    flush_log(log);
                }
            }
            Err(ReadlineError::Interrupted) => {
                input_buffer.clear();
                continue;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => bail!("failed to read input: {}", e),
        }
    }

    println!("Goodbye!");
    Ok(())
}

/// Open the connection named on the command line
fn open_connection(args: &[String]) -> anyhow::Result<Connection> {
    match args {
        [] => Ok(Connection::new("default", ConnectionConfig::default())?),
        [flag, path, rest @ ..] if flag == "--config" => {
            let name = rest.first().map(String::as_str).unwrap_or("default");
            let mut registry = ConnectionRegistry::new();
            registry
                .load_toml_file(path)
                .with_context(|| format!("failed to load {}", path))?;
            let config = registry
                .config(name)
                .cloned()
                .with_context(|| format!("no connection named `{}` in {}", name, path))?;
            Ok(Connection::with_types(name, config, registry.types().clone())?)
        }
        [dsn] => {
            let config = ConnectionConfig::from_dsn(dsn)?;
            Ok(Connection::new("default", config)?)
        }
        _ => bail!("usage: arcsql [DSN] | arcsql --config FILE [NAME]"),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut conn = open_connection(&args)?;

    let log = Arc::new(MemoryLogger::new());
    conn.set_logger(log.clone());

    let result = run_repl(&mut conn, &log);

    if conn.in_transaction() {
        conn.rollback_all()?;
    }
    result
}
