//! CLI front-end for decoding a WMO FM-94 BUFR message, in the spirit of the
//! reference `bufrkit decode` command.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use serde_json::{Map, Value as Json};

use bufrkit::factory::Config;
use bufrkit::model::{FieldValue, Message, Section, Value};
use bufrkit::Error;

#[derive(Parser, Debug)]
#[command(name = "bufrdecode", version, about = "Decode a WMO FM-94 BUFR message")]
struct Cli {
    /// Path to a file containing one or more BUFR messages.
    input: PathBuf,

    /// Stop after the first message in the file.
    #[arg(short = '1', long)]
    first_message: bool,

    /// Include each field's descriptor id and name alongside its value.
    #[arg(short, long)]
    attributed: bool,

    /// Emit JSON instead of an indented text dump.
    #[arg(short, long)]
    json: bool,

    /// Include hidden bookkeeping fields (padding, local use, reserved bytes).
    #[arg(short = 'x', long)]
    show_hidden_fields: bool,

    /// Insert placeholder nodes at operator descriptor positions, matching
    /// the tree shape produced by compatibility-mode legacy decoders.
    #[arg(long)]
    compatible: bool,

    /// Directory holding `<master>/<centre>/<sub_centre>/<version>/Table{B,D}.csv`.
    #[arg(long, env = "BUFRKIT_TABLES_PATH", default_value = "tables")]
    tables_path: PathBuf,

    /// Enable debug logging to stderr.
    #[arg(long)]
    debug: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("bufrdecode: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<(), Error> {
    let file = File::open(&cli.input)?;
    let mut reader = BufReader::new(file);

    let mut first = true;
    loop {
        let config = Config {
            tables_path: cli.tables_path.clone(),
            compatible: cli.compatible,
        };
        let message = match bufrkit::decode_message(&mut reader, config) {
            Ok(m) => m,
            Err(_) if !first => break,
            Err(e) => return Err(e),
        };
        first = false;

        if cli.json {
            let value = message_to_json(&message, cli);
            println!("{}", serde_json::to_string_pretty(&value).unwrap());
        } else {
            print_message(&message, cli);
        }

        if cli.first_message {
            break;
        }
    }
    Ok(())
}

fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Int(v) => Json::from(*v),
        Value::UInt(v) => Json::from(*v),
        Value::Float(v) => serde_json::Number::from_f64(*v).map(Json::Number).unwrap_or(Json::Null),
        Value::Bool(v) => Json::from(*v),
        Value::String(v) => Json::from(v.trim_end().to_string()),
        Value::Bytes(v) => Json::from(String::from_utf8_lossy(v).trim_end().to_string()),
        Value::Binary(v) => Json::from(v.to_string()),
    }
}

fn message_to_json(message: &Message, cli: &Cli) -> Json {
    let mut obj = Map::new();
    for (k, v) in &message.metadata {
        obj.insert(k.clone(), Json::from(v.clone()));
    }
    let sections: Vec<Json> = message
        .sections
        .iter()
        .map(|s| section_to_json(s, cli))
        .collect();
    obj.insert("sections".to_string(), Json::Array(sections));
    Json::Object(obj)
}

fn section_to_json(section: &Section, cli: &Cli) -> Json {
    let mut obj = Map::new();
    obj.insert("number".to_string(), Json::from(section.number()));
    let fields: Vec<Json> = section
        .fields()
        .iter()
        .filter(|f| cli.show_hidden_fields || !f.hidden)
        .map(|f| {
            let mut fo = Map::new();
            fo.insert("name".to_string(), Json::from(f.name.clone()));
            match &f.value {
                FieldValue::Scalar(v) => {
                    fo.insert("value".to_string(), value_to_json(v));
                }
                FieldValue::Payload(p) => {
                    let subsets: Vec<Json> = p
                        .subsets
                        .iter()
                        .map(|s| {
                            let cells: Vec<Json> = s
                                .cells
                                .iter()
                                .map(|c| {
                                    if cli.attributed {
                                        let mut co = Map::new();
                                        co.insert(
                                            "id".to_string(),
                                            Json::from(c.node.descriptor().id.to_string()),
                                        );
                                        co.insert(
                                            "name".to_string(),
                                            Json::from(c.node.descriptor().name().to_string()),
                                        );
                                        co.insert("value".to_string(), value_to_json(&c.value));
                                        Json::Object(co)
                                    } else {
                                        value_to_json(&c.value)
                                    }
                                })
                                .collect();
                            Json::Array(cells)
                        })
                        .collect();
                    fo.insert("subsets".to_string(), Json::Array(subsets));
                }
            }
            Json::Object(fo)
        })
        .collect();
    obj.insert("fields".to_string(), Json::Array(fields));
    Json::Object(obj)
}

fn print_message(message: &Message, cli: &Cli) {
    for (k, v) in &message.metadata {
        println!("{k}: {v}");
    }
    for section in &message.sections {
        println!("-- section {} --", section.number());
        for field in section.fields() {
            if field.hidden && !cli.show_hidden_fields {
                continue;
            }
            match &field.value {
                FieldValue::Scalar(v) => println!("  {}: {}", field.name, format_value(v)),
                FieldValue::Payload(p) => {
                    println!("  {} ({} subset(s), compressed={})", field.name, p.subsets.len(), p.compressed);
                    for subset in &p.subsets {
                        for cell in &subset.cells {
                            if cli.attributed {
                                println!(
                                    "    subset {} {} {}: {}",
                                    subset.index,
                                    cell.node.descriptor().id,
                                    cell.node.descriptor().name(),
                                    format_value(&cell.value)
                                );
                            } else {
                                println!("    subset {}: {}", subset.index, format_value(&cell.value));
                            }
                        }
                    }
                }
            }
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Int(v) => v.to_string(),
        Value::UInt(v) => v.to_string(),
        Value::Float(v) => v.to_string(),
        Value::Bool(v) => v.to_string(),
        Value::String(v) => v.trim_end().to_string(),
        Value::Bytes(v) => String::from_utf8_lossy(v).trim_end().to_string(),
        Value::Binary(v) => v.to_string(),
    }
}
