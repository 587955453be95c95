// Copyright 2024 OctoFHIR Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Command-line interface for document mapping
//!
//! Maps a source JSON document through a mapping configuration file, reads
//! values along a path, or parses and canonicalizes a path.

use std::fs;
use std::io::{self, Read};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use docmap::tree::read;
use docmap::{MappingDocument, MappingEngine, Node, parse_path};
use serde_json::Value as JsonValue;

#[derive(Parser)]
#[command(name = "docmap")]
#[command(about = "Declarative schema-to-schema JSON mapping")]
#[command(version)]
#[command(author = "OctoFHIR Team <funyloony@gmail.com>")]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Map a source document through a mapping configuration
    Map {
        /// JSON file with the source document (reads stdin if not provided)
        #[arg(short, long)]
        source: Option<String>,
        /// JSON file with the mapping document (rules, fields, formats)
        #[arg(short, long)]
        config: String,
        /// Treat the target as a table regardless of the configuration
        #[arg(long)]
        tabular: bool,
        /// Pretty-print JSON output
        #[arg(short, long)]
        pretty: bool,
    },
    /// Print every value a path reaches in a source document
    Read {
        /// Path expression, e.g. `$.lines[*].amount`
        path: String,
        /// JSON file with the source document (reads stdin if not provided)
        #[arg(short, long)]
        source: Option<String>,
    },
    /// Parse a path and print its canonical form
    Parse {
        /// Path expression
        path: String,
    },
}

fn main() {
    human_panic::setup_panic!();

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = match cli.command {
        Commands::Map {
            source,
            config,
            tabular,
            pretty,
        } => handle_map(source.as_deref(), &config, tabular, pretty),
        Commands::Read { path, source } => handle_read(&path, source.as_deref()),
        Commands::Parse { path } => handle_parse(&path),
    };

    if let Err(err) = outcome {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_source(file: Option<&str>) -> Result<Node> {
    let text = match file {
        Some(filename) => fs::read_to_string(filename)
            .with_context(|| format!("reading source file '{filename}'"))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("reading source from stdin")?;
            buffer
        }
    };
    let json: JsonValue = serde_json::from_str(&text).context("parsing source JSON")?;
    Ok(Node::from(json))
}

fn handle_map(source: Option<&str>, config: &str, tabular: bool, pretty: bool) -> Result<()> {
    let text = fs::read_to_string(config)
        .with_context(|| format!("reading mapping file '{config}'"))?;
    let mut document = MappingDocument::from_json_str(&text)
        .with_context(|| format!("parsing mapping file '{config}'"))?;
    if tabular {
        document.options.is_tabular_target = true;
    }

    for warning in document.engine.validate() {
        log::warn!("{warning}");
    }

    let source = load_source(source)?;
    let engine = MappingEngine::new(document.engine.clone());
    let target = engine
        .map_with_document(&source, &document)
        .context("mapping failed")?;

    let output = if pretty {
        serde_json::to_string_pretty(&target)?
    } else {
        serde_json::to_string(&target)?
    };
    println!("{output}");
    Ok(())
}

fn handle_read(path: &str, source: Option<&str>) -> Result<()> {
    let path = parse_path(path).with_context(|| format!("invalid path '{path}'"))?;
    let source = load_source(source)?;

    let mut count = 0;
    for value in read(&source, &path) {
        println!("{}\t{}", value.path, value.value.to_json());
        count += 1;
    }
    if count == 0 {
        bail!("no values at {path}");
    }
    Ok(())
}

fn handle_parse(path: &str) -> Result<()> {
    let parsed = parse_path(path).with_context(|| format!("invalid path '{path}'"))?;
    println!("{parsed}");
    for (position, element) in parsed.indexed() {
        println!("  {position}: {} {}", element.name, element.index);
    }
    Ok(())
}
