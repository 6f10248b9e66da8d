use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use sakhadb::db::Database;
use sakhadb::document::{encode_document, ID_LEN, PAYLOAD_OFFSET};

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the database file (created if it doesn't exist).
    database: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Insert a document into a collection.
    Insert {
        collection: String,
        /// 12 hex-encoded bytes, e.g. 0102030405060708090a0b0c
        id: String,
        /// Arbitrary payload bytes, stored verbatim after the id.
        payload: String,
    },
    /// Look up a document by id.
    Find { collection: String, id: String },
    /// Dump every document in a collection, in id order.
    Dump { collection: String },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let cli = Cli::parse();
    let mut db = Database::open(&cli.database)?;

    match cli.command {
        Commands::Insert {
            collection,
            id,
            payload,
        } => {
            let id = parse_id(&id)?;
            let doc = encode_document(id, payload.as_bytes());
            db.insert(&collection, &doc)?;
            db.commit()?;
            println!("inserted");
        }
        Commands::Find { collection, id } => {
            let id = parse_id(&id)?;
            match db.find(&collection, &id)? {
                Some(doc) => println!("{}", render(&doc)),
                None => println!("not found"),
            }
        }
        Commands::Dump { collection } => {
            for doc in db.iter(&collection)? {
                println!("{}", render(&doc?));
            }
        }
    }

    Ok(())
}

fn parse_id(s: &str) -> Result<[u8; ID_LEN], Box<dyn Error>> {
    let bytes = hex_decode(s)?;
    bytes
        .try_into()
        .map_err(|_| "id must be exactly 12 bytes (24 hex characters)".into())
}

fn hex_decode(s: &str) -> Result<Vec<u8>, Box<dyn Error>> {
    if s.len() % 2 != 0 {
        return Err("hex string must have an even length".into());
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).map_err(|e| e.into()))
        .collect()
}

fn render(doc: &[u8]) -> String {
    let id = sakhadb::document::extract_id(doc).map(|id| hex_encode(&id));
    match id {
        Ok(id) => format!(
            "{id}: {:?}",
            String::from_utf8_lossy(&doc[PAYLOAD_OFFSET..])
        ),
        Err(_) => format!("{doc:?}"),
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
