use clap::{Arg, Command};
use std::io::{self, Write};

const NAMES: [&str; 6] = [
    "Jane Doe",
    "John Smith",
    "Ama Mensah",
    "Luis García",
    "Mei Chen",
    "Sam O'Neil",
];
const TYPES: [&str; 4] = ["Tithe", "Personal", "Building", "Special"];

fn main() -> anyhow::Result<()> {
    let matches = Command::new("gen")
        .about("Writes a sample offering CSV to stdout")
        .arg(
            Arg::new("rows")
                .long("rows")
                .value_parser(clap::value_parser!(u64))
                .required(true),
        )
        .arg(
            Arg::new("invalid_every")
                .long("invalid-every")
                .help("Make every Nth data row fail validation")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(Arg::new("delim").long("delim").default_value(","))
        .get_matches();

    let rows: u64 = *matches
        .get_one("rows")
        .ok_or_else(|| anyhow::anyhow!("--rows is required"))?;
    let invalid_every = matches.get_one::<u64>("invalid_every").copied();
    let delim = matches
        .get_one::<String>("delim")
        .map(String::as_str)
        .unwrap_or(",");

    let mut out = io::BufWriter::new(io::stdout().lock());
    writeln!(&mut out, "name{delim}email{delim}amount{delim}date{delim}type")?;

    for i in 0..rows {
        let name = NAMES[(i % NAMES.len() as u64) as usize];
        let email = format!("giver{i}@example.org");
        let mut amount = format!("{}.{:02}", 5 + (i * 37) % 500, (i * 13) % 100);
        let date = format!("2024-{:02}-{:02}", 1 + i % 12, 1 + i % 28);
        let kind = TYPES[(i % TYPES.len() as u64) as usize];

        // deterministic rejects: negative amount
        if invalid_every.is_some_and(|n| n > 0 && (i + 1) % n == 0) {
            amount = format!("-{amount}");
        }
        writeln!(&mut out, "{name}{delim}{email}{delim}{amount}{delim}{date}{delim}{kind}")?;
        if i % 10_000 == 0 {
            out.flush()?;
        }
    }

    out.flush()?;
    Ok(())
}
