//! A simple CLI tool for verifying exported vote ledgers offline.
//! This uses the internal chain verification implementation, and is by
//! definition compatible with the dumps produced by the service's ledger
//! export.

use std::fmt::{Display, Formatter};
use std::fs::File;
use std::io::BufReader;

use clap::{Arg, ArgAction, ArgMatches, Command};

use evote_core::model::vote::{ChainFault, LedgerDump};

const PROGRAM_NAME: &str = "verify-ledger";

const ABOUT_TEXT: &str = "Verify the integrity of an exported vote ledger.

EXIT CODES:
     0: Verification succeeded.
   255: Ran successfully, but verification failed.
 Other: Error.";

const DUMP_PATH: &str = "DUMP_PATH";

const DUMP_PATH_HELP: &str = "The path to a JSON dump of a single election's chain,\n\
as produced by the service's ledger export";

/// Construct the CLI configuration.
fn cli() -> Command {
    // Make the build dirty when the toml changes.
    include_str!("../Cargo.toml");

    clap::command!(PROGRAM_NAME).about(ABOUT_TEXT).arg(
        Arg::new(DUMP_PATH)
            .help(DUMP_PATH_HELP)
            .action(ArgAction::Set)
            .required(true),
    )
}

/// Errors that this program may produce.
#[derive(Debug, PartialEq, Eq)]
enum Error {
    /// IO error described by the inner message.
    IO(String),
    /// Failed to decode the JSON dump.
    Format(String),
    /// Verification failed due to the contained fault.
    Verification(ChainFault),
}

/// A friendly representation of one candidate's count.
#[derive(Debug, Eq, PartialEq)]
struct FriendlyCount {
    pub candidate_id: String,
    pub votes: u64,
}

impl Display for FriendlyCount {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {} vote{}",
            self.candidate_id,
            self.votes,
            if self.votes != 1 { "s" } else { "" }
        )
    }
}

/// Run verification.
fn verify(path: &str) -> Result<Vec<FriendlyCount>, Error> {
    // Load the file.
    let file = BufReader::new(File::open(path).map_err(|e| Error::IO(e.to_string()))?);
    let dump: LedgerDump =
        serde_json::from_reader(file).map_err(|e| Error::Format(e.to_string()))?;

    // Run verification.
    dump.verify().map_err(Error::Verification)?;

    // Turn the tally into a list ordered by votes, then name.
    let mut counts = dump
        .tally()
        .into_iter()
        .map(|(candidate_id, votes)| FriendlyCount {
            candidate_id,
            votes,
        })
        .collect::<Vec<_>>();
    counts.sort_unstable_by(|a, b| a.candidate_id.cmp(&b.candidate_id));
    counts.sort_by(|a, b| b.votes.cmp(&a.votes));

    Ok(counts)
}

/// Run verification, report the result, and return the exit code.
fn run(args: &ArgMatches) -> u8 {
    let path: &String = args.get_one(DUMP_PATH).unwrap(); // Required argument is guaranteed to be present.
    match verify(path) {
        Ok(counts) => {
            println!("Verification succeeded.");
            for count in counts {
                println!("{count}");
            }
            0
        }
        Err(Error::IO(msg)) => {
            println!("IO error: {}", msg);
            1
        }
        Err(Error::Format(msg)) => {
            println!("Invalid JSON: {}", msg);
            1
        }
        Err(Error::Verification(fault)) => {
            println!("Verification failed: {fault}");
            255
        }
    }
}

fn main() {
    let args = cli().get_matches();
    let exit_code = run(&args);
    std::process::exit(exit_code.into())
}
