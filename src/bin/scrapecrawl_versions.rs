use clap::Parser;
use scrapecrawl::versions;
use std::io;
use std::process::ExitCode;

/// Shows the versions of the tools the crawler depends on
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {}

fn main() -> ExitCode {
    Args::parse();

    match versions::write_table(&mut io::stdout().lock(), &versions::collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Can't print the version table: {e}");
            ExitCode::FAILURE
        }
    }
}
