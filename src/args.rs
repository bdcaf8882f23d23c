use clap::Parser;

/// Replays the reward elections of a guild and prints their outcome.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct Args {
    /// (file path) The scenario to replay: guild settings, members, elections and reactions, in JSON format.
    /// See the documentation of the `manual` module of weighted_election for the format.
    #[clap(short, long, value_parser)]
    pub config: String,

    /// (file path) A reference file containing the expected summary in JSON format. If provided, electbot will
    /// check that the replayed outcome matches the reference.
    #[clap(short, long, value_parser)]
    pub reference: Option<String>,

    /// (file path, 'stdout' or empty) Where the summary of the elections is written in JSON format.
    #[clap(short, long, value_parser)]
    pub out: Option<String>,

    /// (snapshot or reresolve, default snapshot) How much weight a removed reaction takes back. Overrides the
    /// value found in the scenario.
    #[clap(long, value_parser)]
    pub retract_weight: Option<String>,

    // Other arguments
    /// If passed as an argument, will turn on verbose logging to the standard output.
    #[clap(long, takes_value = false)]
    pub verbose: bool,
}
