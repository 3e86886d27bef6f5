use clap::Subcommand;
use model::migration::Strategy;

#[derive(Subcommand)]
pub enum Commands {
    /// Count rows referencing local media URLs in every non-core table
    Scan {
        #[arg(
            long = "pattern",
            help = "Substring to search for, repeatable (defaults to the local uploads URL)"
        )]
        patterns: Vec<String>,

        #[arg(long, help = "Print the scan result as JSON")]
        json: bool,
    },
    /// Start a migration run over the whole media library
    Migrate {
        #[arg(
            long,
            value_delimiter = ',',
            help = "Additional tables to rewrite, comma separated"
        )]
        tables: Vec<String>,

        #[arg(long, help = "Add every table found by the last scan")]
        use_scan: bool,

        #[arg(long, default_value_t = Strategy::Advanced, help = "Rewrite strategy: naive or advanced")]
        strategy: Strategy,

        #[arg(long, help = "Return once jobs are scheduled instead of running them")]
        no_wait: bool,
    },
    /// Show the progress counters of the current run
    Progress {
        #[arg(long, help = "Print progress as JSON instead of a table")]
        json: bool,
    },
    /// Print the URL a media item is served from
    ResolveUrl {
        #[arg(long, help = "Media item id")]
        id: u64,
    },
    /// Check the configured database connection
    TestConn,
}
