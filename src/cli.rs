use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start notevault as a service.
    Serve {},

    /// Add a note.
    Add {
        /// Note title
        #[clap(short, long)]
        title: String,

        /// Note content
        #[clap(short, long)]
        content: String,

        /// Comma separated tags
        #[clap(short = 'g', long)]
        tags: Option<String>,
    },

    /// Update a note. Omitted fields keep their current value.
    Update {
        /// Note id
        id: u64,

        /// New title
        #[clap(short, long)]
        title: Option<String>,

        /// New content
        #[clap(short, long)]
        content: Option<String>,

        /// Replace tags (comma separated)
        #[clap(short = 'g', long)]
        tags: Option<String>,
    },

    /// Print a note.
    Show {
        /// Note id
        id: u64,
    },

    /// List all notes.
    List {},

    /// Delete a note.
    Delete {
        /// Note id
        id: u64,

        /// Auto confirm
        #[clap(short, long, default_value = "false")]
        yes: bool,
    },

    /// Search notes by meaning.
    Search {
        /// Free text query
        query: String,

        /// Maximum number of results
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Show notes related to an existing note.
    Related {
        /// Note id
        id: u64,

        /// Maximum number of results
        #[clap(short, long)]
        limit: Option<usize>,
    },

    /// Check a draft against existing notes for near-duplicates.
    Check {
        /// Draft title
        #[clap(short, long)]
        title: String,

        /// Draft content
        #[clap(short, long)]
        content: String,

        /// Id of the note being edited, excluded from results
        #[clap(short, long)]
        exclude: Option<u64>,
    },

    /// Read draft text from stdin line by line and print debounced
    /// related-note suggestions as they settle.
    Suggest {},

    /// Re-embed missing or stale vectors and drop orphaned ones.
    Reindex {
        /// Re-embed every note even if its vector is up to date
        #[clap(long, default_value = "false")]
        all: bool,
    },
}
